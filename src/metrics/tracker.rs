use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::aggregator::Aggregator;
use crate::error::{GymkitError, Result};

/// One tracked scalar at one logged step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalValue {
    pub name: String,
    pub value: f64,
    pub timestep: usize,
    pub episode: usize,
}

/// One line of the tracker log: every tracked value at a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub episode: usize,
    pub timestep: usize,
    pub values: Vec<HistoricalValue>,
}

/// Read-only probe evaluated each time a snapshot is taken.
pub type Probe = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Backing of a tracked value.
#[derive(Clone)]
pub enum TrackSource {
    /// Owned scalar mutated through the tracker.
    Scalar(f64),
    /// Value owned elsewhere, read through a probe.
    Node(Probe),
}

impl fmt::Debug for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSource::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            TrackSource::Node(_) => f.write_str("Node(..)"),
        }
    }
}

impl From<f64> for TrackSource {
    fn from(v: f64) -> Self {
        TrackSource::Scalar(v)
    }
}

impl From<Probe> for TrackSource {
    fn from(probe: Probe) -> Self {
        TrackSource::Node(probe)
    }
}

/// Options for [`Tracker::track_value`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackOpts {
    /// Prefix joined to the name with a `/`.
    pub namespace: Option<String>,
    /// Aggregator used by [`Tracker::aggregates`].
    pub aggregator: Option<Aggregator>,
}

impl TrackOpts {
    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }
}

#[derive(Debug)]
struct TrackedValue {
    name: String,
    source: TrackSource,
    aggregator: Aggregator,
}

impl TrackedValue {
    fn read(&self) -> f64 {
        match &self.source {
            TrackSource::Scalar(v) => *v,
            TrackSource::Node(probe) => probe(),
        }
    }
}

#[derive(Debug)]
struct TrackerState {
    values: Vec<TrackedValue>,
    writer: BufWriter<File>,
    last_step: Option<(usize, usize)>,
}

/// Time-series store of named scalars.
///
/// Values are registered once, mutated during training, and snapshotted on
/// every [`Tracker::log_step`] into an append-only JSON-lines file. The
/// tracker is shared between the harness and the policies it observes, so all
/// methods take `&self`.
#[derive(Debug)]
pub struct Tracker {
    path: PathBuf,
    state: Mutex<TrackerState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Tracker {
    /// Tracker logging to a fresh file in the system temp directory.
    ///
    /// The file is kept after the tracker is dropped so runs can be inspected.
    pub fn new() -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("gymkit-tracker-")
            .suffix(".jsonl")
            .tempfile()?;
        let (_, path) = file.keep().map_err(|e| GymkitError::Io(e.to_string()))?;
        Self::with_path(path)
    }

    /// Tracker logging to `path`, truncating any existing file.
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
        info!("tracker logging to {}", path.display());
        Ok(Tracker {
            path,
            state: Mutex::new(TrackerState {
                values: Vec::new(),
                writer: BufWriter::new(file),
                last_step: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a value. Returns the full (namespaced) name.
    pub fn track_value<S: Into<TrackSource>>(&self, name: &str, source: S, opts: TrackOpts) -> Result<String> {
        let full_name = match &opts.namespace {
            Some(ns) => format!("{}/{}", ns, name),
            None => name.to_string(),
        };
        let mut state = lock(&self.state);
        if state.values.iter().any(|v| v.name == full_name) {
            return Err(GymkitError::DuplicateName(full_name));
        }
        debug!("tracking value {}", full_name);
        state.values.push(TrackedValue {
            name: full_name.clone(),
            source: source.into(),
            aggregator: opts.aggregator.unwrap_or_default(),
        });
        Ok(full_name)
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.state).values.iter().any(|v| v.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.state).values.iter().map(|v| v.name.clone()).collect()
    }

    fn with_scalar<F: FnOnce(&mut f64)>(&self, name: &str, f: F) -> Result<f64> {
        let mut state = lock(&self.state);
        let tracked = state
            .values
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| GymkitError::UnknownName(name.to_string()))?;
        match &mut tracked.source {
            TrackSource::Scalar(v) => {
                f(v);
                Ok(*v)
            }
            TrackSource::Node(_) => Err(GymkitError::NotScalarTracked(name.to_string())),
        }
    }

    /// Add `delta` to a scalar value; returns the new value.
    pub fn inc_value(&self, name: &str, delta: f64) -> Result<f64> {
        self.with_scalar(name, |v| *v += delta)
    }

    pub fn set_value(&self, name: &str, value: f64) -> Result<f64> {
        self.with_scalar(name, |v| *v = value)
    }

    pub fn zero_value(&self, name: &str) -> Result<f64> {
        self.set_value(name, 0.0)
    }

    /// Current value, reading probes for node-backed values.
    pub fn get_value(&self, name: &str) -> Result<f64> {
        lock(&self.state)
            .values
            .iter()
            .find(|v| v.name == name)
            .map(TrackedValue::read)
            .ok_or_else(|| GymkitError::UnknownName(name.to_string()))
    }

    /// Append a snapshot of every tracked value.
    ///
    /// Steps must not go backwards: `(episode, timestep)` is compared
    /// lexicographically with the previous call.
    pub fn log_step(&self, episode: usize, timestep: usize) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(last) = state.last_step {
            if (episode, timestep) < last {
                return Err(GymkitError::invalid_parameter(
                    "step",
                    format!("({}, {}) logged after {:?}", episode, timestep, last),
                ));
            }
        }
        let snapshot = Snapshot {
            episode,
            timestep,
            values: state
                .values
                .iter()
                .map(|v| HistoricalValue {
                    name: v.name.clone(),
                    value: v.read(),
                    timestep,
                    episode,
                })
                .collect(),
        };
        serde_json::to_writer(&mut state.writer, &snapshot)?;
        state.writer.write_all(b"\n")?;
        state.last_step = Some((episode, timestep));
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        lock(&self.state).writer.flush()?;
        Ok(())
    }

    /// Every snapshot logged so far, in log order.
    pub fn history(&self) -> Result<Vec<Snapshot>> {
        self.flush()?;
        let reader = BufReader::new(File::open(&self.path)?);
        let mut snapshots = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            snapshots.push(serde_json::from_str(&line)?);
        }
        Ok(snapshots)
    }

    /// All historical values grouped by episode.
    pub fn episode_histories(&self) -> Result<BTreeMap<usize, Vec<HistoricalValue>>> {
        let mut grouped: BTreeMap<usize, Vec<HistoricalValue>> = BTreeMap::new();
        for snapshot in self.history()? {
            grouped.entry(snapshot.episode).or_default().extend(snapshot.values);
        }
        Ok(grouped)
    }

    /// Per-episode aggregate of one value. Unknown names yield an empty map.
    pub fn aggregate(&self, name: &str, aggregator: Aggregator) -> Result<BTreeMap<usize, f64>> {
        let mut result = BTreeMap::new();
        for (episode, values) in self.episode_histories()? {
            let named: Vec<HistoricalValue> = values.into_iter().filter(|v| v.name == name).collect();
            if !named.is_empty() {
                result.insert(episode, aggregator.aggregate(&named));
            }
        }
        Ok(result)
    }

    /// Per-episode aggregates of every registered value using its own aggregator.
    pub fn aggregates(&self) -> Result<BTreeMap<String, BTreeMap<usize, f64>>> {
        let registered: Vec<(String, Aggregator)> = lock(&self.state)
            .values
            .iter()
            .map(|v| (v.name.clone(), v.aggregator))
            .collect();
        let histories = self.episode_histories()?;
        let mut result = BTreeMap::new();
        for (name, aggregator) in registered {
            let mut per_episode = BTreeMap::new();
            for (episode, values) in &histories {
                let named: Vec<HistoricalValue> =
                    values.iter().filter(|v| v.name == name).cloned().collect();
                if !named.is_empty() {
                    per_episode.insert(*episode, aggregator.aggregate(&named));
                }
            }
            result.insert(name, per_episode);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tracker() -> (tempfile::TempDir, Tracker) {
        let dir = tempdir().unwrap();
        let tracker = Tracker::with_path(dir.path().join("log.jsonl")).unwrap();
        (dir, tracker)
    }

    #[test]
    fn test_duplicate_name() {
        let (_dir, t) = tracker();
        t.track_value("score", 0.0, TrackOpts::default()).unwrap();
        assert_eq!(
            t.track_value("score", 1.0, TrackOpts::default()),
            Err(GymkitError::DuplicateName("score".to_string()))
        );
        let namespaced = t.track_value("score", 0.0, TrackOpts::default().namespace("eval")).unwrap();
        assert_eq!(namespaced, "eval/score");
    }

    #[test]
    fn test_node_values_are_read_only() {
        let (_dir, t) = tracker();
        let probe: Probe = Arc::new(|| 4.5);
        t.track_value("loss", probe, TrackOpts::default()).unwrap();
        assert_eq!(t.get_value("loss").unwrap(), 4.5);
        assert!(matches!(t.inc_value("loss", 1.0), Err(GymkitError::NotScalarTracked(_))));
        assert!(matches!(t.inc_value("missing", 1.0), Err(GymkitError::UnknownName(_))));
    }

    #[test]
    fn test_log_lines_match_wire_format() {
        let (_dir, t) = tracker();
        t.track_value("score", 2.0, TrackOpts::default()).unwrap();
        t.log_step(0, 0).unwrap();
        t.flush().unwrap();
        let text = std::fs::read_to_string(t.path()).unwrap();
        let line: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(line["episode"], 0);
        assert_eq!(line["values"][0]["name"], "score");
        assert_eq!(line["values"][0]["value"], 2.0);
        assert_eq!(line["values"][0]["timestep"], 0);
    }

    #[test]
    fn test_steps_must_not_go_backwards() {
        let (_dir, t) = tracker();
        t.log_step(1, 3).unwrap();
        t.log_step(1, 3).unwrap();
        t.log_step(2, 0).unwrap();
        assert!(t.log_step(1, 9).is_err());
    }

    #[test]
    fn test_aggregates_use_registered_aggregator() {
        let (_dir, t) = tracker();
        t.track_value("reward", 0.0, TrackOpts::default().aggregator(Aggregator::Last)).unwrap();
        for step in 0..3 {
            t.inc_value("reward", 1.0).unwrap();
            t.log_step(0, step).unwrap();
        }
        let all = t.aggregates().unwrap();
        assert_eq!(all["reward"][&0], 3.0);
        assert!(t.aggregate("unknown", Aggregator::Max).unwrap().is_empty());
    }
}
