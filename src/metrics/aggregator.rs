use serde::{Deserialize, Serialize};

use super::tracker::HistoricalValue;

/// Reduces all historical values of one name within an episode to a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Aggregator {
    #[default]
    Mean,
    Max,
    Min,
    /// Most frequent value; ties resolve to the smallest value.
    Mode,
    /// Value at the latest logged step.
    Last,
}

impl Aggregator {
    /// Aggregate a list of values. An empty list yields `0.0`.
    pub fn aggregate(&self, values: &[HistoricalValue]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let scalars = values.iter().map(|v| v.value);
        match self {
            Aggregator::Mean => scalars.sum::<f64>() / values.len() as f64,
            Aggregator::Max => scalars.fold(f64::NEG_INFINITY, f64::max),
            Aggregator::Min => scalars.fold(f64::INFINITY, f64::min),
            Aggregator::Mode => mode(scalars.collect()),
            Aggregator::Last => values
                .iter()
                .max_by_key(|v| (v.episode, v.timestep))
                .map_or(0.0, |v| v.value),
        }
    }
}

fn mode(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mut best = values[0];
    let mut best_count = 0;
    let mut i = 0;
    while i < values.len() {
        let mut j = i;
        while j < values.len() && values[j] == values[i] {
            j += 1;
        }
        // strictly greater keeps the smallest value on ties
        if j - i > best_count {
            best = values[i];
            best_count = j - i;
        }
        i = j.max(i + 1);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(values: &[f64]) -> Vec<HistoricalValue> {
        values
            .iter()
            .enumerate()
            .map(|(t, &value)| HistoricalValue {
                name: "score".to_string(),
                value,
                episode: 0,
                timestep: t,
            })
            .collect()
    }

    #[test]
    fn test_mean_max_min() {
        let h = history(&[1.0, 2.0, 6.0]);
        assert_eq!(Aggregator::Mean.aggregate(&h), 3.0);
        assert_eq!(Aggregator::Max.aggregate(&h), 6.0);
        assert_eq!(Aggregator::Min.aggregate(&h), 1.0);
        assert_eq!(Aggregator::Last.aggregate(&h), 6.0);
    }

    #[test]
    fn test_mode_ties_pick_smallest() {
        assert_eq!(Aggregator::Mode.aggregate(&history(&[3.0, 1.0, 3.0, 1.0, 2.0])), 1.0);
        assert_eq!(Aggregator::Mode.aggregate(&history(&[5.0, 4.0, 5.0])), 5.0);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(Aggregator::Max.aggregate(&[]), 0.0);
    }
}
