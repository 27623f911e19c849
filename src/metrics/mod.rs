pub mod aggregator;
pub mod tracker;

pub use aggregator::Aggregator;
pub use tracker::{HistoricalValue, Probe, Snapshot, TrackOpts, TrackSource, Tracker};
