//! Training pipeline adapters
//!
//! Observer implementations that plug into
//! [`EpisodeTrainer::with_observer`](crate::q_learning::EpisodeTrainer::with_observer):
//! - progress reporting
//! - running metrics
//! - per-episode JSONL logs

pub mod observers;

pub use observers::{JsonlObserver, MetricsObserver, MetricsSummary, ProgressObserver};

pub use crate::ports::TrainingObserver;
