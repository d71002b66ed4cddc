//! Observer port - abstraction for training observation and data collection
//!
//! This port defines the interface for observing training events,
//! allowing composable data collection without coupling the episode
//! loop to specific output formats or metrics.

use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    Result,
    q_learning::trainer::{EpisodeOutcome, TrainingReport},
};

/// Observer trait for monitoring training
///
/// Observers can be composed to collect different types of data during
/// training, for example progress bars, JSONL episode logs or running
/// metrics.
///
/// # Event Sequence
///
/// 1. `on_training_start(total_episodes)` - Once per call to `train`
/// 2. For each episode:
///    - `on_episode_start(episode)`
///    - `on_episode_end(outcome)` - After the Q-table snapshot swap
/// 3. `on_training_end(report)` - Once at the end, also after an early stop
///
/// # Examples
///
/// ```no_run
/// use stageq::{ports::TrainingObserver, q_learning::EpisodeOutcome};
///
/// struct FeasibleCounter {
///     feasible: usize,
/// }
///
/// impl TrainingObserver for FeasibleCounter {
///     fn on_episode_end(&mut self, outcome: &EpisodeOutcome) -> stageq::Result<()> {
///         if outcome.feasible {
///             self.feasible += 1;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait TrainingObserver: Send {
    /// Called when training starts with the episode budget of the run.
    fn on_training_start(&mut self, _total_episodes: usize) -> Result<()> {
        Ok(())
    }

    /// Called before the first stage of an episode (0-based index).
    fn on_episode_start(&mut self, _episode: usize) -> Result<()> {
        Ok(())
    }

    /// Called once the episode's update has been applied.
    fn on_episode_end(&mut self, _outcome: &EpisodeOutcome) -> Result<()> {
        Ok(())
    }

    /// Called when training completes.
    ///
    /// Use this to finalize outputs, flush files, or display summaries.
    fn on_training_end(&mut self, _report: &TrainingReport) -> Result<()> {
        Ok(())
    }
}

/// Shared observer: the trainer owns one handle, the caller keeps another
/// to read the collected data after training.
impl<T: TrainingObserver> TrainingObserver for Arc<Mutex<T>> {
    fn on_training_start(&mut self, total_episodes: usize) -> Result<()> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_training_start(total_episodes)
    }

    fn on_episode_start(&mut self, episode: usize) -> Result<()> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_episode_start(episode)
    }

    fn on_episode_end(&mut self, outcome: &EpisodeOutcome) -> Result<()> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_episode_end(outcome)
    }

    fn on_training_end(&mut self, report: &TrainingReport) -> Result<()> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_training_end(report)
    }
}
