//! Observer implementations for training runs
//!
//! Observers allow composable data collection during training without coupling
//! the episode loop to specific output formats.

use std::{
    collections::VecDeque,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    ports::TrainingObserver,
    q_learning::{EpisodeOutcome, TrainingReport},
};

/// Progress bar observer - Shows training progress
pub struct ProgressObserver {
    progress_bar: Option<ProgressBar>,
    feasible: usize,
    episodes: usize,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self {
            progress_bar: None,
            feasible: 0,
            episodes: 0,
        }
    }

    fn message(&self) -> String {
        let rate = if self.episodes == 0 {
            0.0
        } else {
            self.feasible as f64 / self.episodes as f64
        };
        format!("feasible {:.1}%", rate * 100.0)
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingObserver for ProgressObserver {
    fn on_training_start(&mut self, total_episodes: usize) -> Result<()> {
        let pb = ProgressBar::new(total_episodes as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} episodes ({msg})")
                .map_err(|e| Error::ProgressBarTemplate {
                    message: e.to_string(),
                })?
                .progress_chars("=>-"),
        );
        // position counts episodes of this run, not the trainer's lifetime
        self.episodes = 0;
        self.feasible = 0;
        self.progress_bar = Some(pb);
        Ok(())
    }

    fn on_episode_end(&mut self, outcome: &EpisodeOutcome) -> Result<()> {
        self.episodes += 1;
        self.feasible += usize::from(outcome.feasible);

        if let Some(pb) = &self.progress_bar {
            pb.set_position(self.episodes as u64);
            pb.set_message(self.message());
        }
        Ok(())
    }

    fn on_training_end(&mut self, _report: &TrainingReport) -> Result<()> {
        if let Some(pb) = &self.progress_bar {
            pb.finish_with_message(self.message());
        }
        Ok(())
    }
}

/// Metrics observer - Tracks running and windowed training metrics
pub struct MetricsObserver {
    window: usize,
    episodes: usize,
    feasible: usize,
    explored_stages: usize,
    qhat_sum: f64,
    best_qhat: Option<f64>,
    recent: VecDeque<(bool, f64)>,
    max_recent_delta: VecDeque<f64>,
}

impl MetricsObserver {
    /// Create a new metrics observer averaging the last `window` episodes
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            episodes: 0,
            feasible: 0,
            explored_stages: 0,
            qhat_sum: 0.0,
            best_qhat: None,
            recent: VecDeque::with_capacity(window),
            max_recent_delta: VecDeque::with_capacity(window),
        }
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    pub fn feasibility_rate(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.feasible as f64 / self.episodes as f64
        }
    }

    /// Feasibility rate over the last `window` episodes
    pub fn recent_feasibility_rate(&self) -> f64 {
        if self.recent.is_empty() {
            0.0
        } else {
            self.recent.iter().filter(|(feasible, _)| *feasible).count() as f64
                / self.recent.len() as f64
        }
    }

    /// Mean update target over the last `window` episodes
    pub fn recent_mean_qhat(&self) -> f64 {
        if self.recent.is_empty() {
            0.0
        } else {
            self.recent.iter().map(|(_, qhat)| qhat).sum::<f64>() / self.recent.len() as f64
        }
    }

    /// Largest entry change over the last `window` episodes
    pub fn recent_max_delta(&self) -> f64 {
        self.max_recent_delta.iter().copied().fold(0.0, f64::max)
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            episodes: self.episodes,
            feasible: self.feasible,
            feasibility_rate: self.feasibility_rate(),
            mean_qhat: if self.episodes == 0 {
                0.0
            } else {
                self.qhat_sum / self.episodes as f64
            },
            best_qhat: self.best_qhat,
            explored_stages: self.explored_stages,
            window: self.window,
            recent_feasibility_rate: self.recent_feasibility_rate(),
            recent_mean_qhat: self.recent_mean_qhat(),
            recent_max_delta: self.recent_max_delta(),
        }
    }
}

/// Summary of training metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub episodes: usize,
    pub feasible: usize,
    pub feasibility_rate: f64,
    pub mean_qhat: f64,
    pub best_qhat: Option<f64>,
    pub explored_stages: usize,
    pub window: usize,
    pub recent_feasibility_rate: f64,
    pub recent_mean_qhat: f64,
    pub recent_max_delta: f64,
}

impl Default for MetricsObserver {
    fn default() -> Self {
        Self::new(100)
    }
}

impl TrainingObserver for MetricsObserver {
    fn on_episode_end(&mut self, outcome: &EpisodeOutcome) -> Result<()> {
        self.episodes += 1;
        self.feasible += usize::from(outcome.feasible);
        self.explored_stages += outcome.explored_stages();
        self.qhat_sum += outcome.qhat;
        self.best_qhat = Some(self.best_qhat.map_or(outcome.qhat, |b| b.max(outcome.qhat)));

        if self.recent.len() == self.window {
            self.recent.pop_front();
            self.max_recent_delta.pop_front();
        }
        self.recent.push_back((outcome.feasible, outcome.qhat));
        self.max_recent_delta
            .push_back((outcome.updated - outcome.previous).abs());
        Ok(())
    }
}

/// JSONL observer - Writes one [`EpisodeOutcome`] per line
pub struct JsonlObserver {
    writer: BufWriter<File>,
}

impl JsonlObserver {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| Error::Io {
            operation: format!("create observation file {}", path.display()),
            source,
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl TrainingObserver for JsonlObserver {
    fn on_episode_end(&mut self, outcome: &EpisodeOutcome) -> Result<()> {
        serde_json::to_writer(&mut self.writer, outcome)?;
        writeln!(&mut self.writer)?;
        Ok(())
    }

    fn on_training_end(&mut self, _report: &TrainingReport) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
