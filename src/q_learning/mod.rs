//! Stage-marginalized tabular Q-learning
//!
//! The table is indexed by the full decision combination (rows) and the full
//! stochastic combination (columns). At each stage the learner only sees the
//! variables assigned to that stage: entries are summed over every inactive
//! variable before the greedy choice or the continuation value is taken.
//!
//! ## Episode
//!
//! | Step | Operation |
//! |------|-----------|
//! | Sample | draw the stage's stochastic values |
//! | Decide | `stage_argmax` on the stage marginal, or explore |
//! | Reward | constraint feasibility or terminal objective |
//! | Continue | `stage_max` over the next stage's decisions |
//! | Update | blend the accumulated target into a single entry of Q1 |
//!
//! Reads go to the Q0 snapshot only; the two snapshots are swapped after the
//! update.
//!
//! ## Usage Example
//!
//! ```no_run
//! use stageq::{
//!     Problem,
//!     q_learning::{EpisodeTrainer, TrainerConfig},
//! };
//!
//! let problem = Problem::builder()
//!     .decision("x", 2, 0)
//!     .stochastic("s", 2, 0)
//!     .build()?;
//! let mut trainer = EpisodeTrainer::new(&problem, TrainerConfig::new(500).with_seed(7))?;
//! let report = trainer.train()?;
//! println!("{:?} after {} episodes", report.stop_reason, report.episodes);
//! # Ok::<(), stageq::Error>(())
//! ```

pub mod policy;
pub mod q_table;
pub mod resolver;
pub mod schedule;
pub mod trainer;

pub use policy::{GreedyPolicy, PolicyEvaluation};
pub use q_table::{QInit, QTable};
pub use resolver::{MAX_TABLE_ENTRIES, StageDecision, StageResolver};
pub use schedule::{Exploration, LearningRate};
pub use trainer::{
    Convergence, EpisodeOutcome, EpisodeTrainer, InterruptHandle, StageStep, StopReason,
    TrainerConfig, TrainingReport,
};
