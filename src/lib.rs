//! Stage-marginalized tabular Q-learning for multi-stage stochastic
//! optimization
//!
//! This crate provides:
//! - Discrete decision and stochastic variables partitioned into stages
//! - Lexicographic combination indexing with precomputed stage projections
//! - A full joint Q-table with summation marginals per stage
//! - An episodic trainer with ε-greedy exploration and two table snapshots
//! - Constraint-based and objective-based stage rewards
//! - Greedy policy extraction and evaluation
//! - JSON problem files and a CLI driver

pub mod cli;
pub mod combination;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod problem;
pub mod q_learning;
pub mod reward;
pub mod sampling;
pub mod variables;

pub use combination::{CombinationIndex, StageProjection};
pub use config::ProblemFile;
pub use error::{Error, Result};
pub use problem::{Problem, ProblemBuilder};
pub use q_learning::{
    EpisodeTrainer, GreedyPolicy, QInit, QTable, StageResolver, TrainerConfig, TrainingReport,
};
pub use reward::{Constraint, Objective, RewardMode};
pub use sampling::{Distribution, IndependentSampler, Sampler};
pub use variables::{DecisionVariable, StochasticVariable, VarRef};
