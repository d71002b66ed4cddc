//! CLI infrastructure for stageq
//!
//! This module provides the command-line interface for training a
//! stage-marginalized Q-learner on a problem file and inspecting the
//! problem's stage structure.

pub mod commands;
pub mod output;
