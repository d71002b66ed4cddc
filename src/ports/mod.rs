//! Ports (trait boundaries) for external collaborators.
//!
//! The episode loop talks to samplers, objectives and observers only through
//! traits owned by this crate; adapters implement them.

pub mod observer;

pub use crate::{reward::Objective, sampling::Sampler};
pub use observer::TrainingObserver;
