//! Learning-rate and exploration schedules

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Learning rate `alpha_n`, indexed by episode number `n ≥ 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearningRate {
    Constant { value: f64 },
    /// `1 / n`
    Harmonic,
    /// `1 / n^omega`
    Polynomial { omega: f64 },
    /// `max(initial · decay^(n-1), min)`
    Exponential { initial: f64, decay: f64, min: f64 },
}

impl Default for LearningRate {
    fn default() -> Self {
        LearningRate::Constant { value: 0.1 }
    }
}

impl LearningRate {
    /// Rate for episode `n` (1-based; `0` is treated as `1`).
    pub fn at(&self, n: usize) -> f64 {
        let n = n.max(1);
        match *self {
            LearningRate::Constant { value } => value,
            LearningRate::Harmonic => 1.0 / n as f64,
            LearningRate::Polynomial { omega } => (n as f64).powf(-omega),
            LearningRate::Exponential {
                initial,
                decay,
                min,
            } => (initial * decay.powi((n - 1).min(i32::MAX as usize) as i32)).max(min),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            LearningRate::Constant { value } => unit("learning rate", value),
            LearningRate::Harmonic => Ok(()),
            LearningRate::Polynomial { omega } => {
                if omega > 0.5 && omega <= 1.0 {
                    Ok(())
                } else {
                    Err(Error::config(format!(
                        "polynomial learning rate exponent {omega} outside (0.5, 1]"
                    )))
                }
            }
            LearningRate::Exponential {
                initial,
                decay,
                min,
            } => decaying("learning rate", initial, decay, min),
        }
    }
}

/// Exploration probability `epsilon`, indexed by completed episodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Exploration {
    Constant { value: f64 },
    /// Multiplicative decay per episode, clamped at `min`
    Decay { initial: f64, decay: f64, min: f64 },
}

impl Default for Exploration {
    fn default() -> Self {
        Exploration::Decay {
            initial: 0.5,
            decay: 0.995,
            min: 0.01,
        }
    }
}

impl Exploration {
    /// Probability used during the episode after `completed` finished episodes.
    pub fn at(&self, completed: usize) -> f64 {
        match *self {
            Exploration::Constant { value } => value,
            Exploration::Decay {
                initial,
                decay,
                min,
            } => (initial * decay.powi(completed.min(i32::MAX as usize) as i32)).max(min),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Exploration::Constant { value } => unit("exploration rate", value),
            Exploration::Decay {
                initial,
                decay,
                min,
            } => decaying("exploration rate", initial, decay, min),
        }
    }
}

fn unit(what: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::config(format!("{what} {value} outside [0, 1]")))
    }
}

fn decaying(what: &str, initial: f64, decay: f64, min: f64) -> Result<()> {
    unit(what, initial)?;
    unit(what, min)?;
    if !(decay > 0.0 && decay <= 1.0) {
        return Err(Error::config(format!("{what} decay {decay} outside (0, 1]")));
    }
    if min > initial {
        return Err(Error::config(format!(
            "{what} floor {min} exceeds its initial value {initial}"
        )));
    }
    Ok(())
}
