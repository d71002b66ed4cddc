//! Sampling of exogenous (stochastic) variables
//!
//! The trainer never draws stochastic values itself; it asks a [`Sampler`]
//! for one value per active stochastic variable at the start of each stage.
//! [`IndependentSampler`] is the default implementation: every variable is
//! drawn from its own discrete [`Distribution`], independently of the others.

use rand::{
    Rng, RngCore,
    distr::{Bernoulli, weighted::WeightedIndex},
};
use rand_distr::{Binomial, Distribution as _};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, variables::StochasticVariable};

/// Discrete distribution over the value indices `0..size` of a stochastic variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    /// Every value equally likely
    #[default]
    Uniform,
    /// Unnormalized weights, one per value
    Categorical { weights: Vec<f64> },
    /// `P(1) = p` over a binary domain
    Bernoulli { p: f64 },
    /// Number of successes in `trials` draws, domain `0..=trials`
    Binomial { trials: u64, p: f64 },
    /// Point mass on a single value
    Kronecker { value: usize },
}

impl Distribution {
    /// Check that the distribution is well-formed for a domain of `size` values.
    pub fn validate(&self, name: &str, size: usize) -> Result<()> {
        let invalid = |reason: String| Error::InvalidDistribution {
            name: name.to_string(),
            reason,
        };
        match self {
            Distribution::Uniform => Ok(()),
            Distribution::Categorical { weights } => {
                if weights.len() != size {
                    return Err(invalid(format!(
                        "{} weights for a domain of {size} values",
                        weights.len()
                    )));
                }
                if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                    return Err(invalid("weights must be finite and non-negative".into()));
                }
                if weights.iter().sum::<f64>() <= 0.0 {
                    return Err(invalid("weights must not all be zero".into()));
                }
                Ok(())
            }
            Distribution::Bernoulli { p } => {
                if size != 2 {
                    return Err(invalid(format!("bernoulli needs 2 values, domain has {size}")));
                }
                check_probability(*p).map_err(invalid)
            }
            Distribution::Binomial { trials, p } => {
                let needed = usize::try_from(*trials)
                    .ok()
                    .and_then(|t| t.checked_add(1));
                if needed != Some(size) {
                    return Err(invalid(format!(
                        "binomial with {trials} trials needs one value per success count, domain has {size}"
                    )));
                }
                check_probability(*p).map_err(invalid)
            }
            Distribution::Kronecker { value } => {
                if *value >= size {
                    return Err(invalid(format!("value {value} outside domain of {size}")));
                }
                Ok(())
            }
        }
    }
}

fn check_probability(p: f64) -> std::result::Result<(), String> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(format!("probability {p} outside [0, 1]"))
    }
}

/// Source of stochastic variable values.
///
/// `var` is the position of the variable in the problem's stochastic list.
/// Implementations must return a value index inside the variable's domain;
/// anything else is reported by the trainer as an invariant violation.
pub trait Sampler {
    fn sample(&self, var: usize, rng: &mut dyn RngCore) -> usize;
}

impl<F> Sampler for F
where
    F: Fn(usize, &mut dyn RngCore) -> usize,
{
    fn sample(&self, var: usize, rng: &mut dyn RngCore) -> usize {
        self(var, rng)
    }
}

#[derive(Debug, Clone)]
enum CompiledDistribution {
    Uniform(usize),
    Weighted(WeightedIndex<f64>),
    Bernoulli(Bernoulli),
    Binomial(Binomial),
    Point(usize),
}

/// Samples each stochastic variable independently from its declared distribution.
#[derive(Debug, Clone)]
pub struct IndependentSampler {
    compiled: Vec<CompiledDistribution>,
}

impl IndependentSampler {
    /// Build a sampler for the given variables, validating every distribution.
    pub fn new(variables: &[StochasticVariable]) -> Result<Self> {
        let compiled = variables
            .iter()
            .map(|var| {
                var.distribution.validate(&var.name, var.size)?;
                let invalid = |reason: String| Error::InvalidDistribution {
                    name: var.name.clone(),
                    reason,
                };
                Ok(match &var.distribution {
                    Distribution::Uniform => CompiledDistribution::Uniform(var.size),
                    Distribution::Categorical { weights } => CompiledDistribution::Weighted(
                        WeightedIndex::new(weights).map_err(|e| invalid(e.to_string()))?,
                    ),
                    Distribution::Bernoulli { p } => CompiledDistribution::Bernoulli(
                        Bernoulli::new(*p).map_err(|e| invalid(e.to_string()))?,
                    ),
                    Distribution::Binomial { trials, p } => CompiledDistribution::Binomial(
                        Binomial::new(*trials, *p).map_err(|e| invalid(e.to_string()))?,
                    ),
                    Distribution::Kronecker { value } => CompiledDistribution::Point(*value),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { compiled })
    }
}

impl Sampler for IndependentSampler {
    fn sample(&self, var: usize, rng: &mut dyn RngCore) -> usize {
        match &self.compiled[var] {
            CompiledDistribution::Uniform(size) => rng.random_range(0..*size),
            CompiledDistribution::Weighted(index) => index.sample(rng),
            CompiledDistribution::Bernoulli(bernoulli) => usize::from(bernoulli.sample(rng)),
            CompiledDistribution::Binomial(binomial) => binomial.sample(rng) as usize,
            CompiledDistribution::Point(value) => *value,
        }
    }
}
