//! Variable descriptors and the stage partition.
//!
//! Decision and stochastic variables are addressed by their position in the
//! problem's decision list `D` and stochastic list `S`. Every variable is
//! active in exactly one stage; stages are numbered from 0.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, sampling::Distribution};

/// Reference to one variable of the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarRef {
    Decision(usize),
    Stochastic(usize),
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarRef::Decision(i) => write!(f, "x[{i}]"),
            VarRef::Stochastic(i) => write!(f, "s[{i}]"),
        }
    }
}

/// A discrete decision variable with values `0..size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionVariable {
    pub name: String,
    pub size: usize,
    pub stage: usize,
}

impl DecisionVariable {
    pub fn new(name: impl Into<String>, size: usize, stage: usize) -> Self {
        Self {
            name: name.into(),
            size,
            stage,
        }
    }
}

/// A discrete exogenous variable with values `0..size`, drawn from `distribution`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StochasticVariable {
    pub name: String,
    pub size: usize,
    pub stage: usize,
    #[serde(default)]
    pub distribution: Distribution,
}

impl StochasticVariable {
    /// Create a uniformly distributed stochastic variable.
    pub fn new(name: impl Into<String>, size: usize, stage: usize) -> Self {
        Self {
            name: name.into(),
            size,
            stage,
            distribution: Distribution::Uniform,
        }
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = distribution;
        self
    }
}

/// Fixed assignment of every variable to exactly one stage.
///
/// Built once at setup and immutable afterwards. Per-stage lists keep the
/// variables in declaration order, which is the order used for every
/// stage-restricted combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePartition {
    decision: Vec<Vec<usize>>,
    stochastic: Vec<Vec<usize>>,
    decision_stage: Vec<usize>,
    stochastic_stage: Vec<usize>,
}

impl StagePartition {
    /// Partition the variables into `stages` stages.
    ///
    /// # Errors
    ///
    /// Configuration errors: zero stages, empty domains, a stage out of range
    /// or a name used twice across both variable lists.
    pub fn new(
        stages: usize,
        decisions: &[DecisionVariable],
        stochastics: &[StochasticVariable],
    ) -> Result<Self> {
        if stages == 0 {
            return Err(Error::config("at least one stage is required"));
        }

        let mut names = std::collections::HashSet::new();
        let entries = decisions
            .iter()
            .map(|v| (&v.name, v.size, v.stage))
            .chain(stochastics.iter().map(|v| (&v.name, v.size, v.stage)));
        for (name, size, stage) in entries {
            if !names.insert(name.as_str()) {
                return Err(Error::DuplicateVariable { name: name.clone() });
            }
            if size == 0 {
                return Err(Error::EmptyDomain { name: name.clone() });
            }
            if stage >= stages {
                return Err(Error::InvalidStage {
                    name: name.clone(),
                    stage,
                    stages,
                });
            }
        }

        let mut decision = vec![Vec::new(); stages];
        for (i, var) in decisions.iter().enumerate() {
            decision[var.stage].push(i);
        }
        let mut stochastic = vec![Vec::new(); stages];
        for (i, var) in stochastics.iter().enumerate() {
            stochastic[var.stage].push(i);
        }

        Ok(Self {
            decision,
            stochastic,
            decision_stage: decisions.iter().map(|v| v.stage).collect(),
            stochastic_stage: stochastics.iter().map(|v| v.stage).collect(),
        })
    }

    /// Number of stages `M`
    pub fn stages(&self) -> usize {
        self.decision.len()
    }

    /// Active decision variables `L_D(m)`
    pub fn decisions(&self, stage: usize) -> &[usize] {
        &self.decision[stage]
    }

    /// Active stochastic variables `L_S(m)`
    pub fn stochastics(&self, stage: usize) -> &[usize] {
        &self.stochastic[stage]
    }

    /// Stage in which a variable becomes known, `None` for unknown references.
    pub fn stage_of(&self, var: VarRef) -> Option<usize> {
        match var {
            VarRef::Decision(i) => self.decision_stage.get(i).copied(),
            VarRef::Stochastic(i) => self.stochastic_stage.get(i).copied(),
        }
    }

    pub fn decision_count(&self) -> usize {
        self.decision_stage.len()
    }

    pub fn stochastic_count(&self) -> usize {
        self.stochastic_stage.len()
    }
}

/// Values assigned so far during an episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    decisions: Vec<Option<usize>>,
    stochastics: Vec<Option<usize>>,
}

impl Assignment {
    /// Empty assignment over `decisions` decision and `stochastics` stochastic variables.
    pub fn new(decisions: usize, stochastics: usize) -> Self {
        Self {
            decisions: vec![None; decisions],
            stochastics: vec![None; stochastics],
        }
    }

    /// Fully specified assignment.
    pub fn complete(decisions: &[usize], stochastics: &[usize]) -> Self {
        Self {
            decisions: decisions.iter().copied().map(Some).collect(),
            stochastics: stochastics.iter().copied().map(Some).collect(),
        }
    }

    pub fn get(&self, var: VarRef) -> Option<usize> {
        match var {
            VarRef::Decision(i) => self.decisions.get(i).copied().flatten(),
            VarRef::Stochastic(i) => self.stochastics.get(i).copied().flatten(),
        }
    }

    pub fn set(&mut self, var: VarRef, value: usize) {
        match var {
            VarRef::Decision(i) => self.decisions[i] = Some(value),
            VarRef::Stochastic(i) => self.stochastics[i] = Some(value),
        }
    }

    /// Decision vector, `None` while any decision is still open.
    pub fn decision_values(&self) -> Option<Vec<usize>> {
        self.decisions.iter().copied().collect()
    }

    /// Stochastic vector, `None` while any stochastic value is still unobserved.
    pub fn stochastic_values(&self) -> Option<Vec<usize>> {
        self.stochastics.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_stage() -> (Vec<DecisionVariable>, Vec<StochasticVariable>) {
        (
            vec![
                DecisionVariable::new("order", 3, 0),
                DecisionVariable::new("ship", 2, 1),
                DecisionVariable::new("hold", 2, 0),
            ],
            vec![
                StochasticVariable::new("demand", 2, 0),
                StochasticVariable::new("price", 3, 1),
            ],
        )
    }

    #[test]
    fn test_partition_groups_variables_by_stage() {
        let (d, s) = two_stage();
        let partition = StagePartition::new(2, &d, &s).unwrap();
        assert_eq!(partition.stages(), 2);
        assert_eq!(partition.decisions(0), &[0, 2]);
        assert_eq!(partition.decisions(1), &[1]);
        assert_eq!(partition.stochastics(1), &[1]);
        assert_eq!(partition.stage_of(VarRef::Decision(1)), Some(1));
        assert_eq!(partition.stage_of(VarRef::Stochastic(5)), None);
    }

    #[test]
    fn test_partition_rejects_bad_configuration() {
        let (d, s) = two_stage();
        assert!(matches!(
            StagePartition::new(1, &d, &s),
            Err(Error::InvalidStage { stage: 1, .. })
        ));
        assert!(matches!(
            StagePartition::new(0, &d, &s),
            Err(Error::InvalidConfiguration { .. })
        ));

        let mut empty = d.clone();
        empty[0].size = 0;
        assert!(matches!(
            StagePartition::new(2, &empty, &s),
            Err(Error::EmptyDomain { .. })
        ));

        let mut dup = s.clone();
        dup[1].name = "order".to_string();
        assert!(matches!(
            StagePartition::new(2, &d, &dup),
            Err(Error::DuplicateVariable { .. })
        ));
    }

    #[test]
    fn test_assignment_tracks_completion() {
        let mut assignment = Assignment::new(2, 1);
        assignment.set(VarRef::Decision(0), 1);
        assert_eq!(assignment.get(VarRef::Decision(0)), Some(1));
        assert_eq!(assignment.get(VarRef::Decision(1)), None);
        assert_eq!(assignment.decision_values(), None);
        assignment.set(VarRef::Decision(1), 0);
        assignment.set(VarRef::Stochastic(0), 1);
        assert_eq!(assignment.decision_values(), Some(vec![1, 0]));
        assert_eq!(assignment.stochastic_values(), Some(vec![1]));
    }
}
