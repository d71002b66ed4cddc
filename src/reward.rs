//! Feasibility constraints, objective functions and stage rewards.
//!
//! Constraints declare the variables they read. A constraint becomes active
//! in the first stage where all of its variables are known and stays active
//! afterwards, so the set checked at stage `m` (`C_m`) is stage-cumulative.
//!
//! Two reward conventions are supported, selected by [`RewardMode`]:
//!
//! * [`RewardMode::Feasibility`]: every stage pays `1` when all of `C_m`
//!   holds, `0` otherwise.
//! * [`RewardMode::Objective`]: the objective is paid once, at the terminal
//!   stage, when every constraint holds; all other stage rewards are `0`.
//!
//! A failing constraint is never an error. It only zeroes the reward.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    variables::{Assignment, StagePartition, VarRef},
};

type Predicate = Arc<dyn Fn(&[usize]) -> bool + Send + Sync>;

/// Predicate over the values of a declared variable scope.
#[derive(Clone)]
pub struct Constraint {
    name: String,
    scope: Vec<VarRef>,
    predicate: Predicate,
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl Constraint {
    /// Create a constraint; `predicate` receives the scope's values in scope order.
    pub fn new<F>(
        name: impl Into<String>,
        scope: impl IntoIterator<Item = VarRef>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&[usize]) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scope: scope.into_iter().collect(),
            predicate: Arc::new(predicate),
        }
    }

    /// `a != b`
    pub fn not_equal(name: impl Into<String>, a: VarRef, b: VarRef) -> Self {
        Self::new(name, [a, b], |v| v[0] != v[1])
    }

    /// `a == b`
    pub fn equal(name: impl Into<String>, a: VarRef, b: VarRef) -> Self {
        Self::new(name, [a, b], |v| v[0] == v[1])
    }

    /// Pairwise distinct values
    pub fn all_different(name: impl Into<String>, vars: impl IntoIterator<Item = VarRef>) -> Self {
        Self::new(name, vars, |v| v.iter().enumerate().all(|(i, x)| !v[..i].contains(x)))
    }

    /// Rejects exactly one joint value of `vars`
    pub fn forbid(
        name: impl Into<String>,
        vars: impl IntoIterator<Item = VarRef>,
        values: Vec<usize>,
    ) -> Self {
        Self::new(name, vars, move |v| v != values.as_slice())
    }

    /// `Σ coefficient · value ≤ bound`
    pub fn linear_le(name: impl Into<String>, terms: Vec<(VarRef, f64)>, bound: f64) -> Self {
        let coefficients: Vec<f64> = terms.iter().map(|(_, c)| *c).collect();
        Self::new(name, terms.into_iter().map(|(var, _)| var), move |v| {
            v.iter()
                .zip(&coefficients)
                .map(|(x, c)| *x as f64 * c)
                .sum::<f64>()
                <= bound
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &[VarRef] {
        &self.scope
    }

    /// Evaluate against an assignment that covers the whole scope.
    ///
    /// # Errors
    ///
    /// [`Error::UnassignedVariable`] if a scope variable has no value yet.
    pub fn is_satisfied(&self, assignment: &Assignment) -> Result<bool> {
        let values = self
            .scope
            .iter()
            .map(|&var| {
                assignment.get(var).ok_or_else(|| Error::UnassignedVariable {
                    var,
                    constraint: self.name.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((self.predicate)(&values))
    }
}

/// Maximization-oriented objective over a complete assignment.
pub trait Objective: Send + Sync {
    fn evaluate(&self, decisions: &[usize], stochastics: &[usize]) -> f64;
}

impl<F> Objective for F
where
    F: Fn(&[usize], &[usize]) -> f64 + Send + Sync,
{
    fn evaluate(&self, decisions: &[usize], stochastics: &[usize]) -> f64 {
        self(decisions, stochastics)
    }
}

/// Objective returning the same value everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantObjective(pub f64);

impl Default for ConstantObjective {
    fn default() -> Self {
        ConstantObjective(1.0)
    }
}

impl Objective for ConstantObjective {
    fn evaluate(&self, _decisions: &[usize], _stochastics: &[usize]) -> f64 {
        self.0
    }
}

/// How stage rewards are composed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardMode {
    /// Binary feasibility reward at every stage
    #[default]
    Feasibility,
    /// Objective value once at the terminal stage, gated by feasibility
    Objective,
}

/// Computes stage rewards from the stage-cumulative constraint sets.
#[derive(Clone)]
pub struct RewardEvaluator {
    constraints: Vec<Constraint>,
    /// Stage at which each constraint becomes active
    activation: Vec<usize>,
    objective: Arc<dyn Objective>,
    mode: RewardMode,
    stages: usize,
}

impl fmt::Debug for RewardEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewardEvaluator")
            .field("constraints", &self.constraints)
            .field("activation", &self.activation)
            .field("mode", &self.mode)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl RewardEvaluator {
    /// # Errors
    ///
    /// [`Error::UnknownVariable`] when a constraint scope references a
    /// variable outside the partition.
    pub fn new(
        constraints: Vec<Constraint>,
        objective: Arc<dyn Objective>,
        mode: RewardMode,
        partition: &StagePartition,
    ) -> Result<Self> {
        let activation = constraints
            .iter()
            .map(|constraint| {
                constraint.scope.iter().try_fold(0, |stage, &var| {
                    partition
                        .stage_of(var)
                        .map(|s| stage.max(s))
                        .ok_or_else(|| Error::UnknownVariable {
                            name: var.to_string(),
                            context: format!("constraint '{}'", constraint.name),
                        })
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            constraints,
            activation,
            objective,
            mode,
            stages: partition.stages(),
        })
    }

    pub fn mode(&self) -> RewardMode {
        self.mode
    }

    /// The constraints checked at `stage` (`C_m`)
    pub fn stage_constraints(&self, stage: usize) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .zip(&self.activation)
            .filter(move |(_, active_from)| **active_from <= stage)
            .map(|(constraint, _)| constraint)
    }

    /// Whether every constraint of `C_m` holds; stops at the first failure.
    pub fn feasible(&self, stage: usize, assignment: &Assignment) -> Result<bool> {
        for constraint in self.stage_constraints(stage) {
            if !constraint.is_satisfied(assignment)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reward earned at `stage` given the values assigned so far.
    pub fn reward(&self, stage: usize, assignment: &Assignment) -> Result<f64> {
        match self.mode {
            RewardMode::Feasibility => Ok(if self.feasible(stage, assignment)? {
                1.0
            } else {
                0.0
            }),
            RewardMode::Objective if stage + 1 < self.stages => Ok(0.0),
            RewardMode::Objective => {
                if !self.feasible(stage, assignment)? {
                    return Ok(0.0);
                }
                self.objective_value(assignment)
            }
        }
    }

    /// Objective at a complete assignment
    pub fn objective_value(&self, assignment: &Assignment) -> Result<f64> {
        let (Some(decisions), Some(stochastics)) =
            (assignment.decision_values(), assignment.stochastic_values())
        else {
            return Err(Error::config(
                "objective evaluated before every variable was assigned",
            ));
        };
        Ok(self.objective.evaluate(&decisions, &stochastics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::{DecisionVariable, StochasticVariable};

    fn partition() -> StagePartition {
        StagePartition::new(
            2,
            &[
                DecisionVariable::new("x0", 2, 0),
                DecisionVariable::new("x1", 3, 1),
            ],
            &[
                StochasticVariable::new("s0", 2, 0),
                StochasticVariable::new("s1", 2, 1),
            ],
        )
        .unwrap()
    }

    fn matching(d: &[usize], s: &[usize]) -> f64 {
        if d[0] == s[0] { 5.0 } else { 2.0 }
    }

    #[test]
    fn test_constraints_activate_at_last_scope_stage() {
        let evaluator = RewardEvaluator::new(
            vec![
                Constraint::not_equal("early", VarRef::Decision(0), VarRef::Stochastic(0)),
                Constraint::not_equal("late", VarRef::Decision(0), VarRef::Decision(1)),
                Constraint::new("always", Vec::new(), |_| true),
            ],
            Arc::new(ConstantObjective::default()),
            RewardMode::Feasibility,
            &partition(),
        )
        .unwrap();

        let stage0: Vec<_> = evaluator.stage_constraints(0).map(Constraint::name).collect();
        let stage1: Vec<_> = evaluator.stage_constraints(1).map(Constraint::name).collect();
        assert_eq!(stage0, vec!["early", "always"]);
        assert_eq!(stage1, vec!["early", "late", "always"]);
    }

    #[test]
    fn test_unknown_scope_variable_is_rejected() {
        let result = RewardEvaluator::new(
            vec![Constraint::equal("bad", VarRef::Decision(7), VarRef::Stochastic(0))],
            Arc::new(ConstantObjective::default()),
            RewardMode::Feasibility,
            &partition(),
        );
        assert!(matches!(result, Err(Error::UnknownVariable { .. })));
    }

    #[test]
    fn test_violation_pays_exactly_zero() {
        let evaluator = RewardEvaluator::new(
            vec![Constraint::not_equal("x_ne_s", VarRef::Decision(0), VarRef::Stochastic(0))],
            Arc::new(ConstantObjective::default()),
            RewardMode::Feasibility,
            &partition(),
        )
        .unwrap();

        for x in 0..2 {
            for s in 0..2 {
                let mut assignment = Assignment::new(2, 2);
                assignment.set(VarRef::Decision(0), x);
                assignment.set(VarRef::Stochastic(0), s);
                let reward = evaluator.reward(0, &assignment).unwrap();
                assert_eq!(reward, if x == s { 0.0 } else { 1.0 });
            }
        }
    }

    #[test]
    fn test_objective_paid_once_at_terminal_stage() {
        let evaluator = RewardEvaluator::new(
            vec![Constraint::linear_le(
                "budget",
                vec![(VarRef::Decision(0), 1.0), (VarRef::Decision(1), 1.0)],
                2.0,
            )],
            Arc::new(matching),
            RewardMode::Objective,
            &partition(),
        )
        .unwrap();

        let feasible = Assignment::complete(&[1, 1], &[1, 0]);
        assert_eq!(evaluator.reward(0, &feasible).unwrap(), 0.0);
        assert_eq!(evaluator.reward(1, &feasible).unwrap(), 5.0);

        let over_budget = Assignment::complete(&[1, 2], &[0, 0]);
        assert_eq!(evaluator.reward(1, &over_budget).unwrap(), 0.0);
    }

    #[test]
    fn test_unassigned_scope_is_invariant_violation() {
        let constraint = Constraint::equal("eq", VarRef::Decision(0), VarRef::Decision(1));
        let mut assignment = Assignment::new(2, 0);
        assignment.set(VarRef::Decision(0), 1);
        assert!(matches!(
            constraint.is_satisfied(&assignment),
            Err(Error::UnassignedVariable { .. })
        ));
    }

    #[test]
    fn test_builtin_constraints() {
        let all = Constraint::all_different(
            "distinct",
            [VarRef::Decision(0), VarRef::Decision(1), VarRef::Stochastic(0)],
        );
        assert!(all.is_satisfied(&Assignment::complete(&[0, 2], &[1])).unwrap());
        assert!(!all.is_satisfied(&Assignment::complete(&[1, 2], &[1])).unwrap());

        let forbid = Constraint::forbid(
            "no_zero_pair",
            [VarRef::Decision(0), VarRef::Decision(1)],
            vec![0, 0],
        );
        assert!(!forbid.is_satisfied(&Assignment::complete(&[0, 0], &[])).unwrap());
        assert!(forbid.is_satisfied(&Assignment::complete(&[0, 1], &[])).unwrap());
    }
}
