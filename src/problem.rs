//! Assembled optimization problem: variables, stages, constraints and objective.

use std::{fmt, sync::Arc};

use crate::{
    Error, Result,
    reward::{ConstantObjective, Constraint, Objective, RewardEvaluator, RewardMode},
    sampling::{Distribution, IndependentSampler},
    variables::{DecisionVariable, StagePartition, StochasticVariable, VarRef},
};

/// A validated multi-stage problem.
///
/// Create one with [`Problem::builder`]. The stage partition is fixed at
/// build time.
#[derive(Clone)]
pub struct Problem {
    decisions: Vec<DecisionVariable>,
    stochastics: Vec<StochasticVariable>,
    partition: StagePartition,
    constraints: Vec<Constraint>,
    objective: Arc<dyn Objective>,
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("decisions", &self.decisions)
            .field("stochastics", &self.stochastics)
            .field("stages", &self.partition.stages())
            .field("constraints", &self.constraints)
            .finish_non_exhaustive()
    }
}

impl Problem {
    pub fn builder() -> ProblemBuilder {
        ProblemBuilder::default()
    }

    pub fn decisions(&self) -> &[DecisionVariable] {
        &self.decisions
    }

    pub fn stochastics(&self) -> &[StochasticVariable] {
        &self.stochastics
    }

    pub fn partition(&self) -> &StagePartition {
        &self.partition
    }

    pub fn stages(&self) -> usize {
        self.partition.stages()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn decision_domains(&self) -> Vec<usize> {
        self.decisions.iter().map(|v| v.size).collect()
    }

    pub fn stochastic_domains(&self) -> Vec<usize> {
        self.stochastics.iter().map(|v| v.size).collect()
    }

    /// Look up a variable by name
    pub fn var(&self, name: &str) -> Option<VarRef> {
        lookup(&self.decisions, &self.stochastics, name)
    }

    /// Name of a referenced variable
    pub fn var_name(&self, var: VarRef) -> Option<&str> {
        match var {
            VarRef::Decision(i) => self.decisions.get(i).map(|v| v.name.as_str()),
            VarRef::Stochastic(i) => self.stochastics.get(i).map(|v| v.name.as_str()),
        }
    }

    pub fn reward_evaluator(&self, mode: RewardMode) -> Result<RewardEvaluator> {
        RewardEvaluator::new(
            self.constraints.clone(),
            Arc::clone(&self.objective),
            mode,
            &self.partition,
        )
    }

    /// Sampler drawing every stochastic variable from its declared distribution
    pub fn sampler(&self) -> Result<IndependentSampler> {
        IndependentSampler::new(&self.stochastics)
    }
}

fn lookup(
    decisions: &[DecisionVariable],
    stochastics: &[StochasticVariable],
    name: &str,
) -> Option<VarRef> {
    decisions
        .iter()
        .position(|v| v.name == name)
        .map(VarRef::Decision)
        .or_else(|| {
            stochastics
                .iter()
                .position(|v| v.name == name)
                .map(VarRef::Stochastic)
        })
}

/// Builder for [`Problem`].
///
/// # Examples
///
/// ```
/// use stageq::{Problem, reward::Constraint};
///
/// let problem = Problem::builder()
///     .decision("x", 2, 0)
///     .stochastic("s", 2, 0)
///     .constraint_with(|p| {
///         Constraint::not_equal("x_ne_s", p.var("x").unwrap(), p.var("s").unwrap())
///     })
///     .build()
///     .unwrap();
/// assert_eq!(problem.stages(), 1);
/// ```
#[derive(Default)]
pub struct ProblemBuilder {
    stages: Option<usize>,
    decisions: Vec<DecisionVariable>,
    stochastics: Vec<StochasticVariable>,
    constraints: Vec<Constraint>,
    objective: Option<Arc<dyn Objective>>,
}

/// Name lookup available while constraints are being declared.
pub struct VariableLookup<'a> {
    decisions: &'a [DecisionVariable],
    stochastics: &'a [StochasticVariable],
}

impl VariableLookup<'_> {
    pub fn var(&self, name: &str) -> Option<VarRef> {
        lookup(self.decisions, self.stochastics, name)
    }
}

impl ProblemBuilder {
    /// Set the number of stages. Defaults to one past the largest stage used.
    pub fn stages(mut self, stages: usize) -> Self {
        self.stages = Some(stages);
        self
    }

    pub fn decision(mut self, name: impl Into<String>, size: usize, stage: usize) -> Self {
        self.decisions.push(DecisionVariable::new(name, size, stage));
        self
    }

    /// Add a uniformly distributed stochastic variable.
    pub fn stochastic(self, name: impl Into<String>, size: usize, stage: usize) -> Self {
        self.stochastic_with(name, size, stage, Distribution::Uniform)
    }

    pub fn stochastic_with(
        mut self,
        name: impl Into<String>,
        size: usize,
        stage: usize,
        distribution: Distribution,
    ) -> Self {
        self.stochastics
            .push(StochasticVariable::new(name, size, stage).with_distribution(distribution));
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Add a constraint built from the variables declared so far.
    pub fn constraint_with<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&VariableLookup<'_>) -> Constraint,
    {
        let constraint = build(&VariableLookup {
            decisions: &self.decisions,
            stochastics: &self.stochastics,
        });
        self.constraints.push(constraint);
        self
    }

    /// Set the objective; defaults to the constant `1`.
    pub fn objective(mut self, objective: impl Objective + 'static) -> Self {
        self.objective = Some(Arc::new(objective));
        self
    }

    pub fn objective_arc(mut self, objective: Arc<dyn Objective>) -> Self {
        self.objective = Some(objective);
        self
    }

    /// Validate and assemble the problem.
    ///
    /// # Errors
    ///
    /// Any configuration error: bad stage assignment, empty domain,
    /// duplicate name, distribution not matching its domain, or a
    /// constraint referencing an unknown variable.
    pub fn build(self) -> Result<Problem> {
        let stages = match self.stages {
            Some(stages) => stages,
            None => self
                .decisions
                .iter()
                .map(|v| v.stage)
                .chain(self.stochastics.iter().map(|v| v.stage))
                .max()
                .map_or(1, |last| last + 1),
        };
        if self.decisions.is_empty() {
            return Err(Error::config("at least one decision variable is required"));
        }

        let partition = StagePartition::new(stages, &self.decisions, &self.stochastics)?;
        for var in &self.stochastics {
            var.distribution.validate(&var.name, var.size)?;
        }

        let problem = Problem {
            decisions: self.decisions,
            stochastics: self.stochastics,
            partition,
            constraints: self.constraints,
            objective: self
                .objective
                .unwrap_or_else(|| Arc::new(ConstantObjective::default())),
        };
        // scope check
        problem.reward_evaluator(RewardMode::Feasibility)?;
        Ok(problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_count_inferred_from_variables() {
        let problem = Problem::builder()
            .decision("a", 2, 0)
            .decision("b", 2, 2)
            .stochastic("s", 3, 1)
            .build()
            .unwrap();
        assert_eq!(problem.stages(), 3);
        assert!(problem.partition().decisions(1).is_empty());
        assert_eq!(problem.var("s"), Some(VarRef::Stochastic(0)));
        assert_eq!(problem.var_name(VarRef::Decision(1)), Some("b"));
    }

    #[test]
    fn test_build_rejects_invalid_problems() {
        assert!(Problem::builder().stochastic("s", 2, 0).build().is_err());

        let bad_stage = Problem::builder().stages(1).decision("x", 2, 1).build();
        assert!(matches!(bad_stage, Err(Error::InvalidStage { .. })));

        let bad_distribution = Problem::builder()
            .decision("x", 2, 0)
            .stochastic_with("s", 3, 0, Distribution::Bernoulli { p: 0.5 })
            .build();
        assert!(matches!(
            bad_distribution,
            Err(Error::InvalidDistribution { .. })
        ));

        let bad_scope = Problem::builder()
            .decision("x", 2, 0)
            .constraint(Constraint::equal(
                "eq",
                VarRef::Decision(0),
                VarRef::Stochastic(0),
            ))
            .build();
        assert!(matches!(bad_scope, Err(Error::UnknownVariable { .. })));
    }
}
