//! Greedy policy extraction from a trained table

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    q_learning::{
        q_table::QTable,
        resolver::{StageDecision, StageResolver},
    },
    reward::RewardEvaluator,
    sampling::Sampler,
    variables::{Assignment, StagePartition},
};

/// Summary of the greedy policy over sampled scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub scenarios: usize,
    pub feasible: usize,
    pub feasibility_rate: f64,
    /// Mean objective over feasible scenarios
    pub mean_objective: f64,
    /// Mean of the summed stage rewards over all scenarios
    pub mean_reward: f64,
}

/// Exploration-free policy: `stage_argmax` at every stage.
#[derive(Debug, Clone, Copy)]
pub struct GreedyPolicy<'a> {
    resolver: &'a StageResolver,
    q0: &'a QTable,
    partition: &'a StagePartition,
}

impl<'a> GreedyPolicy<'a> {
    pub fn new(resolver: &'a StageResolver, q0: &'a QTable, partition: &'a StagePartition) -> Self {
        Self {
            resolver,
            q0,
            partition,
        }
    }

    /// Greedy decision for one stage given that stage's stochastic values.
    pub fn stage_decision(&self, stage: usize, sm: &[usize]) -> Result<StageDecision> {
        self.resolver.stage_argmax(self.q0, stage, sm)
    }

    /// Full decision vector for a full stochastic vector.
    ///
    /// Each stage only looks at its own stochastic values.
    pub fn decide(&self, stochastics: &[usize]) -> Result<Vec<usize>> {
        if stochastics.len() != self.partition.stochastic_count() {
            return Err(Error::CombinationNotFound {
                combo: stochastics.to_vec(),
            });
        }

        let mut decisions = vec![0; self.partition.decision_count()];
        for stage in 0..self.partition.stages() {
            let sm: Vec<usize> = self
                .partition
                .stochastics(stage)
                .iter()
                .map(|&var| stochastics[var])
                .collect();
            let choice = self.stage_decision(stage, &sm)?;
            for (&var, value) in self.partition.decisions(stage).iter().zip(choice.values) {
                decisions[var] = value;
            }
        }
        Ok(decisions)
    }

    /// Play the policy on `scenarios` sampled stochastic vectors.
    pub fn evaluate<S: Sampler + ?Sized>(
        &self,
        sampler: &S,
        evaluator: &RewardEvaluator,
        scenarios: usize,
        rng: &mut dyn RngCore,
    ) -> Result<PolicyEvaluation> {
        let last = self.partition.stages() - 1;
        let mut feasible = 0;
        let mut objective_sum = 0.0;
        let mut reward_sum = 0.0;

        for _ in 0..scenarios {
            let stochastics: Vec<usize> = (0..self.partition.stochastic_count())
                .map(|var| sampler.sample(var, rng))
                .collect();
            let decisions = self.decide(&stochastics)?;
            let assignment = Assignment::complete(&decisions, &stochastics);

            for stage in 0..self.partition.stages() {
                reward_sum += evaluator.reward(stage, &assignment)?;
            }
            if evaluator.feasible(last, &assignment)? {
                feasible += 1;
                objective_sum += evaluator.objective_value(&assignment)?;
            }
        }

        let per = |total: f64, count: usize| {
            if count > 0 { total / count as f64 } else { 0.0 }
        };
        Ok(PolicyEvaluation {
            scenarios,
            feasible,
            feasibility_rate: per(feasible as f64, scenarios),
            mean_objective: per(objective_sum, feasible),
            mean_reward: per(reward_sum, scenarios),
        })
    }
}
