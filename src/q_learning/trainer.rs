//! Episodic trainer
//!
//! One episode walks the stages in order. At each stage the trainer samples
//! the stage's stochastic variables, picks the stage's decisions
//! (ε-greedy over [`StageResolver::stage_argmax`]) and accumulates
//!
//! ```text
//! qhat += reward(C_m, x, s) + gamma * stage_max(m)
//! ```
//!
//! Every read during the episode goes to the current table `Q0`. The single
//! update of the episode is written into `Q1`, and the two tables swap only
//! once the episode is complete.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Error, Result,
    ports::TrainingObserver,
    problem::Problem,
    q_learning::{
        policy::GreedyPolicy,
        q_table::{QInit, QTable},
        resolver::StageResolver,
        schedule::{Exploration, LearningRate},
    },
    reward::{RewardEvaluator, RewardMode},
    sampling::{IndependentSampler, Sampler},
    variables::{Assignment, StagePartition, VarRef},
};

/// Early-stop rule: stop once the written entry moved less than `tolerance`
/// for `patience` consecutive episodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    pub tolerance: f64,
    pub patience: usize,
}

/// Hyperparameters of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Episode budget `N`
    pub episodes: usize,
    /// Discount `gamma`
    pub gamma: f64,
    pub learning_rate: LearningRate,
    pub exploration: Exploration,
    pub reward_mode: RewardMode,
    pub q_init: QInit,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
    pub convergence: Option<Convergence>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            episodes: 1000,
            gamma: 0.95,
            learning_rate: LearningRate::default(),
            exploration: Exploration::default(),
            reward_mode: RewardMode::default(),
            q_init: QInit::default(),
            seed: None,
            convergence: None,
        }
    }
}

impl TrainerConfig {
    pub fn new(episodes: usize) -> Self {
        Self {
            episodes,
            ..Self::default()
        }
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: LearningRate) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_exploration(mut self, exploration: Exploration) -> Self {
        self.exploration = exploration;
        self
    }

    pub fn with_reward_mode(mut self, mode: RewardMode) -> Self {
        self.reward_mode = mode;
        self
    }

    pub fn with_q_init(mut self, init: QInit) -> Self {
        self.q_init = init;
        self
    }

    /// Set the random seed for deterministic behavior.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_convergence(mut self, tolerance: f64, patience: usize) -> Self {
        self.convergence = Some(Convergence {
            tolerance,
            patience,
        });
        self
    }

    /// Check every hyperparameter before any episode runs.
    pub fn validate(&self) -> Result<()> {
        if self.episodes == 0 {
            return Err(Error::config("episode budget must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(Error::config(format!(
                "discount factor {} outside [0, 1]",
                self.gamma
            )));
        }
        self.learning_rate.validate()?;
        self.exploration.validate()?;
        self.q_init.validate()?;
        if let Some(rule) = self.convergence {
            if !(rule.tolerance.is_finite() && rule.tolerance >= 0.0) || rule.patience == 0 {
                return Err(Error::config(
                    "convergence needs a finite non-negative tolerance and patience >= 1",
                ));
            }
        }
        Ok(())
    }
}

/// Shared flag that stops training at the next episode boundary.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened at one stage of an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStep {
    pub stage: usize,
    /// Sampled values of `L_S(m)`
    pub stochastics: Vec<usize>,
    /// Chosen values of `L_D(m)`
    pub decisions: Vec<usize>,
    /// Whether the decisions came from exploration
    pub explored: bool,
    pub reward: f64,
    /// `stage_max` term before discounting
    pub continuation: f64,
}

/// Result of a single episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    /// 0-based episode index over the lifetime of the trainer
    pub episode: usize,
    pub decisions: Vec<usize>,
    pub stochastics: Vec<usize>,
    pub steps: Vec<StageStep>,
    /// Accumulated update target
    pub qhat: f64,
    pub alpha: f64,
    pub epsilon: f64,
    /// Whether every constraint holds for the completed assignment
    pub feasible: bool,
    /// Entry value before and after the update
    pub previous: f64,
    pub updated: f64,
}

impl EpisodeOutcome {
    pub fn explored_stages(&self) -> usize {
        self.steps.iter().filter(|step| step.explored).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The episode budget was exhausted
    Budget,
    Converged,
    Interrupted,
}

/// Result of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub episodes: usize,
    pub stop_reason: StopReason,
    pub mean_qhat: f64,
    pub last_qhat: f64,
    pub feasibility_rate: f64,
    /// Fraction of stage decisions taken by exploration
    pub exploration_rate: f64,
}

impl TrainingReport {
    /// Save report to JSON file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

pub(crate) fn build_rng(seed: Option<u64>) -> StdRng {
    if let Some(seed) = seed {
        StdRng::seed_from_u64(seed)
    } else {
        StdRng::from_rng(&mut rand::rng())
    }
}

/// Episodic stage-marginalized Q-learning trainer
pub struct EpisodeTrainer<S = IndependentSampler> {
    config: TrainerConfig,
    partition: StagePartition,
    decision_domains: Vec<usize>,
    resolver: StageResolver,
    evaluator: RewardEvaluator,
    sampler: S,
    q0: QTable,
    q1: QTable,
    rng: StdRng,
    episodes_run: usize,
    observers: Vec<Box<dyn TrainingObserver>>,
    interrupt: Option<InterruptHandle>,
}

impl EpisodeTrainer<IndependentSampler> {
    /// Create a trainer that samples from the problem's declared distributions.
    pub fn new(problem: &Problem, config: TrainerConfig) -> Result<Self> {
        let sampler = problem.sampler()?;
        Self::with_sampler(problem, config, sampler)
    }
}

impl<S: Sampler> EpisodeTrainer<S> {
    /// Create a trainer with a caller-provided sampler.
    ///
    /// All configuration is validated here; no episode runs on a bad setup.
    pub fn with_sampler(problem: &Problem, config: TrainerConfig, sampler: S) -> Result<Self> {
        config.validate()?;
        let decision_domains = problem.decision_domains();
        let resolver = StageResolver::new(
            &decision_domains,
            &problem.stochastic_domains(),
            problem.partition(),
        )?;
        let evaluator = problem.reward_evaluator(config.reward_mode)?;

        let mut rng = build_rng(config.seed);
        let rows = resolver.decision_index().len();
        let cols = resolver.stochastic_index().len();
        let q0 = QTable::initialize(rows, cols, &config.q_init, &mut rng);
        let q1 = QTable::zeros(rows, cols);

        Ok(Self {
            config,
            partition: problem.partition().clone(),
            decision_domains,
            resolver,
            evaluator,
            sampler,
            q0,
            q1,
            rng,
            episodes_run: 0,
            observers: Vec::new(),
            interrupt: None,
        })
    }

    /// Add an observer to the trainer
    pub fn with_observer(mut self, observer: Box<dyn TrainingObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Stop at the next episode boundary once `handle` is raised.
    pub fn with_interrupt(mut self, handle: InterruptHandle) -> Self {
        self.interrupt = Some(handle);
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// The current (read) table `Q0`
    pub fn q_table(&self) -> &QTable {
        &self.q0
    }

    pub fn into_q_table(self) -> QTable {
        self.q0
    }

    pub fn resolver(&self) -> &StageResolver {
        &self.resolver
    }

    pub fn evaluator(&self) -> &RewardEvaluator {
        &self.evaluator
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn episodes_run(&self) -> usize {
        self.episodes_run
    }

    /// Greedy policy over the current table
    pub fn policy(&self) -> GreedyPolicy<'_> {
        GreedyPolicy::new(&self.resolver, &self.q0, &self.partition)
    }

    /// Run one episode and apply its update.
    pub fn run_episode(&mut self) -> Result<EpisodeOutcome> {
        let episode = self.episodes_run;
        let epsilon = self.config.exploration.at(episode);
        let alpha = self.config.learning_rate.at(episode + 1);
        let gamma = self.config.gamma;

        for observer in &mut self.observers {
            observer.on_episode_start(episode)?;
        }

        let mut assignment = Assignment::new(
            self.partition.decision_count(),
            self.partition.stochastic_count(),
        );
        let mut steps = Vec::with_capacity(self.partition.stages());
        let mut qhat = 0.0;

        for stage in 0..self.partition.stages() {
            let mut sm = Vec::with_capacity(self.partition.stochastics(stage).len());
            for &var in self.partition.stochastics(stage) {
                let value = self.sampler.sample(var, &mut self.rng);
                assignment.set(VarRef::Stochastic(var), value);
                sm.push(value);
            }

            let explored = self.rng.random::<f64>() < epsilon;
            let xm: Vec<usize> = if explored {
                // independent uniform draw per variable
                self.partition
                    .decisions(stage)
                    .iter()
                    .map(|&var| self.rng.random_range(0..self.decision_domains[var]))
                    .collect()
            } else {
                self.resolver.stage_argmax(&self.q0, stage, &sm)?.values
            };
            for (&var, &value) in self.partition.decisions(stage).iter().zip(&xm) {
                assignment.set(VarRef::Decision(var), value);
            }

            let reward = self.evaluator.reward(stage, &assignment)?;
            let continuation = self.resolver.stage_max(&self.q0, stage, &sm)?;
            qhat += reward + gamma * continuation;

            steps.push(StageStep {
                stage,
                stochastics: sm,
                decisions: xm,
                explored,
                reward,
                continuation,
            });
        }

        let (Some(decisions), Some(stochastics)) =
            (assignment.decision_values(), assignment.stochastic_values())
        else {
            return Err(Error::config(
                "stage partition left a variable without a value",
            ));
        };
        let d_idx = self.resolver.decision_index().index_of(&decisions)?;
        let s_idx = self.resolver.stochastic_index().index_of(&stochastics)?;
        let feasible = self
            .evaluator
            .feasible(self.partition.stages() - 1, &assignment)?;

        let previous = self.q0.get(d_idx, s_idx);
        let updated = self
            .q0
            .blend_into(&mut self.q1, d_idx, s_idx, qhat, alpha)?;
        std::mem::swap(&mut self.q0, &mut self.q1);
        self.episodes_run += 1;

        debug!(
            episode,
            qhat,
            alpha,
            epsilon,
            explored = steps.iter().filter(|step| step.explored).count(),
            feasible,
            d_idx,
            s_idx,
            "episode complete"
        );

        Ok(EpisodeOutcome {
            episode,
            decisions,
            stochastics,
            steps,
            qhat,
            alpha,
            epsilon,
            feasible,
            previous,
            updated,
        })
    }

    /// Run up to `config.episodes` episodes.
    ///
    /// Stops early when the interrupt handle is raised (checked between
    /// episodes) or the convergence rule fires.
    pub fn train(&mut self) -> Result<TrainingReport> {
        let budget = self.config.episodes;
        info!(
            episodes = budget,
            gamma = self.config.gamma,
            stages = self.partition.stages(),
            decision_combos = self.resolver.decision_index().len(),
            stochastic_combos = self.resolver.stochastic_index().len(),
            seed = ?self.config.seed,
            "starting training"
        );

        for observer in &mut self.observers {
            observer.on_training_start(budget)?;
        }

        let mut stop_reason = StopReason::Budget;
        let mut episodes = 0;
        let mut qhat_sum = 0.0;
        let mut last_qhat = 0.0;
        let mut feasible = 0;
        let mut explored = 0;
        let mut calm = 0;

        for _ in 0..budget {
            if self
                .interrupt
                .as_ref()
                .is_some_and(InterruptHandle::is_interrupted)
            {
                stop_reason = StopReason::Interrupted;
                break;
            }

            let outcome = self.run_episode()?;
            for observer in &mut self.observers {
                observer.on_episode_end(&outcome)?;
            }

            episodes += 1;
            qhat_sum += outcome.qhat;
            last_qhat = outcome.qhat;
            feasible += usize::from(outcome.feasible);
            explored += outcome.explored_stages();

            if let Some(rule) = self.config.convergence {
                if (outcome.updated - outcome.previous).abs() < rule.tolerance {
                    calm += 1;
                } else {
                    calm = 0;
                }
                if calm >= rule.patience {
                    stop_reason = StopReason::Converged;
                    break;
                }
            }
        }

        let rate = |count: usize, total: usize| {
            if total > 0 {
                count as f64 / total as f64
            } else {
                0.0
            }
        };
        let report = TrainingReport {
            episodes,
            stop_reason,
            mean_qhat: if episodes > 0 {
                qhat_sum / episodes as f64
            } else {
                0.0
            },
            last_qhat,
            feasibility_rate: rate(feasible, episodes),
            exploration_rate: rate(explored, episodes * self.partition.stages()),
        };

        if stop_reason != StopReason::Budget {
            warn!(
                ?stop_reason,
                episodes,
                budget,
                "training stopped before exhausting the episode budget"
            );
        }
        info!(
            episodes,
            mean_qhat = report.mean_qhat,
            feasibility_rate = report.feasibility_rate,
            "training finished"
        );

        for observer in &mut self.observers {
            observer.on_training_end(&report)?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rand::RngCore;

    use super::*;
    use crate::reward::Constraint;

    fn two_stage_problem() -> Problem {
        Problem::builder()
            .decision("x0", 2, 0)
            .decision("x1", 3, 1)
            .stochastic("s0", 2, 0)
            .stochastic("s1", 2, 1)
            .constraint_with(|p| {
                Constraint::not_equal("x0_ne_s0", p.var("x0").unwrap(), p.var("s0").unwrap())
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_oversized_problem_fails_before_training() {
        let problem = Problem::builder()
            .decision("a", 1 << 33, 0)
            .decision("b", 1 << 33, 0)
            .stochastic("s", 2, 0)
            .build()
            .unwrap();
        assert!(matches!(
            EpisodeTrainer::new(&problem, TrainerConfig::new(5)),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        let problem = two_stage_problem();
        for config in [
            TrainerConfig::new(0),
            TrainerConfig::new(5).with_gamma(1.5),
            TrainerConfig::new(5).with_learning_rate(LearningRate::Constant { value: 2.0 }),
            TrainerConfig::new(5).with_exploration(Exploration::Constant { value: -0.5 }),
            TrainerConfig::new(5).with_q_init(QInit::Uniform {
                low: 1.0,
                high: 1.0,
            }),
            TrainerConfig::new(5).with_q_init(QInit::Uniform {
                low: -1.7e308,
                high: 1.7e308,
            }),
            TrainerConfig::new(5).with_q_init(QInit::Uniform {
                low: f64::NEG_INFINITY,
                high: 0.0,
            }),
            TrainerConfig::new(5).with_convergence(0.1, 0),
        ] {
            assert!(
                matches!(
                    EpisodeTrainer::new(&problem, config),
                    Err(Error::InvalidConfiguration { .. })
                ),
                "expected configuration error"
            );
        }
    }

    #[test]
    fn test_episode_updates_exactly_one_entry() {
        let problem = two_stage_problem();
        let config = TrainerConfig::new(1)
            .with_seed(5)
            .with_learning_rate(LearningRate::Constant { value: 1.0 });
        let mut trainer = EpisodeTrainer::new(&problem, config).unwrap();
        let before = trainer.q_table().clone();
        let outcome = trainer.run_episode().unwrap();
        let after = trainer.q_table();

        let changed: Vec<_> = before
            .values()
            .indexed_iter()
            .filter(|(idx, v)| after.values()[*idx] != **v)
            .map(|(idx, _)| idx)
            .collect();
        assert!(changed.len() <= 1);
        assert_eq!(outcome.updated, outcome.qhat);
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(trainer.episodes_run(), 1);
    }

    #[test]
    fn test_qhat_accumulates_rewards_and_continuation() {
        let problem = two_stage_problem();
        let config = TrainerConfig::new(1).with_seed(9).with_gamma(0.5);
        let mut trainer = EpisodeTrainer::new(&problem, config).unwrap();
        let outcome = trainer.run_episode().unwrap();

        let expected: f64 = outcome
            .steps
            .iter()
            .map(|step| step.reward + 0.5 * step.continuation)
            .sum();
        assert_eq!(outcome.qhat, expected);
        assert_eq!(outcome.steps[1].continuation, 0.0);
    }

    #[test]
    fn test_exploration_draws_each_variable_independently() {
        let problem = Problem::builder()
            .decision("a", 3, 0)
            .decision("b", 4, 0)
            .stochastic("s", 2, 0)
            .build()
            .unwrap();
        let config = TrainerConfig::new(400)
            .with_seed(21)
            .with_exploration(Exploration::Constant { value: 1.0 });
        let mut trainer = EpisodeTrainer::new(&problem, config).unwrap();

        let mut seen_a = [false; 3];
        let mut seen_b = [false; 4];
        for _ in 0..400 {
            let outcome = trainer.run_episode().unwrap();
            assert!(outcome.steps[0].explored);
            seen_a[outcome.decisions[0]] = true;
            seen_b[outcome.decisions[1]] = true;
        }
        assert!(seen_a.iter().all(|s| *s));
        assert!(seen_b.iter().all(|s| *s));
    }

    #[test]
    fn test_out_of_domain_sample_fails_fast() {
        let problem = two_stage_problem();
        let broken = |_var: usize, _rng: &mut dyn RngCore| 7usize;
        let mut trainer =
            EpisodeTrainer::with_sampler(&problem, TrainerConfig::new(1).with_seed(1), broken)
                .unwrap();
        assert!(matches!(
            trainer.run_episode(),
            Err(Error::CombinationNotFound { .. })
        ));
    }

    #[test]
    fn test_interrupt_stops_between_episodes() {
        let problem = two_stage_problem();
        let handle = InterruptHandle::new();
        handle.interrupt();
        let mut trainer = EpisodeTrainer::new(&problem, TrainerConfig::new(10).with_seed(3))
            .unwrap()
            .with_interrupt(handle);
        let before = trainer.q_table().clone();
        let report = trainer.train().unwrap();
        assert_eq!(report.stop_reason, StopReason::Interrupted);
        assert_eq!(report.episodes, 0);
        assert_eq!(trainer.q_table(), &before);
    }

    #[test]
    fn test_convergence_rule_stops_early() {
        let problem = Problem::builder()
            .decision("x", 1, 0)
            .stochastic("s", 1, 0)
            .build()
            .unwrap();
        // single entry, target always 1: after the first write it stops moving
        let config = TrainerConfig::new(100)
            .with_seed(2)
            .with_gamma(0.0)
            .with_learning_rate(LearningRate::Constant { value: 1.0 })
            .with_convergence(1e-12, 3);
        let mut trainer = EpisodeTrainer::new(&problem, config).unwrap();
        let report = trainer.train().unwrap();
        assert_eq!(report.stop_reason, StopReason::Converged);
        assert_eq!(report.episodes, 4);
        assert_eq!(trainer.q_table().get(0, 0), 1.0);
    }

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl TrainingObserver for Recorder {
        fn on_training_start(&mut self, total_episodes: usize) -> Result<()> {
            self.0.lock().unwrap().push(format!("start {total_episodes}"));
            Ok(())
        }

        fn on_episode_end(&mut self, outcome: &EpisodeOutcome) -> Result<()> {
            self.0.lock().unwrap().push(format!("episode {}", outcome.episode));
            Ok(())
        }

        fn on_training_end(&mut self, report: &TrainingReport) -> Result<()> {
            self.0.lock().unwrap().push(format!("end {}", report.episodes));
            Ok(())
        }
    }

    #[test]
    fn test_observers_see_event_sequence() {
        let problem = two_stage_problem();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut trainer = EpisodeTrainer::new(&problem, TrainerConfig::new(2).with_seed(4))
            .unwrap()
            .with_observer(Box::new(Recorder(Arc::clone(&log))));
        trainer.train().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start 2", "episode 0", "episode 1", "end 2"]
        );
    }
}
