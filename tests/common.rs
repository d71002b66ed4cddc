//! Shared problem fixtures for the stageq integration tests.

use stageq::{
    Problem,
    q_learning::{Exploration, LearningRate, TrainerConfig},
    reward::RewardMode,
};

/// One stage, `x` and `s` over `{0, 1}`, objective `1` when `x == s`.
pub fn matching_problem() -> Problem {
    Problem::builder()
        .decision("x", 2, 0)
        .stochastic("s", 2, 0)
        .objective(|d: &[usize], s: &[usize]| if d[0] == s[0] { 1.0 } else { 0.0 })
        .build()
        .unwrap()
}

/// Greedy, undiscounted, full-overwrite settings used by the convergence scenarios.
pub fn greedy_config(episodes: usize, seed: u64, mode: RewardMode) -> TrainerConfig {
    TrainerConfig::new(episodes)
        .with_seed(seed)
        .with_gamma(0.0)
        .with_learning_rate(LearningRate::Constant { value: 1.0 })
        .with_exploration(Exploration::Constant { value: 0.0 })
        .with_reward_mode(mode)
}

/// Problem file for the CLI tests: two stages, one constraint.
pub const TWO_STAGE_JSON: &str = r#"{
    "decisions": [
        { "name": "order", "size": 3, "stage": 0 },
        { "name": "route", "size": 2, "stage": 1 }
    ],
    "stochastics": [
        { "name": "demand", "size": 3, "stage": 0,
          "distribution": { "kind": "categorical", "weights": [0.2, 0.5, 0.3] } },
        { "name": "weather", "size": 2, "stage": 1,
          "distribution": { "kind": "bernoulli", "p": 0.25 } }
    ],
    "constraints": [
        { "kind": "not_equal", "name": "route_ok", "a": "route", "b": "weather" }
    ],
    "objective": { "kind": "match", "pairs": [["order", "demand"]] },
    "trainer": { "episodes": 40, "seed": 11, "gamma": 0.9 }
}"#;
