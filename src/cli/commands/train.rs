//! Train command - Run episodic Q-learning on a problem file

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use serde_json::to_writer_pretty;

use crate::{
    cli::output::{
        format_assignment, format_number, format_percent, print_kv, print_section,
        print_subsection,
    },
    config::ProblemFile,
    pipeline::{JsonlObserver, MetricsObserver, MetricsSummary, ProgressObserver},
    problem::Problem,
    q_learning::{
        EpisodeTrainer, Exploration, LearningRate, PolicyEvaluation, TrainerConfig,
        TrainingReport, trainer::build_rng,
    },
    reward::RewardMode,
};

/// Greedy table rows are printed only for stages with at most this many
/// stochastic combinations.
const MAX_POLICY_ROWS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RewardArg {
    /// 1 per stage when every active constraint holds
    Feasibility,
    /// Objective once at the last stage, gated by feasibility
    Objective,
}

impl From<RewardArg> for RewardMode {
    fn from(arg: RewardArg) -> Self {
        match arg {
            RewardArg::Feasibility => RewardMode::Feasibility,
            RewardArg::Objective => RewardMode::Objective,
        }
    }
}

#[derive(Parser, Debug)]
#[command(about = "Train a stage-marginalized Q-learner", allow_negative_numbers = true)]
pub struct TrainArgs {
    /// Problem description (JSON)
    pub problem: PathBuf,

    /// Number of training episodes (overrides the problem file)
    #[arg(long, short = 'n')]
    pub episodes: Option<usize>,

    /// Random seed for reproducibility (overrides the problem file)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Discount factor
    #[arg(long)]
    pub gamma: Option<f64>,

    /// Constant learning rate
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Constant exploration probability
    #[arg(long)]
    pub epsilon: Option<f64>,

    /// Reward convention
    #[arg(long, value_enum)]
    pub reward: Option<RewardArg>,

    /// Optional file for JSONL episode observations
    #[arg(long)]
    pub observations: Option<PathBuf>,

    /// Optional path for writing a summary JSON file
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Scenarios used to evaluate the greedy policy after training (0 skips)
    #[arg(long, default_value_t = 1000)]
    pub evaluate: usize,

    /// Episodes averaged by the windowed metrics
    #[arg(long, default_value_t = 100)]
    pub metrics_window: usize,
}

#[derive(Debug, Serialize)]
struct TrainingSummaryFile<'a> {
    problem: String,
    config: &'a TrainerConfig,
    training: &'a TrainingReport,
    metrics: MetricsSummary,
    evaluation: Option<PolicyEvaluation>,
}

fn sanitize_summary_path(raw: &Path) -> PathBuf {
    let mut normalized = raw.to_path_buf();
    let raw_str = raw.as_os_str().to_string_lossy();

    // Treat trailing separators or missing filename as a directory target.
    if raw_str.ends_with(std::path::MAIN_SEPARATOR) || normalized.file_name().is_none() {
        normalized.push("training_summary.json");
        return normalized;
    }

    match normalized.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => normalized,
        _ => {
            normalized.set_extension("json");
            normalized
        }
    }
}

fn apply_overrides(mut config: TrainerConfig, args: &TrainArgs) -> TrainerConfig {
    if let Some(episodes) = args.episodes {
        config.episodes = episodes;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(gamma) = args.gamma {
        config.gamma = gamma;
    }
    if let Some(value) = args.alpha {
        config.learning_rate = LearningRate::Constant { value };
    }
    if let Some(value) = args.epsilon {
        config.exploration = Exploration::Constant { value };
    }
    if let Some(reward) = args.reward {
        config.reward_mode = reward.into();
    }
    config
}

/// Execute the train command
pub fn execute(args: TrainArgs) -> Result<()> {
    let file = ProblemFile::load(&args.problem)
        .with_context(|| format!("Failed to load problem file {}", args.problem.display()))?;
    let (problem, config) = file.compile().context("Invalid problem definition")?;
    let config = apply_overrides(config, &args);

    let metrics = Arc::new(Mutex::new(MetricsObserver::new(args.metrics_window)));
    let mut trainer = EpisodeTrainer::new(&problem, config.clone())
        .context("Failed to set up trainer")?
        .with_observer(Box::new(Arc::clone(&metrics)));
    if !args.no_progress {
        trainer = trainer.with_observer(Box::new(ProgressObserver::new()));
    }
    if let Some(path) = &args.observations {
        let observer = JsonlObserver::new(path)
            .with_context(|| format!("Failed to open observation file {}", path.display()))?;
        trainer = trainer.with_observer(Box::new(observer));
    }

    let report = trainer.train().context("Training failed")?;
    let metrics = metrics
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .summary();

    print_section("Training Results");
    print_kv("Episodes", &format_number(report.episodes));
    print_kv("Stop reason", &format!("{:?}", report.stop_reason));
    print_kv("Mean qhat", &format!("{:.4}", report.mean_qhat));
    print_kv("Last qhat", &format!("{:.4}", report.last_qhat));
    print_kv("Feasible", &format_percent(report.feasibility_rate));
    print_kv("Explored", &format_percent(report.exploration_rate));
    print_kv(
        "Recent feasible",
        &format!(
            "{} (last {} episodes)",
            format_percent(metrics.recent_feasibility_rate),
            metrics.window
        ),
    );

    print_policy(&problem, &trainer)?;

    let evaluation = if args.evaluate > 0 {
        let mut rng = build_rng(config.seed.map(|seed| seed.wrapping_add(1)));
        let evaluation = trainer
            .policy()
            .evaluate(trainer.sampler(), trainer.evaluator(), args.evaluate, &mut rng)
            .context("Policy evaluation failed")?;

        print_section("Greedy Policy Evaluation");
        print_kv("Scenarios", &format_number(evaluation.scenarios));
        print_kv("Feasible", &format_percent(evaluation.feasibility_rate));
        print_kv("Mean objective", &format!("{:.4}", evaluation.mean_objective));
        print_kv("Mean reward", &format!("{:.4}", evaluation.mean_reward));
        Some(evaluation)
    } else {
        None
    };

    if let Some(raw) = &args.summary {
        let summary_path = sanitize_summary_path(raw);
        if summary_path != *raw {
            println!(
                "\nNormalizing summary path to {}",
                summary_path.display()
            );
        }
        if let Some(parent) = summary_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let summary = TrainingSummaryFile {
            problem: args.problem.display().to_string(),
            config: &config,
            training: &report,
            metrics,
            evaluation,
        };
        let file = File::create(&summary_path)
            .with_context(|| format!("Failed to create {}", summary_path.display()))?;
        to_writer_pretty(file, &summary)?;
        println!("\nSummary written to {}", summary_path.display());
    }

    Ok(())
}

fn print_policy(problem: &Problem, trainer: &EpisodeTrainer) -> Result<()> {
    print_section("Greedy Policy");
    let partition = problem.partition();
    let policy = trainer.policy();

    for stage in 0..problem.stages() {
        let decision_names: Vec<&str> = partition
            .decisions(stage)
            .iter()
            .map(|&var| problem.decisions()[var].name.as_str())
            .collect();
        let stochastic_names: Vec<&str> = partition
            .stochastics(stage)
            .iter()
            .map(|&var| problem.stochastics()[var].name.as_str())
            .collect();
        let scenarios = trainer.resolver().stochastic_projection(stage).restricted();

        print_subsection(&format!("Stage {stage}"));
        if scenarios.len() > MAX_POLICY_ROWS {
            println!(
                "  {} stochastic combinations, table omitted",
                format_number(scenarios.len())
            );
            continue;
        }
        for sm in scenarios.combos() {
            let choice = policy.stage_decision(stage, sm)?;
            println!(
                "  {:30} -> {} ({:.4})",
                format_assignment(&stochastic_names, sm),
                format_assignment(&decision_names, &choice.values),
                choice.value
            );
        }
    }
    Ok(())
}
