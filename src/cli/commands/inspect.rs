//! Inspect command - Show the stage structure of a problem file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    cli::output::{format_number, print_kv, print_section, print_subsection},
    config::ProblemFile,
    q_learning::StageResolver,
};

#[derive(Parser, Debug)]
#[command(about = "Show per-stage variables and combination-space sizes")]
pub struct InspectArgs {
    /// Problem description (JSON)
    pub problem: PathBuf,
}

/// Execute the inspect command
pub fn execute(args: InspectArgs) -> Result<()> {
    let file = ProblemFile::load(&args.problem)
        .with_context(|| format!("Failed to load problem file {}", args.problem.display()))?;
    let (problem, config) = file.compile().context("Invalid problem definition")?;
    let resolver = StageResolver::new(
        &problem.decision_domains(),
        &problem.stochastic_domains(),
        problem.partition(),
    )?;
    let evaluator = problem.reward_evaluator(config.reward_mode)?;

    print_section(&format!("Problem {}", args.problem.display()));
    print_kv("Stages", &problem.stages().to_string());
    print_kv("Decision vars", &problem.decisions().len().to_string());
    print_kv("Stochastic vars", &problem.stochastics().len().to_string());
    print_kv("Constraints", &problem.constraints().len().to_string());
    print_kv(
        "Q-table",
        &format!(
            "{} x {} entries",
            format_number(resolver.decision_index().len()),
            format_number(resolver.stochastic_index().len())
        ),
    );
    print_kv("Reward mode", &format!("{:?}", config.reward_mode));

    let partition = problem.partition();
    for stage in 0..problem.stages() {
        print_subsection(&format!("Stage {stage}"));
        let decisions: Vec<String> = partition
            .decisions(stage)
            .iter()
            .map(|&var| {
                let v = &problem.decisions()[var];
                format!("{} ({})", v.name, v.size)
            })
            .collect();
        let stochastics: Vec<String> = partition
            .stochastics(stage)
            .iter()
            .map(|&var| {
                let v = &problem.stochastics()[var];
                format!("{} ({}, {:?})", v.name, v.size, v.distribution)
            })
            .collect();
        let new_constraints: Vec<&str> = evaluator
            .stage_constraints(stage)
            .map(|c| c.name())
            .filter(|name| {
                stage == 0
                    || !evaluator
                        .stage_constraints(stage - 1)
                        .any(|earlier| earlier.name() == *name)
            })
            .collect();

        print_kv("Decisions", &decisions.join(", "));
        print_kv("Stochastics", &stochastics.join(", "));
        print_kv(
            "Decision combos",
            &format_number(resolver.decision_projection(stage).restricted().len()),
        );
        print_kv(
            "Stochastic combos",
            &format_number(resolver.stochastic_projection(stage).restricted().len()),
        );
        print_kv("Constraints added", &new_constraints.join(", "));
    }

    Ok(())
}
