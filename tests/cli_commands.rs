use std::io::BufRead;

use clap::Parser;
use stageq::cli::commands::{
    inspect::{self, InspectArgs},
    train::{self, TrainArgs},
};
use tempfile::tempdir;

mod common;

fn write_problem(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("problem.json");
    std::fs::write(&path, common::TWO_STAGE_JSON).unwrap();
    path
}

#[test]
fn train_writes_summary_and_observations() {
    let tmp = tempdir().unwrap();
    let problem = write_problem(tmp.path());
    let summary = tmp.path().join("summary.json");
    let observations = tmp.path().join("episodes.jsonl");

    let args = TrainArgs::parse_from([
        "stageq-train",
        problem.to_str().unwrap(),
        "--episodes",
        "25",
        "--summary",
        summary.to_str().unwrap(),
        "--observations",
        observations.to_str().unwrap(),
        "--no-progress",
        "--evaluate",
        "30",
    ]);
    train::execute(args).expect("training should succeed");

    let contents = std::fs::read_to_string(&summary).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(parsed["training"]["episodes"], 25);
    assert_eq!(parsed["training"]["stop_reason"], "budget");
    assert_eq!(parsed["config"]["seed"], 11);
    assert_eq!(parsed["metrics"]["episodes"], 25);
    assert_eq!(parsed["evaluation"]["scenarios"], 30);

    let file = std::fs::File::open(&observations).unwrap();
    let lines = std::io::BufReader::new(file).lines().count();
    assert_eq!(lines, 25);
}

#[test]
fn summary_without_extension_appends_json() {
    let tmp = tempdir().unwrap();
    let problem = write_problem(tmp.path());
    let summary_stem = tmp.path().join("run_overview");

    let args = TrainArgs::parse_from([
        "stageq-train",
        problem.to_str().unwrap(),
        "--summary",
        summary_stem.to_str().unwrap(),
        "--no-progress",
        "--evaluate",
        "0",
    ]);
    train::execute(args).expect("training with summary should succeed");

    let expected_path = summary_stem.with_extension("json");
    let contents = std::fs::read_to_string(&expected_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    // episode budget from the problem file
    assert_eq!(parsed["training"]["episodes"], 40);
    assert!(parsed["evaluation"].is_null());
}

#[test]
fn train_reports_missing_problem_file() {
    let tmp = tempdir().unwrap();
    let args = TrainArgs::parse_from([
        "stageq-train",
        tmp.path().join("absent.json").to_str().unwrap(),
        "--no-progress",
    ]);
    let err = train::execute(args).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to load problem file"));
}

#[test]
fn inspect_accepts_problem_file() {
    let tmp = tempdir().unwrap();
    let problem = write_problem(tmp.path());
    let args = InspectArgs::parse_from(["stageq-inspect", problem.to_str().unwrap()]);
    inspect::execute(args).expect("inspect should succeed");
}
