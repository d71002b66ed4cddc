//! JSON problem files
//!
//! A problem file declares the variables, the constraints and objective as
//! plain data, and optionally the trainer settings. Variables are referenced
//! by name everywhere; names are resolved once when the file is compiled.
//!
//! ```json
//! {
//!   "decisions": [{ "name": "x", "size": 2, "stage": 0 }],
//!   "stochastics": [{ "name": "s", "size": 2, "stage": 0 }],
//!   "constraints": [{ "kind": "not_equal", "name": "x_ne_s", "a": "x", "b": "s" }],
//!   "objective": { "kind": "constant", "value": 1.0 },
//!   "trainer": { "episodes": 200, "seed": 42 }
//! }
//! ```

use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    problem::Problem,
    q_learning::TrainerConfig,
    reward::{Constraint, Objective},
    variables::{DecisionVariable, StochasticVariable, VarRef},
};

/// One `coefficient · variable` term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub variable: String,
    pub coefficient: f64,
}

/// A constraint written as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintSpec {
    NotEqual {
        name: String,
        a: String,
        b: String,
    },
    Equal {
        name: String,
        a: String,
        b: String,
    },
    AllDifferent {
        name: String,
        variables: Vec<String>,
    },
    /// Rules out the single joint value `values` of `variables`
    Forbid {
        name: String,
        variables: Vec<String>,
        values: Vec<usize>,
    },
    LinearLe {
        name: String,
        terms: Vec<Term>,
        bound: f64,
    },
}

impl ConstraintSpec {
    pub fn name(&self) -> &str {
        match self {
            ConstraintSpec::NotEqual { name, .. }
            | ConstraintSpec::Equal { name, .. }
            | ConstraintSpec::AllDifferent { name, .. }
            | ConstraintSpec::Forbid { name, .. }
            | ConstraintSpec::LinearLe { name, .. } => name,
        }
    }
}

/// An objective written as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectiveSpec {
    Constant {
        value: f64,
    },
    /// `offset + Σ coefficient · value`
    Linear {
        terms: Vec<Term>,
        #[serde(default)]
        offset: f64,
    },
    /// `reward` when every pair of variables takes the same value, else `0`
    Match {
        pairs: Vec<(String, String)>,
        #[serde(default = "default_match_reward")]
        reward: f64,
    },
}

fn default_match_reward() -> f64 {
    1.0
}

impl Default for ObjectiveSpec {
    fn default() -> Self {
        ObjectiveSpec::Constant { value: 1.0 }
    }
}

/// Serialized form of a [`Problem`] plus its trainer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemFile {
    /// Stage count; inferred from the variables when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<usize>,
    pub decisions: Vec<DecisionVariable>,
    #[serde(default)]
    pub stochastics: Vec<StochasticVariable>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
    #[serde(default)]
    pub objective: ObjectiveSpec,
    #[serde(default)]
    pub trainer: TrainerConfig,
}

impl ProblemFile {
    /// Read a problem file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Io {
            operation: format!("open problem file {}", path.display()),
            source,
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| Error::Io {
            operation: format!("create problem file {}", path.display()),
            source,
        })?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Resolve names and build the validated problem.
    pub fn to_problem(&self) -> Result<Problem> {
        let names = Names {
            decisions: &self.decisions,
            stochastics: &self.stochastics,
        };

        let mut builder = Problem::builder();
        if let Some(stages) = self.stages {
            builder = builder.stages(stages);
        }
        for var in &self.decisions {
            builder = builder.decision(var.name.clone(), var.size, var.stage);
        }
        for var in &self.stochastics {
            builder = builder.stochastic_with(
                var.name.clone(),
                var.size,
                var.stage,
                var.distribution.clone(),
            );
        }
        for spec in &self.constraints {
            builder = builder.constraint(names.constraint(spec)?);
        }
        builder.objective(names.objective(&self.objective)?).build()
    }

    /// Compile into a problem and the trainer settings to run it with.
    pub fn compile(self) -> Result<(Problem, TrainerConfig)> {
        let problem = self.to_problem()?;
        Ok((problem, self.trainer))
    }
}

struct Names<'a> {
    decisions: &'a [DecisionVariable],
    stochastics: &'a [StochasticVariable],
}

impl Names<'_> {
    fn resolve(&self, name: &str, context: &str) -> Result<VarRef> {
        self.decisions
            .iter()
            .position(|v| v.name == name)
            .map(VarRef::Decision)
            .or_else(|| {
                self.stochastics
                    .iter()
                    .position(|v| v.name == name)
                    .map(VarRef::Stochastic)
            })
            .ok_or_else(|| Error::UnknownVariable {
                name: name.to_string(),
                context: context.to_string(),
            })
    }

    fn resolve_all(&self, names: &[String], context: &str) -> Result<Vec<VarRef>> {
        names.iter().map(|name| self.resolve(name, context)).collect()
    }

    fn terms(&self, terms: &[Term], context: &str) -> Result<Vec<(VarRef, f64)>> {
        terms
            .iter()
            .map(|t| Ok((self.resolve(&t.variable, context)?, t.coefficient)))
            .collect()
    }

    fn constraint(&self, spec: &ConstraintSpec) -> Result<Constraint> {
        let context = format!("constraint '{}'", spec.name());
        Ok(match spec {
            ConstraintSpec::NotEqual { name, a, b } => Constraint::not_equal(
                name.clone(),
                self.resolve(a, &context)?,
                self.resolve(b, &context)?,
            ),
            ConstraintSpec::Equal { name, a, b } => Constraint::equal(
                name.clone(),
                self.resolve(a, &context)?,
                self.resolve(b, &context)?,
            ),
            ConstraintSpec::AllDifferent { name, variables } => {
                Constraint::all_different(name.clone(), self.resolve_all(variables, &context)?)
            }
            ConstraintSpec::Forbid {
                name,
                variables,
                values,
            } => {
                if variables.len() != values.len() {
                    return Err(Error::config(format!(
                        "{context} lists {} variables but {} values",
                        variables.len(),
                        values.len()
                    )));
                }
                Constraint::forbid(
                    name.clone(),
                    self.resolve_all(variables, &context)?,
                    values.clone(),
                )
            }
            ConstraintSpec::LinearLe { name, terms, bound } => {
                Constraint::linear_le(name.clone(), self.terms(terms, &context)?, *bound)
            }
        })
    }

    fn objective(&self, spec: &ObjectiveSpec) -> Result<FileObjective> {
        let context = "objective";
        Ok(match spec {
            ObjectiveSpec::Constant { value } => FileObjective::Constant(*value),
            ObjectiveSpec::Linear { terms, offset } => FileObjective::Linear {
                terms: self.terms(terms, context)?,
                offset: *offset,
            },
            ObjectiveSpec::Match { pairs, reward } => FileObjective::Match {
                pairs: pairs
                    .iter()
                    .map(|(a, b)| Ok((self.resolve(a, context)?, self.resolve(b, context)?)))
                    .collect::<Result<_>>()?,
                reward: *reward,
            },
        })
    }
}

#[derive(Debug)]
enum FileObjective {
    Constant(f64),
    Linear {
        terms: Vec<(VarRef, f64)>,
        offset: f64,
    },
    Match {
        pairs: Vec<(VarRef, VarRef)>,
        reward: f64,
    },
}

fn value_of(var: VarRef, decisions: &[usize], stochastics: &[usize]) -> usize {
    match var {
        VarRef::Decision(i) => decisions[i],
        VarRef::Stochastic(i) => stochastics[i],
    }
}

impl Objective for FileObjective {
    fn evaluate(&self, decisions: &[usize], stochastics: &[usize]) -> f64 {
        match self {
            FileObjective::Constant(value) => *value,
            FileObjective::Linear { terms, offset } => {
                offset
                    + terms
                        .iter()
                        .map(|&(var, c)| c * value_of(var, decisions, stochastics) as f64)
                        .sum::<f64>()
            }
            FileObjective::Match { pairs, reward } => {
                let matched = pairs.iter().all(|&(a, b)| {
                    value_of(a, decisions, stochastics) == value_of(b, decisions, stochastics)
                });
                if matched { *reward } else { 0.0 }
            }
        }
    }
}
