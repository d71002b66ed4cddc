//! Stage-restricted greedy decisions and continuation values
//!
//! At stage `m` only `L_D(m)` and `L_S(m)` are relevant. The resolver sums the
//! full Q-table over every other variable and reads the column of the
//! sampled stage stochastics `sm`:
//!
//! * `stage_argmax`: best combination of `L_D(m)` given `sm`
//! * `stage_max`: best value over `L_D(m + 1)` given `sm`, the bootstrap
//!   term of the update target; `0` at the last stage

use ndarray::Array2;

use crate::{
    Error, Result,
    combination::{CombinationIndex, StageProjection, space_size},
    q_learning::q_table::QTable,
    variables::StagePartition,
};

/// Largest Q-table, in entries, a trainer will allocate.
///
/// Two snapshots of this size are kept, 512 MiB each at the limit.
pub const MAX_TABLE_ENTRIES: usize = 1 << 26;

/// Greedy choice for one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDecision {
    /// Index into the stage-restricted decision combinations
    pub combo_index: usize,
    /// Values of `L_D(m)`, in partition order
    pub values: Vec<usize>,
    /// Stage-marginalized value of the choice
    pub value: f64,
}

/// Per-stage projections of the full decision and stochastic spaces.
///
/// Everything here is derived once from the fixed stage partition and reused
/// for every episode.
#[derive(Debug, Clone)]
pub struct StageResolver {
    decisions: CombinationIndex,
    stochastics: CombinationIndex,
    decision_projections: Vec<StageProjection>,
    stochastic_projections: Vec<StageProjection>,
}

impl StageResolver {
    pub fn new(
        decision_domains: &[usize],
        stochastic_domains: &[usize],
        partition: &StagePartition,
    ) -> Result<Self> {
        if decision_domains.len() != partition.decision_count()
            || stochastic_domains.len() != partition.stochastic_count()
        {
            return Err(Error::config(
                "domain lists do not match the stage partition",
            ));
        }

        check_table_size(decision_domains, stochastic_domains)?;

        let decisions = CombinationIndex::new(decision_domains);
        let stochastics = CombinationIndex::new(stochastic_domains);
        let decision_projections = (0..partition.stages())
            .map(|m| decisions.project(partition.decisions(m)))
            .collect::<Result<Vec<_>>>()?;
        let stochastic_projections = (0..partition.stages())
            .map(|m| stochastics.project(partition.stochastics(m)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            decisions,
            stochastics,
            decision_projections,
            stochastic_projections,
        })
    }

    pub fn stages(&self) -> usize {
        self.decision_projections.len()
    }

    /// Full decision space `D_combos`
    pub fn decision_index(&self) -> &CombinationIndex {
        &self.decisions
    }

    /// Full stochastic space `S_combos`
    pub fn stochastic_index(&self) -> &CombinationIndex {
        &self.stochastics
    }

    /// Restriction of `D_combos` to `L_D(m)`
    pub fn decision_projection(&self, stage: usize) -> &StageProjection {
        &self.decision_projections[stage]
    }

    /// Restriction of `S_combos` to `L_S(m)`
    pub fn stochastic_projection(&self, stage: usize) -> &StageProjection {
        &self.stochastic_projections[stage]
    }

    /// Q-table summed down to `L_D(decision_stage) × L_S(stochastic_stage)`.
    pub fn stage_matrix(
        &self,
        q0: &QTable,
        decision_stage: usize,
        stochastic_stage: usize,
    ) -> Result<Array2<f64>> {
        self.check_table(q0)?;
        let dm = q0.marginalize_decisions(self.projection_d(decision_stage)?);
        Ok(QTable::marginalize_stochastics(
            dm.view(),
            self.projection_s(stochastic_stage)?,
        ))
    }

    /// Greedy stage decision; ties go to the first combination in
    /// enumeration order.
    ///
    /// # Errors
    ///
    /// [`Error::CombinationNotFound`] if `sm` is not a combination of
    /// `L_S(m)`.
    pub fn stage_argmax(&self, q0: &QTable, stage: usize, sm: &[usize]) -> Result<StageDecision> {
        let column = self.stage_column(q0, stage, stage, sm)?;
        let (combo_index, value) = column.iter().copied().enumerate().fold(
            (0, f64::NEG_INFINITY),
            |(best, best_value), (i, v)| {
                if v > best_value { (i, v) } else { (best, best_value) }
            },
        );
        let values = self
            .projection_d(stage)?
            .restricted()
            .get(combo_index)
            .map(<[usize]>::to_vec)
            .unwrap_or_default();

        Ok(StageDecision {
            combo_index,
            values,
            value,
        })
    }

    /// Best continuation value for the next stage's decisions given this
    /// stage's sampled stochastics. `0` at the last stage.
    pub fn stage_max(&self, q0: &QTable, stage: usize, sm: &[usize]) -> Result<f64> {
        if stage + 1 >= self.stages() {
            return Ok(0.0);
        }
        let column = self.stage_column(q0, stage + 1, stage, sm)?;
        Ok(column.into_iter().fold(f64::NEG_INFINITY, f64::max))
    }

    fn stage_column(
        &self,
        q0: &QTable,
        decision_stage: usize,
        stochastic_stage: usize,
        sm: &[usize],
    ) -> Result<Vec<f64>> {
        let column = self
            .projection_s(stochastic_stage)?
            .restricted()
            .index_of(sm)?;
        let qm = self.stage_matrix(q0, decision_stage, stochastic_stage)?;
        Ok(qm.column(column).to_vec())
    }

    fn projection_d(&self, stage: usize) -> Result<&StageProjection> {
        self.decision_projections
            .get(stage)
            .ok_or(Error::IndexOutOfBounds {
                what: "stage",
                index: stage,
                len: self.decision_projections.len(),
            })
    }

    fn projection_s(&self, stage: usize) -> Result<&StageProjection> {
        self.stochastic_projections
            .get(stage)
            .ok_or(Error::IndexOutOfBounds {
                what: "stage",
                index: stage,
                len: self.stochastic_projections.len(),
            })
    }

    fn check_table(&self, q0: &QTable) -> Result<()> {
        let expected = (self.decisions.len(), self.stochastics.len());
        if q0.shape() != expected {
            return Err(Error::config(format!(
                "Q-table shape {:?} does not match combination spaces {expected:?}",
                q0.shape()
            )));
        }
        Ok(())
    }
}

fn check_table_size(decision_domains: &[usize], stochastic_domains: &[usize]) -> Result<()> {
    let entries = space_size(decision_domains)
        .zip(space_size(stochastic_domains))
        .and_then(|(rows, cols)| rows.checked_mul(cols));
    match entries {
        Some(entries) if entries <= MAX_TABLE_ENTRIES => Ok(()),
        Some(entries) => Err(Error::config(format!(
            "Q-table would hold {entries} entries, more than the limit of {MAX_TABLE_ENTRIES}"
        ))),
        None => Err(Error::config(
            "Q-table size overflows: too many decision and stochastic combinations",
        )),
    }
}
