//! Q-table over (decision combination × stochastic combination) pairs

use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, combination::StageProjection};

/// Initial contents of a fresh Q-table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QInit {
    Zeros,
    Constant { value: f64 },
    /// Independent uniform draws in `[low, high)`
    Uniform { low: f64, high: f64 },
}

impl Default for QInit {
    fn default() -> Self {
        QInit::Uniform {
            low: 0.0,
            high: 1.0,
        }
    }
}

impl QInit {
    pub fn validate(&self) -> Result<()> {
        match *self {
            QInit::Zeros => Ok(()),
            QInit::Constant { value } if value.is_finite() => Ok(()),
            QInit::Constant { value } => Err(Error::config(format!(
                "initial Q-value {value} must be finite"
            ))),
            // the span must be finite too, or the uniform draw cannot be built
            QInit::Uniform { low, high } if low < high && (high - low).is_finite() => Ok(()),
            QInit::Uniform { low, high } => Err(Error::config(format!(
                "uniform Q initialization needs finite low < high with a finite span, got [{low}, {high})"
            ))),
        }
    }
}

/// Dense Q-table: rows are full decision combinations, columns full
/// stochastic combinations.
///
/// A table is read-only while an episode runs. The episode's update goes into
/// a second table through [`QTable::blend_into`], and the two are swapped at
/// the episode boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct QTable {
    values: Array2<f64>,
}

impl QTable {
    /// Create a table of zeros
    pub fn zeros(decision_combos: usize, stochastic_combos: usize) -> Self {
        Self {
            values: Array2::zeros((decision_combos, stochastic_combos)),
        }
    }

    /// Create a table according to `init`, drawing from `rng` if needed.
    pub fn initialize<R: Rng + ?Sized>(
        decision_combos: usize,
        stochastic_combos: usize,
        init: &QInit,
        rng: &mut R,
    ) -> Self {
        let shape = (decision_combos, stochastic_combos);
        let values = match *init {
            QInit::Zeros => Array2::zeros(shape),
            QInit::Constant { value } => Array2::from_elem(shape, value),
            QInit::Uniform { low, high } => {
                Array2::from_shape_fn(shape, |_| rng.random_range(low..high))
            }
        };
        Self { values }
    }

    pub fn from_values(values: Array2<f64>) -> Self {
        Self { values }
    }

    /// `(|D_combos|, |S_combos|)`
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Get Q-value for a (decision combo, stochastic combo) pair
    ///
    /// # Panics
    ///
    /// Panics if either index is outside the table.
    pub fn get(&self, decision: usize, stochastic: usize) -> f64 {
        self.values[[decision, stochastic]]
    }

    /// Overwrite a single entry
    pub fn set(&mut self, decision: usize, stochastic: usize, value: f64) {
        self.values[[decision, stochastic]] = value;
    }

    /// Sum of every entry
    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    /// Write the next snapshot: `next` becomes a copy of `self` with entry
    /// `(decision, stochastic)` replaced by `(1 - alpha) * old + alpha * target`.
    ///
    /// Returns the value written.
    pub fn blend_into(
        &self,
        next: &mut QTable,
        decision: usize,
        stochastic: usize,
        target: f64,
        alpha: f64,
    ) -> Result<f64> {
        let (rows, cols) = self.shape();
        if decision >= rows {
            return Err(Error::IndexOutOfBounds {
                what: "decision combination",
                index: decision,
                len: rows,
            });
        }
        if stochastic >= cols {
            return Err(Error::IndexOutOfBounds {
                what: "stochastic combination",
                index: stochastic,
                len: cols,
            });
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::config(format!("learning rate {alpha} outside [0, 1]")));
        }

        if next.values.dim() == self.values.dim() {
            next.values.assign(&self.values);
        } else {
            next.values = self.values.clone();
        }

        let old = self.values[[decision, stochastic]];
        let blended = if alpha == 1.0 {
            target
        } else {
            (1.0 - alpha) * old + alpha * target
        };
        next.values[[decision, stochastic]] = blended;
        Ok(blended)
    }

    /// Sum out the inactive decision variables.
    ///
    /// Row `r` of the result is the sum of every full-table row consistent
    /// with restricted decision combination `r`; shape is
    /// `(|Dm_combos|, |S_combos|)`.
    pub fn marginalize_decisions(&self, projection: &StageProjection) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((projection.restricted().len(), self.values.ncols()));
        for (r, group) in projection.groups().iter().enumerate() {
            let mut row = out.row_mut(r);
            for &d in group {
                row += &self.values.row(d);
            }
        }
        out
    }

    /// Sum out the inactive stochastic variables of an already
    /// decision-marginalized matrix; shape is `(rows, |Sm_combos|)`.
    pub fn marginalize_stochastics(
        matrix: ArrayView2<'_, f64>,
        projection: &StageProjection,
    ) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((matrix.nrows(), projection.restricted().len()));
        for (c, group) in projection.groups().iter().enumerate() {
            let mut column = out.column_mut(c);
            for &s in group {
                column += &matrix.column(s);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::combination::CombinationIndex;

    fn sample_table() -> QTable {
        // decisions: 2 x 2 vars -> 4 rows; stochastics: 1 var of 3 -> 3 cols
        QTable::from_values(array![
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 9.0],
            [10.0, 11.0, 12.0],
        ])
    }

    #[test]
    fn test_qtable_initialization() {
        let table = QTable::zeros(3, 2);
        assert_eq!(table.shape(), (3, 2));
        assert_eq!(table.get(2, 1), 0.0);

        let mut rng = StdRng::seed_from_u64(3);
        let table = QTable::initialize(4, 4, &QInit::default(), &mut rng);
        assert!(table.values().iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn test_uniform_initialization_is_seeded() {
        let init = QInit::Uniform {
            low: -1.0,
            high: 1.0,
        };
        let a = QTable::initialize(5, 3, &init, &mut StdRng::seed_from_u64(11));
        let b = QTable::initialize(5, 3, &init, &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn test_blend_with_full_learning_rate_replaces_entry() {
        let table = sample_table();
        let mut next = QTable::zeros(4, 3);
        let written = table.blend_into(&mut next, 1, 2, 0.25, 1.0).unwrap();
        assert_eq!(written, 0.25);
        assert_eq!(next.get(1, 2), 0.25);
        assert_eq!(next.get(0, 0), 1.0);
        // read snapshot untouched
        assert_eq!(table.get(1, 2), 6.0);
    }

    #[test]
    fn test_blend_with_zero_learning_rate_keeps_entry() {
        let table = sample_table();
        let mut next = QTable::zeros(1, 1);
        table.blend_into(&mut next, 3, 0, 99.0, 0.0).unwrap();
        assert_eq!(next, table);
    }

    #[test]
    fn test_blend_interpolates() {
        let table = sample_table();
        let mut next = QTable::zeros(4, 3);
        table.blend_into(&mut next, 0, 0, 3.0, 0.5).unwrap();
        assert!((next.get(0, 0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_blend_rejects_out_of_range() {
        let table = sample_table();
        let mut next = QTable::zeros(4, 3);
        assert!(matches!(
            table.blend_into(&mut next, 4, 0, 1.0, 0.5),
            Err(Error::IndexOutOfBounds { .. })
        ));
        assert!(table.blend_into(&mut next, 0, 0, 1.0, 1.5).is_err());
    }

    #[test]
    fn test_marginalizing_every_variable_conserves_total() {
        let table = sample_table();
        let decisions = CombinationIndex::new(&[2, 2]);
        let stochastics = CombinationIndex::new(&[3]);

        let all = decisions.project(&[0, 1]).unwrap();
        let dm = table.marginalize_decisions(&all);
        assert_eq!(dm.sum(), table.total());
        assert_eq!(dm, table.values());

        let none = decisions.project(&[]).unwrap();
        let collapsed = table.marginalize_decisions(&none);
        assert_eq!(collapsed.dim(), (1, 3));
        assert_eq!(collapsed.sum(), table.total());

        let qm = QTable::marginalize_stochastics(
            collapsed.view(),
            &stochastics.project(&[]).unwrap(),
        );
        assert_eq!(qm, array![[78.0]]);
    }

    #[test]
    fn test_marginalize_sums_rather_than_averages() {
        let table = sample_table();
        let decisions = CombinationIndex::new(&[2, 2]);
        // keep the first decision variable: rows {0,1} and {2,3}
        let dm = table.marginalize_decisions(&decisions.project(&[0]).unwrap());
        assert_eq!(dm, array![[5.0, 7.0, 9.0], [17.0, 19.0, 21.0]]);

        // keep the second decision variable: rows {0,2} and {1,3}
        let dm = table.marginalize_decisions(&decisions.project(&[1]).unwrap());
        assert_eq!(dm, array![[8.0, 10.0, 12.0], [14.0, 16.0, 18.0]]);
    }
}
