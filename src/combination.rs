//! Enumeration and indexing of joint value combinations.
//!
//! A combination assigns one value index to every variable of an ordered
//! variable list. Combinations are enumerated lexicographically: the first
//! variable is the most significant digit, values increase within a digit.
//! The position of a combination in that order is its only identity inside
//! the Q-table, so the ordering here is a contract for the rest of the crate.

use crate::{Error, Result};

/// One value index per variable of the indexed list.
pub type Combination = Vec<usize>;

/// Number of combinations of the given domain sizes, `None` on overflow.
pub fn space_size(domains: &[usize]) -> Option<usize> {
    domains.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Every combination of the given domain sizes, in lexicographic order.
///
/// An empty domain list yields exactly one (empty) combination; any
/// zero-sized domain yields none.
pub fn enumerate(domains: &[usize]) -> Vec<Combination> {
    let total: usize = domains.iter().product();
    let mut combos = Vec::with_capacity(total);
    if total == 0 {
        return combos;
    }

    let mut current = vec![0; domains.len()];
    for _ in 0..total {
        combos.push(current.clone());
        // odometer increment, last variable fastest
        for pos in (0..domains.len()).rev() {
            current[pos] += 1;
            if current[pos] < domains[pos] {
                break;
            }
            current[pos] = 0;
        }
    }
    combos
}

/// Enumerated combination space with constant-time index lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinationIndex {
    domains: Vec<usize>,
    strides: Vec<usize>,
    combos: Vec<Combination>,
}

impl CombinationIndex {
    pub fn new(domains: &[usize]) -> Self {
        let mut strides = vec![1; domains.len()];
        for pos in (0..domains.len().saturating_sub(1)).rev() {
            strides[pos] = strides[pos + 1] * domains[pos + 1];
        }
        Self {
            domains: domains.to_vec(),
            strides,
            combos: enumerate(domains),
        }
    }

    /// Number of combinations
    pub fn len(&self) -> usize {
        self.combos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }

    /// Domain size of each indexed variable
    pub fn domains(&self) -> &[usize] {
        &self.domains
    }

    pub fn combos(&self) -> &[Combination] {
        &self.combos
    }

    pub fn get(&self, index: usize) -> Option<&[usize]> {
        self.combos.get(index).map(Vec::as_slice)
    }

    /// Position of `combo` in the enumeration order.
    ///
    /// # Errors
    ///
    /// [`Error::CombinationNotFound`] when the arity differs or a value lies
    /// outside its domain. With a fixed partition this means a sampler or
    /// caller bug.
    pub fn index_of(&self, combo: &[usize]) -> Result<usize> {
        if combo.len() != self.domains.len()
            || combo.iter().zip(&self.domains).any(|(v, d)| v >= d)
        {
            return Err(Error::CombinationNotFound {
                combo: combo.to_vec(),
            });
        }
        Ok(combo.iter().zip(&self.strides).map(|(v, s)| v * s).sum())
    }

    /// Every index whose combination agrees with `partial` on `subset`.
    ///
    /// `subset` lists variable positions of this index and `partial` gives one
    /// value per listed position. The result is in increasing order and has
    /// `∏ v(x)` entries over the variables outside `subset`.
    pub fn matching_indices(&self, subset: &[usize], partial: &[usize]) -> Result<Vec<usize>> {
        self.check_subset(subset)?;
        if partial.len() != subset.len() {
            return Err(Error::InvalidSubset {
                subset: subset.to_vec(),
                arity: self.domains.len(),
            });
        }
        if partial
            .iter()
            .zip(subset)
            .any(|(v, &pos)| *v >= self.domains[pos])
        {
            return Err(Error::CombinationNotFound {
                combo: partial.to_vec(),
            });
        }

        let base: usize = partial
            .iter()
            .zip(subset)
            .map(|(v, &pos)| v * self.strides[pos])
            .sum();
        let free: Vec<usize> = (0..self.domains.len())
            .filter(|pos| !subset.contains(pos))
            .collect();
        let free_domains: Vec<usize> = free.iter().map(|&pos| self.domains[pos]).collect();

        Ok(enumerate(&free_domains)
            .into_iter()
            .map(|rest| {
                base + rest
                    .iter()
                    .zip(&free)
                    .map(|(v, &pos)| v * self.strides[pos])
                    .sum::<usize>()
            })
            .collect())
    }

    /// Precompute the restriction of this space to `subset`.
    pub fn project(&self, subset: &[usize]) -> Result<StageProjection> {
        self.check_subset(subset)?;
        let restricted_domains: Vec<usize> =
            subset.iter().map(|&pos| self.domains[pos]).collect();
        let restricted = CombinationIndex::new(&restricted_domains);

        let groups = restricted
            .combos()
            .iter()
            .map(|partial| self.matching_indices(subset, partial))
            .collect::<Result<Vec<_>>>()?;

        let owner = self
            .combos
            .iter()
            .map(|combo| {
                subset
                    .iter()
                    .zip(&restricted.strides)
                    .map(|(&pos, stride)| combo[pos] * stride)
                    .sum::<usize>()
            })
            .collect();

        Ok(StageProjection {
            subset: subset.to_vec(),
            restricted,
            groups,
            owner,
        })
    }

    fn check_subset(&self, subset: &[usize]) -> Result<()> {
        let arity = self.domains.len();
        let out_of_range = subset.iter().any(|&pos| pos >= arity);
        let repeated = subset
            .iter()
            .enumerate()
            .any(|(i, pos)| subset[..i].contains(pos));
        if out_of_range || repeated {
            return Err(Error::InvalidSubset {
                subset: subset.to_vec(),
                arity,
            });
        }
        Ok(())
    }
}

/// Restriction of a full combination space to a subset of its variables.
///
/// Holds the restricted index (`Dm_combos` / `Sm_combos`) and, for every
/// restricted combination, the group of full indices consistent with it.
/// Built once per stage because the partition never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProjection {
    subset: Vec<usize>,
    restricted: CombinationIndex,
    groups: Vec<Vec<usize>>,
    owner: Vec<usize>,
}

impl StageProjection {
    /// Variable positions kept by the projection
    pub fn subset(&self) -> &[usize] {
        &self.subset
    }

    /// The stage-restricted combination space
    pub fn restricted(&self) -> &CombinationIndex {
        &self.restricted
    }

    /// Full indices consistent with restricted combination `restricted_index`
    pub fn group(&self, restricted_index: usize) -> &[usize] {
        &self.groups[restricted_index]
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// Restricted index that full index `full_index` projects onto
    pub fn owner(&self, full_index: usize) -> usize {
        self.owner[full_index]
    }

    pub fn full_len(&self) -> usize {
        self.owner.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_enumerate_is_lexicographic() {
        let combos = enumerate(&[2, 3]);
        assert_eq!(
            combos,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 1],
                vec![1, 2],
            ]
        );
    }

    #[test]
    fn test_enumerate_counts_and_uniqueness() {
        for domains in [vec![2, 3, 4], vec![1, 5], vec![3], vec![2, 2, 2, 2]] {
            let combos = enumerate(&domains);
            assert_eq!(combos.len(), domains.iter().product::<usize>());
            let unique: HashSet<_> = combos.iter().collect();
            assert_eq!(unique.len(), combos.len());
            assert_eq!(combos, enumerate(&domains));
        }
    }

    #[test]
    fn test_enumerate_edge_cases() {
        assert_eq!(enumerate(&[]), vec![Vec::<usize>::new()]);
        assert!(enumerate(&[3, 0]).is_empty());
    }

    #[test]
    fn test_space_size_detects_overflow() {
        assert_eq!(space_size(&[]), Some(1));
        assert_eq!(space_size(&[2, 3, 4]), Some(24));
        assert_eq!(space_size(&[usize::MAX, 2]), None);
        assert_eq!(space_size(&[1 << 33, 1 << 33, 1 << 33]), None);
    }

    #[test]
    fn test_index_of_matches_enumeration_position() {
        let index = CombinationIndex::new(&[3, 2, 4]);
        for (i, combo) in index.combos().iter().enumerate() {
            assert_eq!(index.index_of(combo).unwrap(), i);
        }
        assert!(matches!(
            index.index_of(&[3, 0, 0]),
            Err(Error::CombinationNotFound { .. })
        ));
        assert!(index.index_of(&[0, 0]).is_err());
    }

    #[test]
    fn test_matching_indices_size_and_agreement() {
        let index = CombinationIndex::new(&[3, 2, 4]);
        let matches = index.matching_indices(&[2, 0], &[1, 2]).unwrap();
        assert_eq!(matches.len(), 2);
        for i in &matches {
            let combo = index.get(*i).unwrap();
            assert_eq!(combo[2], 1);
            assert_eq!(combo[0], 2);
        }
        assert!(matches.windows(2).all(|w| w[0] < w[1]));

        let all = index.matching_indices(&[], &[]).unwrap();
        assert_eq!(all, (0..24).collect::<Vec<_>>());
    }

    #[test]
    fn test_matching_indices_rejects_invalid_subset() {
        let index = CombinationIndex::new(&[2, 2]);
        assert!(matches!(
            index.matching_indices(&[2], &[0]),
            Err(Error::InvalidSubset { .. })
        ));
        assert!(matches!(
            index.matching_indices(&[0, 0], &[0, 0]),
            Err(Error::InvalidSubset { .. })
        ));
        assert!(index.matching_indices(&[0], &[0, 1]).is_err());
    }

    #[test]
    fn test_projection_groups_partition_full_space() {
        let index = CombinationIndex::new(&[2, 3, 2]);
        let projection = index.project(&[1]).unwrap();
        assert_eq!(projection.restricted().len(), 3);

        let mut seen = vec![false; index.len()];
        for (r, group) in projection.groups().iter().enumerate() {
            assert_eq!(group.len(), 4);
            for &full in group {
                assert!(!seen[full]);
                seen[full] = true;
                assert_eq!(projection.owner(full), r);
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn test_empty_projection_has_single_group() {
        let index = CombinationIndex::new(&[2, 2]);
        let projection = index.project(&[]).unwrap();
        assert_eq!(projection.restricted().len(), 1);
        assert_eq!(projection.group(0), &[0, 1, 2, 3]);
    }
}
