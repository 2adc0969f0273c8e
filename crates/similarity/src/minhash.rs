//! MinHash signatures.
//!
//! ## Algorithm
//! 1. Sample a [`HashFamily`] of `num_hash_functions` descriptors
//! 2. Start every signature slot at the sentinel `R + 1`
//! 3. For every member `x` and descriptor `i`, keep `min(slot_i, h_i(x))`
//!
//! The fraction of slots on which two signatures agree estimates the
//! Jaccard similarity of the underlying sets.
//!
//! ## Empty sets
//! An empty member set keeps every slot at the sentinel. Two such
//! signatures agree everywhere, which would read as similarity 1.0 for sets
//! whose Jaccard similarity is undefined, so comparing them is an
//! [`SimilarityError::InvalidInput`] instead.

use crate::config::MinHashConfig;
use crate::error::{Result, SimilarityError};
use crate::hashing::{HashFamily, run_rng};
use crate::types::{EntityId, MemberSet, MemberSets, PairwiseReport, ScoredPair, SimilarityTable};
use rayon::prelude::*;
use tracing::{debug, instrument};

/// Computes signatures with one fixed hash family
#[derive(Debug, Clone)]
pub struct MinHasher {
    family: HashFamily,
}

impl MinHasher {
    pub fn new(family: HashFamily) -> Self {
        Self { family }
    }

    /// Validate the configuration and sample a fresh family from the run's
    /// random source
    pub fn from_config(config: &MinHashConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = run_rng(config.seed);
        let family = HashFamily::sample(config.num_hash_functions, config.modulus, &mut rng)?;
        Ok(Self::new(family))
    }

    pub fn family(&self) -> &HashFamily {
        &self.family
    }

    pub fn num_hash_functions(&self) -> usize {
        self.family.len()
    }

    /// Signature of one member set
    pub fn signature(&self, members: &MemberSet) -> Vec<u64> {
        let modulus = self.family.modulus();
        let mut signature = vec![self.family.sentinel(); self.family.len()];

        for &member in members {
            for (slot, function) in signature.iter_mut().zip(self.family.functions()) {
                let hash = function.hash(member, modulus);
                if hash < *slot {
                    *slot = hash;
                }
            }
        }

        signature
    }

    /// Signatures of every entity, in entity order
    pub fn signature_matrix<E: EntityId>(&self, sets: &MemberSets<E>) -> SignatureMatrix<E> {
        let entries: Vec<(&E, &MemberSet)> = sets.iter().collect();
        let rows: Vec<Vec<u64>> = entries
            .par_iter()
            .map(|(_, members)| self.signature(members))
            .collect();

        let width = self.family.len();
        let mut values = Vec::with_capacity(rows.len() * width);
        for row in &rows {
            values.extend_from_slice(row);
        }

        debug!(
            "Built {} x {} signature matrix",
            entries.len(),
            width
        );

        SignatureMatrix {
            entities: entries.into_iter().map(|(entity, _)| entity.clone()).collect(),
            values,
            width,
            sentinel: self.family.sentinel(),
        }
    }
}

/// Signatures of all entities of a run, stored row-major.
///
/// Row `i` belongs to `entities()[i]`; rows follow entity order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatrix<E> {
    entities: Vec<E>,
    values: Vec<u64>,
    width: usize,
    sentinel: u64,
}

impl<E: EntityId> SignatureMatrix<E> {
    pub fn num_entities(&self) -> usize {
        self.entities.len()
    }

    /// Number of hash functions per signature
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn sentinel(&self) -> u64 {
        self.sentinel
    }

    pub fn entities(&self) -> &[E] {
        &self.entities
    }

    pub fn entity(&self, row: usize) -> &E {
        &self.entities[row]
    }

    /// Row index of an entity
    pub fn position(&self, entity: &E) -> Option<usize> {
        self.entities.binary_search(entity).ok()
    }

    pub fn signature(&self, row: usize) -> &[u64] {
        &self.values[row * self.width..(row + 1) * self.width]
    }

    /// The `rows_per_band` values of band `band` in row `row`, i.e. entry
    /// `[row, band, ..]` of the `(entities, bands, rows_per_band)` view
    pub fn band(&self, row: usize, band: usize, rows_per_band: usize) -> &[u64] {
        let start = band * rows_per_band;
        &self.signature(row)[start..start + rows_per_band]
    }

    /// Whole matrix, row-major
    pub fn as_slice(&self) -> &[u64] {
        &self.values
    }

    /// True when the row never saw a member (all slots still hold the sentinel)
    pub fn is_empty_set(&self, row: usize) -> bool {
        self.signature(row).iter().all(|&v| v == self.sentinel)
    }

    /// Estimated Jaccard similarity of two rows
    pub fn estimated_similarity(&self, i: usize, j: usize) -> Result<f64> {
        if self.is_empty_set(i) && self.is_empty_set(j) {
            return Err(SimilarityError::InvalidInput(format!(
                "signatures of {} and {} both come from empty sets",
                self.entities[i], self.entities[j]
            )));
        }
        signature_agreement(self.signature(i), self.signature(j))
    }
}

/// Fraction of positions on which two signatures agree
pub fn signature_agreement(a: &[u64], b: &[u64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(SimilarityError::InvalidInput(format!(
            "signature widths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    if a.is_empty() {
        return Err(SimilarityError::InvalidInput(
            "cannot compare zero-width signatures".to_string(),
        ));
    }

    let agreeing = a.iter().zip(b).filter(|(x, y)| x == y).count();
    Ok(agreeing as f64 / a.len() as f64)
}

/// Estimated similarity of every unordered entity pair.
///
/// Pair keys match those of [`crate::jaccard::jaccard_similarities`], so the
/// two reports can be compared key by key. Like there, pairs of two empty
/// sets are left out.
#[instrument(skip(sets, config), fields(entities = sets.len(), hash_functions = config.num_hash_functions))]
pub fn minhash_similarities<E: EntityId>(
    sets: &MemberSets<E>,
    config: &MinHashConfig,
) -> Result<PairwiseReport<E>> {
    let hasher = MinHasher::from_config(config)?;
    let matrix = hasher.signature_matrix(sets);
    let matrix = &matrix;

    let n = matrix.num_entities();
    let pairs = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            (i + 1..n).filter_map(move |j| {
                if matrix.is_empty_set(i) && matrix.is_empty_set(j) {
                    return None;
                }
                Some(matrix.estimated_similarity(i, j).map(|sim| {
                    ScoredPair::new(matrix.entity(i).clone(), matrix.entity(j).clone(), sim)
                }))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let empty = (0..n).filter(|&row| matrix.is_empty_set(row)).count();
    if empty > 1 {
        debug!("Skipped {} pairs of empty sets", empty * (empty - 1) / 2);
    }

    let all = SimilarityTable::from_pairs(pairs);
    let similar = all.above(config.similarity_threshold);
    debug!(
        "Estimated {} pairs, {} at or above {}",
        all.len(),
        similar.len(),
        config.similarity_threshold
    );

    Ok(PairwiseReport { all, similar })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashFunction;

    fn set(members: &[u64]) -> MemberSet {
        members.iter().copied().collect()
    }

    fn sample_sets() -> MemberSets<u32> {
        [
            (1, set(&[10, 20, 30])),
            (2, set(&[20, 30, 40])),
            (3, set(&[100, 200])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_signature_is_min_over_members() {
        let family = HashFamily::from_functions(
            vec![HashFunction { a: 1, b: 0 }, HashFunction { a: 2, b: 5 }],
            97,
        )
        .unwrap();
        let hasher = MinHasher::new(family);

        // h0: x mod 97 -> {10, 20, 30} ; h1: 2x+5 mod 97 -> {25, 45, 65}
        assert_eq!(hasher.signature(&set(&[10, 20, 30])), vec![10, 25]);
    }

    #[test]
    fn test_empty_set_keeps_sentinels() {
        let hasher = MinHasher::from_config(&MinHashConfig::new(4).with_modulus(97).with_seed(1)).unwrap();
        assert_eq!(hasher.signature(&MemberSet::new()), vec![98; 4]);
    }

    #[test]
    fn test_matrix_shape_and_order() {
        let hasher = MinHasher::from_config(&MinHashConfig::new(12).with_seed(3)).unwrap();
        let matrix = hasher.signature_matrix(&sample_sets());

        assert_eq!(matrix.num_entities(), 3);
        assert_eq!(matrix.width(), 12);
        assert_eq!(matrix.as_slice().len(), 36);
        assert_eq!(matrix.entities(), &[1, 2, 3]);
        assert_eq!(matrix.position(&3), Some(2));
        assert_eq!(matrix.position(&4), None);
        assert_eq!(matrix.band(1, 2, 4), &matrix.signature(1)[8..12]);
    }

    #[test]
    fn test_seeded_matrix_is_reproducible() {
        let config = MinHashConfig::new(20).with_modulus(97).with_seed(42);
        let first = MinHasher::from_config(&config).unwrap().signature_matrix(&sample_sets());
        let second = MinHasher::from_config(&config).unwrap().signature_matrix(&sample_sets());
        assert_eq!(first, second);
    }

    #[test]
    fn test_identical_sets_agree_everywhere() {
        let sets: MemberSets<u32> = [(1, set(&[1, 2, 3])), (2, set(&[1, 2, 3]))]
            .into_iter()
            .collect();
        let matrix = MinHasher::from_config(&MinHashConfig::new(16).with_seed(9))
            .unwrap()
            .signature_matrix(&sets);
        assert_eq!(matrix.estimated_similarity(0, 1).unwrap(), 1.0);
    }

    #[test]
    fn test_two_empty_signatures_are_invalid() {
        let sets: MemberSets<u32> = [(1, MemberSet::new()), (2, MemberSet::new()), (3, set(&[4]))]
            .into_iter()
            .collect();
        let matrix = MinHasher::from_config(&MinHashConfig::new(8).with_seed(5))
            .unwrap()
            .signature_matrix(&sets);

        assert!(matrix.is_empty_set(0));
        assert!(matches!(
            matrix.estimated_similarity(0, 1),
            Err(SimilarityError::InvalidInput(_))
        ));
        assert_eq!(matrix.estimated_similarity(0, 2).unwrap(), 0.0);
    }

    #[test]
    fn test_report_skips_pairs_of_empty_sets() {
        let sets: MemberSets<u32> = [
            (1, MemberSet::new()),
            (2, MemberSet::new()),
            (3, set(&[4, 5])),
        ]
        .into_iter()
        .collect();

        let report = minhash_similarities(&sets, &MinHashConfig::new(16).with_seed(2)).unwrap();

        let keys: Vec<String> = report.all.keys().map(|k| k.to_string()).collect();
        assert_eq!(report.all.len(), 2);
        assert!(!keys.contains(&"1_2".to_string()));
        assert_eq!(report.all.score(&1, &3), Some(0.0));
        assert_eq!(report.all.score(&2, &3), Some(0.0));
    }

    #[test]
    fn test_signature_agreement_width_mismatch() {
        assert!(signature_agreement(&[1, 2], &[1]).is_err());
        assert_eq!(signature_agreement(&[1, 2, 3, 4], &[1, 0, 3, 0]).unwrap(), 0.5);
    }

    #[test]
    fn test_minhash_report_keys_match_pairs() {
        let config = MinHashConfig::new(64).with_seed(11);
        let report = minhash_similarities(&sample_sets(), &config).unwrap();

        assert_eq!(report.all.len(), 3);
        let sim = report.all.score(&1, &2).unwrap();
        assert!((0.0..=1.0).contains(&sim));
        assert!(report.similar.iter().all(|p| p.similarity >= 0.5));
    }
}
