//! Banded Locality-Sensitive Hashing over MinHash signatures.
//!
//! Each signature of width `num_bands * rows_per_band` is cut into
//! `num_bands` bands. Per band, entities whose band tuples are identical
//! land in the same bucket, and sharing any bucket makes two entities
//! candidates. Candidates are then re-scored with the exact Jaccard
//! similarity of their raw member sets.
//!
//! ## Complexity
//! [`LshIndex::find_similar_pairs`] walks every indexed pair and checks the
//! bands of each, so the scan itself is quadratic in the number of indexed
//! entities; what the banding saves is the exact set comparisons. With
//! large buckets (few rows per band) nearly every pair becomes a candidate
//! and the cost approaches the brute-force baseline.

use crate::config::{LshConfig, validate_threshold};
use crate::error::{Result, SimilarityError};
use crate::jaccard::jaccard;
use crate::minhash::{MinHasher, SignatureMatrix};
use crate::types::{EntityId, MemberSet, MemberSets, ScoredPair, SimilarityTable};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, instrument};

/// Bucket table of one band: band tuple -> row indices
type BandTable = HashMap<Vec<u64>, Vec<usize>>;

/// Result of a banded similarity search
#[derive(Debug, Clone)]
pub struct LshOutcome<E> {
    /// Pairs whose exact similarity cleared the threshold, ranked
    pub similar: SimilarityTable<E>,
    /// Exact re-scorings that cleared the threshold
    pub true_pairs: usize,
    /// Exact re-scorings triggered by shared buckets
    pub similarity_evaluations: usize,
    /// Entities that made it into the index
    pub indexed_entities: usize,
}

/// Read-only banded index built once per run.
pub struct LshIndex<E> {
    matrix: SignatureMatrix<E>,
    num_bands: usize,
    rows_per_band: usize,
    tables: Vec<BandTable>,
    indexed: Vec<bool>,
}

impl<E: EntityId> LshIndex<E> {
    /// Band the signature matrix and fill the bucket tables.
    ///
    /// Entities with fewer than `min_members` members, and entities with no
    /// members at all, are left out of the index.
    pub fn build(
        matrix: SignatureMatrix<E>,
        sets: &MemberSets<E>,
        num_bands: usize,
        rows_per_band: usize,
        min_members: usize,
    ) -> Result<Self> {
        if num_bands == 0 || rows_per_band == 0 {
            return Err(SimilarityError::config(
                "num_bands",
                "num_bands and rows_per_band must both be at least 1",
            ));
        }
        let expected = num_bands.checked_mul(rows_per_band);
        if expected != Some(matrix.width()) {
            return Err(SimilarityError::config(
                "num_bands",
                format!(
                    "{} bands x {} rows does not cover {} hash functions",
                    num_bands,
                    rows_per_band,
                    matrix.width()
                ),
            ));
        }

        let indexed: Vec<bool> = matrix
            .entities()
            .iter()
            .map(|entity| {
                let members = sets.get(entity).map_or(0, MemberSet::len);
                members > 0 && members >= min_members
            })
            .collect();

        let mut tables: Vec<BandTable> = (0..num_bands).map(|_| HashMap::new()).collect();
        for row in (0..matrix.num_entities()).filter(|&row| indexed[row]) {
            for (band, table) in tables.iter_mut().enumerate() {
                table
                    .entry(matrix.band(row, band, rows_per_band).to_vec())
                    .or_default()
                    .push(row);
            }
        }

        let index = Self {
            matrix,
            num_bands,
            rows_per_band,
            tables,
            indexed,
        };
        debug!(
            "Indexed {} of {} entities into {} bands ({} collision buckets)",
            index.num_indexed(),
            index.matrix.num_entities(),
            num_bands,
            index.num_collision_buckets()
        );
        Ok(index)
    }

    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    pub fn rows_per_band(&self) -> usize {
        self.rows_per_band
    }

    pub fn matrix(&self) -> &SignatureMatrix<E> {
        &self.matrix
    }

    pub fn num_indexed(&self) -> usize {
        self.indexed.iter().filter(|&&is_indexed| is_indexed).count()
    }

    pub fn is_indexed(&self, entity: &E) -> bool {
        self.matrix
            .position(entity)
            .is_some_and(|row| self.indexed[row])
    }

    /// Buckets holding more than one entity, across all bands
    pub fn num_collision_buckets(&self) -> usize {
        self.tables
            .iter()
            .flat_map(|table| table.values())
            .filter(|bucket| bucket.len() > 1)
            .count()
    }

    /// Rows sharing band `band`'s bucket with `key`
    pub fn bucket(&self, band: usize, key: &[u64]) -> &[usize] {
        self.tables
            .get(band)
            .and_then(|table| table.get(key))
            .map(|rows| rows.as_slice())
            .unwrap_or(&[])
    }

    /// First band in which two rows share a bucket
    pub fn shared_band(&self, i: usize, j: usize) -> Option<usize> {
        (0..self.num_bands).find(|&band| self.same_bucket(i, j, band))
    }

    fn same_bucket(&self, i: usize, j: usize, band: usize) -> bool {
        self.matrix.band(i, band, self.rows_per_band) == self.matrix.band(j, band, self.rows_per_band)
    }

    fn indexed_row(&self, entity: &E) -> Result<usize> {
        self.matrix
            .position(entity)
            .filter(|&row| self.indexed[row])
            .ok_or_else(|| SimilarityError::not_found("Entity", entity))
    }

    /// Every distinct candidate pair `(i, j)`, `i < j`, in ascending order
    pub fn candidate_pairs(&self) -> Vec<(usize, usize)> {
        let mut seen = HashSet::new();
        for bucket in self.tables.iter().flat_map(|table| table.values()) {
            for (pos, &i) in bucket.iter().enumerate() {
                for &j in &bucket[pos + 1..] {
                    seen.insert((i.min(j), i.max(j)));
                }
            }
        }

        let mut pairs: Vec<(usize, usize)> = seen.into_iter().collect();
        pairs.sort_unstable();
        pairs
    }

    /// Entities sharing at least one bucket with `entity`, in entity order.
    ///
    /// An entity that was never indexed is a [`SimilarityError::NotFound`],
    /// which keeps "no candidates" distinguishable from a bad query.
    pub fn candidates_of(&self, entity: &E) -> Result<Vec<E>> {
        let row = self.indexed_row(entity)?;
        let rows: BTreeSet<usize> = (0..self.num_bands)
            .flat_map(|band| self.bucket(band, self.matrix.band(row, band, self.rows_per_band)))
            .copied()
            .filter(|&other| other != row)
            .collect();

        Ok(rows
            .into_iter()
            .map(|other| self.matrix.entity(other).clone())
            .collect())
    }

    /// Candidates of `entity` whose exact similarity reaches `threshold`,
    /// best first
    pub fn neighbors(
        &self,
        entity: &E,
        sets: &MemberSets<E>,
        threshold: f64,
    ) -> Result<Vec<(E, f64)>> {
        validate_threshold(threshold)?;
        let members = members_of(sets, entity)?;

        let mut neighbors = Vec::new();
        for candidate in self.candidates_of(entity)? {
            let similarity = jaccard(members, members_of(sets, &candidate)?)?;
            if similarity >= threshold {
                neighbors.push((candidate, similarity));
            }
        }

        neighbors.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(neighbors)
    }

    /// Confirm candidate pairs against the exact similarity.
    ///
    /// For every indexed pair, bands are checked in order. Each shared band
    /// triggers an exact re-scoring (`similarity_evaluations`); the first
    /// one reaching `threshold` records the pair (`true_pairs`) and ends the
    /// scan for that pair. A pair that shares buckets but falls short is
    /// re-scored once per shared band.
    ///
    /// The outer loop runs on rayon over the read-only tables; the outcome
    /// is the same as a sequential scan.
    #[instrument(skip(self, sets), fields(indexed = self.num_indexed()))]
    pub fn find_similar_pairs(&self, sets: &MemberSets<E>, threshold: f64) -> Result<LshOutcome<E>> {
        validate_threshold(threshold)?;

        let rows: Vec<usize> = (0..self.matrix.num_entities())
            .filter(|&row| self.indexed[row])
            .collect();
        let members: Vec<&MemberSet> = rows
            .iter()
            .map(|&row| members_of(sets, self.matrix.entity(row)))
            .collect::<Result<_>>()?;

        let scans = (0..rows.len())
            .into_par_iter()
            .map(|a| self.scan_row(a, &rows, &members, threshold))
            .collect::<Result<Vec<RowScan<E>>>>()?;

        let mut pairs = Vec::new();
        let mut true_pairs = 0;
        let mut similarity_evaluations = 0;
        for scan in scans {
            pairs.extend(scan.pairs);
            true_pairs += scan.true_pairs;
            similarity_evaluations += scan.evaluations;
        }

        let outcome = LshOutcome {
            similar: SimilarityTable::from_pairs(pairs),
            true_pairs,
            similarity_evaluations,
            indexed_entities: rows.len(),
        };
        debug!(
            "{} true pairs out of {} similarity evaluations",
            outcome.true_pairs, outcome.similarity_evaluations
        );
        Ok(outcome)
    }

    /// Scan every pair `(rows[a], rows[b])` with `b > a`
    fn scan_row(
        &self,
        a: usize,
        rows: &[usize],
        members: &[&MemberSet],
        threshold: f64,
    ) -> Result<RowScan<E>> {
        let mut scan = RowScan {
            pairs: Vec::new(),
            true_pairs: 0,
            evaluations: 0,
        };
        let i = rows[a];

        for b in a + 1..rows.len() {
            let j = rows[b];
            for band in 0..self.num_bands {
                if !self.same_bucket(i, j, band) {
                    continue;
                }

                let similarity = jaccard(members[a], members[b])?;
                scan.evaluations += 1;

                if similarity >= threshold {
                    scan.true_pairs += 1;
                    scan.pairs.push(ScoredPair::new(
                        self.matrix.entity(i).clone(),
                        self.matrix.entity(j).clone(),
                        similarity,
                    ));
                    break;
                }
            }
        }

        Ok(scan)
    }
}

struct RowScan<E> {
    pairs: Vec<ScoredPair<E>>,
    true_pairs: usize,
    evaluations: usize,
}

fn members_of<'a, E: EntityId>(sets: &'a MemberSets<E>, entity: &E) -> Result<&'a MemberSet> {
    sets.get(entity)
        .ok_or_else(|| SimilarityError::not_found("Entity", entity))
}

/// Signatures plus bucket tables for `sets`, as configured
pub fn build_index<E: EntityId>(sets: &MemberSets<E>, config: &LshConfig) -> Result<LshIndex<E>> {
    config.validate()?;
    let hasher = MinHasher::from_config(&config.minhash()?)?;
    let matrix = hasher.signature_matrix(sets);
    LshIndex::build(
        matrix,
        sets,
        config.num_bands,
        config.rows_per_band,
        config.min_members,
    )
}

/// Full banded pipeline: signatures, bucket tables, exact confirmation.
#[instrument(skip(sets, config), fields(entities = sets.len(), bands = config.num_bands, rows = config.rows_per_band))]
pub fn lsh_similarities<E: EntityId>(
    sets: &MemberSets<E>,
    config: &LshConfig,
) -> Result<LshOutcome<E>> {
    let index = build_index(sets, config)?;
    let outcome = index.find_similar_pairs(sets, config.similarity_threshold)?;

    info!(
        similar_pairs = outcome.similar.len(),
        true_pairs = outcome.true_pairs,
        similarity_evaluations = outcome.similarity_evaluations,
        "LSH similarity search finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinHashConfig;
    use crate::hashing::{HashFamily, HashFunction};
    use crate::types::PairKey;

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

    /// Hash functions `x mod 97` and `(x + 1) mod 97`: both order members
    /// the same way, so every signature slot tracks the set minimum.
    fn min_tracking_matrix(sets: &MemberSets<u32>) -> SignatureMatrix<u32> {
        let family = HashFamily::from_functions(
            vec![HashFunction { a: 1, b: 0 }, HashFunction { a: 1, b: 1 }],
            97,
        )
        .unwrap();
        MinHasher::new(family).signature_matrix(sets)
    }

    #[test]
    fn test_band_mismatch_is_configuration_error() {
        let matrix = MinHasher::from_config(&MinHashConfig::new(10).with_seed(1))
            .unwrap()
            .signature_matrix(&sample_sets());
        let err = LshIndex::build(matrix, &sample_sets(), 3, 3, 0).err().unwrap();
        assert!(matches!(err, SimilarityError::Configuration { .. }));
    }

    #[test]
    fn test_shared_minimum_makes_candidates() {
        // Sets 1 and 2 share their minimum (10), set 3 does not
        let sets: MemberSets<u32> = [
            (1, set(&[10, 20, 30])),
            (2, set(&[10, 40])),
            (3, set(&[50, 60])),
        ]
        .into_iter()
        .collect();
        let index = LshIndex::build(min_tracking_matrix(&sets), &sets, 2, 1, 0).unwrap();

        assert_eq!(index.candidate_pairs(), vec![(0, 1)]);
        assert_eq!(index.shared_band(0, 1), Some(0));
        assert_eq!(index.shared_band(0, 2), None);
        assert_eq!(index.candidates_of(&1).unwrap(), vec![2]);
        assert!(index.candidates_of(&3).unwrap().is_empty());
    }

    #[test]
    fn test_rejected_pair_is_evaluated_per_shared_band() {
        // Jaccard(1, 2) = 1/4, below the threshold, and they share both bands
        let sets: MemberSets<u32> = [(1, set(&[10, 20, 30])), (2, set(&[10, 40]))]
            .into_iter()
            .collect();
        let index = LshIndex::build(min_tracking_matrix(&sets), &sets, 2, 1, 0).unwrap();

        let outcome = index.find_similar_pairs(&sets, 0.5).unwrap();
        assert_eq!(outcome.similarity_evaluations, 2);
        assert_eq!(outcome.true_pairs, 0);
        assert!(outcome.similar.is_empty());

        let outcome = index.find_similar_pairs(&sets, 0.25).unwrap();
        assert_eq!(outcome.similarity_evaluations, 1);
        assert_eq!(outcome.true_pairs, 1);
        assert_eq!(outcome.similar.score(&1, &2), Some(0.25));
    }

    #[test]
    fn test_sample_scenario() {
        let config = LshConfig::new(32, 1).with_seed(42);
        let outcome = lsh_similarities(&sample_sets(), &config).unwrap();

        // Pairs with 3 share no members, so they can never clear 0.5
        assert!(!outcome.similar.contains(&PairKey::new(1, 3)));
        assert!(!outcome.similar.contains(&PairKey::new(2, 3)));
        assert!(outcome.similar.len() <= 1);
        if let Some(top) = outcome.similar.top() {
            assert_eq!(top.key.to_string(), "1_2");
            assert_eq!(top.similarity, 0.5);
        }
        assert_eq!(outcome.true_pairs, outcome.similar.len());
        assert!(outcome.similarity_evaluations >= outcome.true_pairs);
    }

    #[test]
    fn test_min_members_floor_and_not_found() {
        let config = LshConfig::new(4, 2).with_seed(3).with_min_members(3);
        let sets = sample_sets();
        let index = build_index(&sets, &config).unwrap();

        assert_eq!(index.num_indexed(), 2);
        assert!(!index.is_indexed(&3));
        assert!(matches!(
            index.candidates_of(&3),
            Err(SimilarityError::NotFound { .. })
        ));
        assert!(matches!(
            index.candidates_of(&99),
            Err(SimilarityError::NotFound { .. })
        ));
    }

    #[test]
    fn test_empty_sets_are_never_indexed() {
        let sets: MemberSets<u32> = [(1, MemberSet::new()), (2, MemberSet::new()), (3, set(&[7]))]
            .into_iter()
            .collect();
        let index = build_index(&sets, &LshConfig::new(4, 1).with_seed(8)).unwrap();

        assert_eq!(index.num_indexed(), 1);
        // Would fail with InvalidInput if the two empty sets were compared
        let outcome = index.find_similar_pairs(&sets, 0.0).unwrap();
        assert_eq!(outcome.similarity_evaluations, 0);
    }

    #[test]
    fn test_neighbors_ranked() {
        let sets: MemberSets<u32> = [
            (1, set(&[10, 20, 30, 40])),
            (2, set(&[10, 20, 30, 50])),
            (3, set(&[10, 60, 70, 80])),
        ]
        .into_iter()
        .collect();
        let index = LshIndex::build(min_tracking_matrix(&sets), &sets, 2, 1, 0).unwrap();

        // All three share minimum 10
        let neighbors = index.neighbors(&1, &sets, 0.1).unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0], (2, 0.6));
        assert_eq!(neighbors[1].0, 3);

        let strict = index.neighbors(&1, &sets, 0.5).unwrap();
        assert_eq!(strict, vec![(2, 0.6)]);
    }
}
