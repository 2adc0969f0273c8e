//! Item-based recommendations on top of an LSH index of items.
//!
//! ## Algorithm
//! 1. For every item the user liked, look up its LSH neighbors whose exact
//!    similarity reaches the neighbor threshold
//! 2. Every neighbor collects the similarity as a vote
//! 3. Drop items the user already rated
//! 4. Rank by total votes and keep the top `limit`

use crate::config::LshConfig;
use crate::error::{Result, SimilarityError};
use crate::lsh::LshIndex;
use crate::types::{EntityId, MemberSets};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, instrument};

/// Default minimum similarity for an item to count as a neighbor
pub const DEFAULT_NEIGHBOR_THRESHOLD: f64 = 0.2;

/// Default number of recommendations returned
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 10;

/// Items rated by fewer users are not indexed for recommendations
pub const DEFAULT_ITEM_MIN_MEMBERS: usize = 10;

/// Signature budget of the item index
pub const DEFAULT_ITEM_HASH_FUNCTIONS: usize = 1000;

/// Missing a neighbor costs more than re-scoring a stray candidate
pub const DEFAULT_ITEM_FALSE_POSITIVE_WEIGHT: f64 = 0.2;
pub const DEFAULT_ITEM_FALSE_NEGATIVE_WEIGHT: f64 = 0.8;

/// Item index configuration for a neighbor threshold: the weighted band
/// split of [`DEFAULT_ITEM_HASH_FUNCTIONS`] and the
/// [`DEFAULT_ITEM_MIN_MEMBERS`] floor.
pub fn item_index_config(neighbor_threshold: f64) -> Result<LshConfig> {
    let config = LshConfig::for_threshold_weighted(
        DEFAULT_ITEM_HASH_FUNCTIONS,
        neighbor_threshold,
        DEFAULT_ITEM_FALSE_POSITIVE_WEIGHT,
        DEFAULT_ITEM_FALSE_NEGATIVE_WEIGHT,
    )?;
    Ok(config.with_min_members(DEFAULT_ITEM_MIN_MEMBERS))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation<E> {
    pub item: E,
    /// Sum of the similarities to the liked items that voted for it
    pub score: f64,
    /// Number of liked items that voted for it
    pub votes: usize,
}

/// Recommends items similar to the ones a user liked
pub struct ItemRecommender<'a, E> {
    /// Read-only item index, shared across users
    index: &'a LshIndex<E>,

    /// Raw member sets the index was built from, for exact re-scoring
    sets: &'a MemberSets<E>,

    neighbor_threshold: f64,

    limit: usize,
}

impl<'a, E: EntityId> ItemRecommender<'a, E> {
    pub fn new(index: &'a LshIndex<E>, sets: &'a MemberSets<E>) -> Self {
        Self {
            index,
            sets,
            neighbor_threshold: DEFAULT_NEIGHBOR_THRESHOLD,
            limit: DEFAULT_RECOMMENDATION_LIMIT,
        }
    }

    /// Configure the neighbor similarity threshold (default: 0.2)
    pub fn with_neighbor_threshold(mut self, threshold: f64) -> Self {
        self.neighbor_threshold = threshold;
        self
    }

    /// Configure the number of recommendations (default: 10)
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Rank unseen items by their similarity to `liked`.
    ///
    /// Each distinct liked item votes once. Liked items that are not in the
    /// index (too few ratings) cast no votes.
    #[instrument(skip(self, liked, already_rated), fields(liked_items = liked.len()))]
    pub fn recommend(
        &self,
        liked: &[E],
        already_rated: &HashSet<E>,
    ) -> Result<Vec<Recommendation<E>>> {
        let distinct: BTreeSet<&E> = liked.iter().collect();
        let indexed: Vec<&E> = distinct
            .into_iter()
            .filter(|item| {
                let is_indexed = self.index.is_indexed(item);
                if !is_indexed {
                    debug!("Liked item {} is not indexed, skipping", item);
                }
                is_indexed
            })
            .collect();

        let neighborhoods = indexed
            .par_iter()
            .map(|item| self.index.neighbors(item, self.sets, self.neighbor_threshold))
            .collect::<Result<Vec<_>>>()?;

        // Sequential merge keeps the float sums independent of scheduling
        let mut tallies: HashMap<E, (f64, usize)> = HashMap::new();
        for (neighbor, similarity) in neighborhoods.into_iter().flatten() {
            if already_rated.contains(&neighbor) {
                continue;
            }
            let tally = tallies.entry(neighbor).or_insert((0.0, 0));
            tally.0 += similarity;
            tally.1 += 1;
        }

        let mut recommendations: Vec<Recommendation<E>> = tallies
            .into_iter()
            .map(|(item, (score, votes))| Recommendation { item, score, votes })
            .collect();
        recommendations.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.item.cmp(&b.item)));
        recommendations.truncate(self.limit);

        debug!(
            "{} liked items produced {} recommendations",
            indexed.len(),
            recommendations.len()
        );
        Ok(recommendations)
    }

    /// Recommendations for one item alone: its neighbors, best first
    pub fn similar_items(&self, item: &E) -> Result<Vec<(E, f64)>> {
        if !self.index.is_indexed(item) {
            return Err(SimilarityError::not_found("Item", item));
        }
        let mut neighbors = self.index.neighbors(item, self.sets, self.neighbor_threshold)?;
        neighbors.truncate(self.limit);
        Ok(neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{HashFamily, HashFunction};
    use crate::minhash::MinHasher;
    use crate::types::MemberSet;

    fn set(members: &[u64]) -> MemberSet {
        members.iter().copied().collect()
    }

    /// Items 1..=4 all contain member 1, so a min-tracking hash family puts
    /// them in one bucket; item 5 stands apart.
    fn item_sets() -> MemberSets<u32> {
        [
            (1, set(&[1, 2, 3, 4])),
            (2, set(&[1, 2, 3, 5])),
            (3, set(&[1, 2, 6, 7])),
            (4, set(&[1, 8, 9, 10, 11, 12, 13, 14, 15, 16])),
            (5, set(&[50, 51])),
        ]
        .into_iter()
        .collect()
    }

    fn item_index(sets: &MemberSets<u32>) -> LshIndex<u32> {
        let family = HashFamily::from_functions(
            vec![HashFunction { a: 1, b: 0 }, HashFunction { a: 1, b: 3 }],
            97,
        )
        .unwrap();
        let matrix = MinHasher::new(family).signature_matrix(sets);
        LshIndex::build(matrix, sets, 2, 1, 0).unwrap()
    }

    #[test]
    fn test_votes_accumulate_over_liked_items() {
        let sets = item_sets();
        let index = item_index(&sets);
        let recommender = ItemRecommender::new(&index, &sets);

        // Liked 1 and 2 (J = 3/5); both vote for 3 (J(1,3) = J(2,3) = 2/6)
        let liked = vec![1, 2];
        let rated: HashSet<u32> = [1, 2].into_iter().collect();
        let recs = recommender.recommend(&liked, &rated).unwrap();

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].item, 3);
        assert_eq!(recs[0].votes, 2);
        assert!((recs[0].score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_lower_threshold_and_limit() {
        let sets = item_sets();
        let index = item_index(&sets);
        let recommender = ItemRecommender::new(&index, &sets)
            .with_neighbor_threshold(0.05)
            .with_limit(1);

        let rated: HashSet<u32> = [1].into_iter().collect();
        let recs = recommender.recommend(&[1], &rated).unwrap();

        // 2 (0.6) beats 3 (1/3) and 4 (1/13)
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].item, 2);
    }

    #[test]
    fn test_repeated_liked_item_votes_once() {
        let sets = item_sets();
        let index = item_index(&sets);
        let recommender = ItemRecommender::new(&index, &sets);
        let rated: HashSet<u32> = [1].into_iter().collect();

        let once = recommender.recommend(&[1], &rated).unwrap();
        let twice = recommender.recommend(&[1, 1, 1], &rated).unwrap();

        assert_eq!(once, twice);
        assert!(twice.iter().all(|rec| rec.votes == 1));
        assert_eq!(twice[0].item, 2);
        assert_eq!(twice[0].score, 0.6);
    }

    #[test]
    fn test_unindexed_liked_items_are_skipped() {
        let sets = item_sets();
        let index = item_index(&sets);
        let recommender = ItemRecommender::new(&index, &sets);

        let recs = recommender.recommend(&[5, 42], &HashSet::new()).unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn test_similar_items_requires_indexed_item() {
        let sets = item_sets();
        let index = item_index(&sets);
        let recommender = ItemRecommender::new(&index, &sets);

        assert!(matches!(
            recommender.similar_items(&42),
            Err(SimilarityError::NotFound { .. })
        ));
        let similar = recommender.similar_items(&1).unwrap();
        assert_eq!(similar[0], (2, 0.6));
    }

    #[test]
    fn test_item_index_config_favours_recall() {
        let config = item_index_config(DEFAULT_NEIGHBOR_THRESHOLD).unwrap();

        assert_eq!((config.num_bands, config.rows_per_band), (259, 3));
        assert!(config.num_hash_functions().unwrap() <= DEFAULT_ITEM_HASH_FUNCTIONS);
        assert_eq!(config.min_members, DEFAULT_ITEM_MIN_MEMBERS);
        assert_eq!(config.similarity_threshold, DEFAULT_NEIGHBOR_THRESHOLD);
        // a pair just above the threshold is almost surely a candidate
        assert!(config.candidate_probability(0.3) > 0.99);

        assert!(item_index_config(1.5).is_err());
    }
}
