//! Shared data types: member sets, pair keys and ranked similarity tables.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// Integer member of an entity's set (a movie id, an encoded rating, ...)
pub type MemberId = u64;

/// The members of one entity
pub type MemberSet = HashSet<MemberId>;

/// Entity to member-set mapping
///
/// Entities are always visited in key order, so entity indices are stable
/// for a given input.
pub type MemberSets<E> = BTreeMap<E, MemberSet>;

/// Anything usable as an entity identifier: integers, strings, ...
pub trait EntityId: Clone + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync {}

impl<T> EntityId for T where T: Clone + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync {}

/// Unordered pair of entities, stored in entity order.
///
/// Renders as `"first_second"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairKey<E> {
    pub first: E,
    pub second: E,
}

impl<E: Ord> PairKey<E> {
    /// Build a key, putting the smaller entity first
    pub fn new(a: E, b: E) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }
}

impl<E: fmt::Display> fmt::Display for PairKey<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.first, self.second)
    }
}

/// A pair key with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPair<E> {
    #[serde(flatten)]
    pub key: PairKey<E>,
    pub similarity: f64,
}

impl<E: Ord> ScoredPair<E> {
    pub fn new(a: E, b: E, similarity: f64) -> Self {
        Self {
            key: PairKey::new(a, b),
            similarity,
        }
    }
}

/// Pair-key to score mapping, ranked by descending score.
///
/// Ties are broken by ascending pair key so the ranking is deterministic.
#[derive(Debug, Clone)]
pub struct SimilarityTable<E> {
    pairs: Vec<ScoredPair<E>>,
    positions: HashMap<PairKey<E>, usize>,
}

impl<E: EntityId> SimilarityTable<E> {
    /// Rank the given pairs. Keys are expected to be unique; if one repeats,
    /// lookups resolve to its highest-ranked entry.
    pub fn from_pairs(pairs: impl IntoIterator<Item = ScoredPair<E>>) -> Self {
        let mut pairs: Vec<ScoredPair<E>> = pairs.into_iter().collect();
        pairs.sort_by(|a, b| rank_order(a, b));

        let mut positions = HashMap::with_capacity(pairs.len());
        for (pos, pair) in pairs.iter().enumerate() {
            positions.entry(pair.key.clone()).or_insert(pos);
        }

        Self { pairs, positions }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Score stored for a pair, if any
    pub fn get(&self, key: &PairKey<E>) -> Option<f64> {
        self.positions.get(key).map(|&pos| self.pairs[pos].similarity)
    }

    /// Score of the pair `(a, b)` in either order
    pub fn score(&self, a: &E, b: &E) -> Option<f64> {
        self.get(&PairKey::new(a.clone(), b.clone()))
    }

    pub fn contains(&self, key: &PairKey<E>) -> bool {
        self.positions.contains_key(key)
    }

    /// Pairs in rank order
    pub fn iter(&self) -> std::slice::Iter<'_, ScoredPair<E>> {
        self.pairs.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PairKey<E>> + '_ {
        self.pairs.iter().map(|p| &p.key)
    }

    /// The highest-scoring pair
    pub fn top(&self) -> Option<&ScoredPair<E>> {
        self.pairs.first()
    }

    /// A new table with only the pairs scoring at least `threshold`
    pub fn above(&self, threshold: f64) -> Self {
        Self::from_pairs(
            self.pairs
                .iter()
                .filter(|p| p.similarity >= threshold)
                .cloned(),
        )
    }
}

impl<E: EntityId> Default for SimilarityTable<E> {
    fn default() -> Self {
        Self::from_pairs(Vec::new())
    }
}

impl<'a, E> IntoIterator for &'a SimilarityTable<E> {
    type Item = &'a ScoredPair<E>;
    type IntoIter = std::slice::Iter<'a, ScoredPair<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

impl<E: Serialize> Serialize for SimilarityTable<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.pairs)
    }
}

fn rank_order<E: Ord>(a: &ScoredPair<E>, b: &ScoredPair<E>) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.key.cmp(&b.key))
}

/// Output of an all-pairs baseline: every pair, plus the thresholded subset
#[derive(Debug, Clone)]
pub struct PairwiseReport<E> {
    pub all: SimilarityTable<E>,
    pub similar: SimilarityTable<E>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_orders_entities() {
        let key = PairKey::new(7u32, 3u32);
        assert_eq!(key.first, 3);
        assert_eq!(key.second, 7);
        assert_eq!(key.to_string(), "3_7");
        assert_eq!(key, PairKey::new(3, 7));
    }

    #[test]
    fn test_table_ranks_descending() {
        let table = SimilarityTable::from_pairs(vec![
            ScoredPair::new(1u32, 2, 0.25),
            ScoredPair::new(1, 3, 0.75),
            ScoredPair::new(2, 3, 0.75),
        ]);

        let order: Vec<String> = table.keys().map(|k| k.to_string()).collect();
        assert_eq!(order, vec!["1_3", "2_3", "1_2"]);
        assert_eq!(table.top().unwrap().key, PairKey::new(1, 3));
        assert_eq!(table.score(&3, &2), Some(0.75));
        assert_eq!(table.score(&9, &2), None);
    }

    #[test]
    fn test_above_threshold_is_inclusive() {
        let table = SimilarityTable::from_pairs(vec![
            ScoredPair::new(1u32, 2, 0.5),
            ScoredPair::new(1, 3, 0.49),
        ]);

        let similar = table.above(0.5);
        assert_eq!(similar.len(), 1);
        assert!(similar.contains(&PairKey::new(1, 2)));
    }

    #[test]
    fn test_string_entities() {
        let table = SimilarityTable::from_pairs(vec![ScoredPair::new(
            "bob".to_string(),
            "alice".to_string(),
            1.0,
        )]);
        assert_eq!(table.top().unwrap().key.to_string(), "alice_bob");
    }
}
