//! Exact Jaccard similarity.
//!
//! Used both as the brute-force baseline and as ground truth when scoring
//! LSH candidates.

use crate::config::validate_threshold;
use crate::error::{Result, SimilarityError};
use crate::types::{EntityId, MemberSets, PairwiseReport, ScoredPair, SimilarityTable};
use rayon::prelude::*;
use std::collections::HashSet;
use std::hash::Hash;
use tracing::{debug, instrument};

/// `|A ∩ B| / |A ∪ B|`
///
/// Two empty sets have no defined similarity and yield
/// [`SimilarityError::InvalidInput`].
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> Result<f64> {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let intersection = small.iter().filter(|x| large.contains(x)).count();
    let union = a.len() + b.len() - intersection;

    if union == 0 {
        return Err(SimilarityError::InvalidInput(
            "Jaccard similarity is undefined for two empty sets".to_string(),
        ));
    }

    Ok(intersection as f64 / union as f64)
}

/// Exact similarity of every unordered entity pair.
///
/// This is `O(n²)` set intersections and only meant as an accuracy
/// baseline for the approximate methods.
///
/// Pairs of two empty sets have no defined similarity and are left out of
/// the report, the same entities the LSH index never indexes.
#[instrument(skip(sets), fields(entities = sets.len()))]
pub fn jaccard_similarities<E: EntityId>(
    sets: &MemberSets<E>,
    similarity_threshold: f64,
) -> Result<PairwiseReport<E>> {
    validate_threshold(similarity_threshold)?;

    let entries: Vec<_> = sets.iter().collect();
    let entries = entries.as_slice();
    let pairs = (0..entries.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            (i + 1..entries.len()).filter_map(move |j| {
                let (u1, s1) = entries[i];
                let (u2, s2) = entries[j];
                if s1.is_empty() && s2.is_empty() {
                    return None;
                }
                Some(jaccard(s1, s2).map(|sim| ScoredPair::new(u1.clone(), u2.clone(), sim)))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let empty = entries.iter().filter(|(_, members)| members.is_empty()).count();
    if empty > 1 {
        debug!(
            "Skipped {} pairs of empty sets ({} empty entities)",
            empty * (empty - 1) / 2,
            empty
        );
    }

    let all = SimilarityTable::from_pairs(pairs);
    let similar = all.above(similarity_threshold);
    debug!(
        "Scored {} pairs exactly, {} at or above {}",
        all.len(),
        similar.len(),
        similarity_threshold
    );

    Ok(PairwiseReport { all, similar })
}
