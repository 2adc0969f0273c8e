//! Accuracy and efficiency of the approximate methods against the exact
//! baseline.

use crate::error::{Result, SimilarityError};
use crate::lsh::LshOutcome;
use crate::types::{EntityId, SimilarityTable};
use serde::Serialize;
use tracing::debug;

/// Directional estimation error of an approximate table.
///
/// This is not a confusion matrix: a "false positive" is a pair whose
/// estimate came out above its exact score, a "false negative" one whose
/// estimate came out below.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EstimationErrors {
    /// Pairs with `exact < approx`
    pub false_positives: usize,
    /// Pairs with `exact > approx`
    pub false_negatives: usize,
    /// Pairs with `exact == approx`
    pub exact_matches: usize,
    pub compared: usize,
    pub mean_absolute_error: f64,
}

/// Compare every pair of `exact` with the same key in `approx`.
///
/// A key of `exact` missing from `approx` is [`SimilarityError::NotFound`]:
/// both tables are expected to cover the same pairs.
pub fn compare_estimates<E: EntityId>(
    exact: &SimilarityTable<E>,
    approx: &SimilarityTable<E>,
) -> Result<EstimationErrors> {
    let mut errors = EstimationErrors::default();
    let mut total_error = 0.0;

    for pair in exact {
        let estimate = approx
            .get(&pair.key)
            .ok_or_else(|| SimilarityError::not_found("Pair", &pair.key))?;

        if pair.similarity < estimate {
            errors.false_positives += 1;
        } else if pair.similarity > estimate {
            errors.false_negatives += 1;
        } else {
            errors.exact_matches += 1;
        }
        total_error += (pair.similarity - estimate).abs();
        errors.compared += 1;
    }

    if errors.compared > 0 {
        errors.mean_absolute_error = total_error / errors.compared as f64;
    }

    debug!(
        "Compared {} pairs: {} over, {} under, MAE {:.4}",
        errors.compared, errors.false_positives, errors.false_negatives, errors.mean_absolute_error
    );
    Ok(errors)
}

/// How much exact work the banding saved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LshEfficiency {
    pub true_pairs: usize,
    pub similarity_evaluations: usize,
    /// `n(n-1)/2` over the indexed entities
    pub total_pairs: usize,
}

impl LshEfficiency {
    pub fn from_outcome<E>(outcome: &LshOutcome<E>) -> Self {
        let n = outcome.indexed_entities;
        Self {
            true_pairs: outcome.true_pairs,
            similarity_evaluations: outcome.similarity_evaluations,
            total_pairs: n * n.saturating_sub(1) / 2,
        }
    }

    /// Exact comparisons a brute-force scan would have made on top of ours.
    /// Zero when rejected pairs were re-scored often enough to exceed it.
    pub fn comparisons_avoided(&self) -> usize {
        self.total_pairs.saturating_sub(self.similarity_evaluations)
    }

    /// Exact evaluations per possible pair
    pub fn evaluation_ratio(&self) -> f64 {
        if self.total_pairs == 0 {
            return 0.0;
        }
        self.similarity_evaluations as f64 / self.total_pairs as f64
    }

    /// Share of evaluations that confirmed a pair; `None` before any evaluation
    pub fn precision(&self) -> Option<f64> {
        if self.similarity_evaluations == 0 {
            return None;
        }
        Some(self.true_pairs as f64 / self.similarity_evaluations as f64)
    }
}

/// Share of `expected` pairs that `found` recovered.
///
/// An empty `expected` table is trivially fully recalled.
pub fn recall<E: EntityId>(found: &SimilarityTable<E>, expected: &SimilarityTable<E>) -> f64 {
    if expected.is_empty() {
        return 1.0;
    }
    let hits = expected.keys().filter(|key| found.contains(key)).count();
    hits as f64 / expected.len() as f64
}
