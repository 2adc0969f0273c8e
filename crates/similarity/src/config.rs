//! Run configuration for the MinHash and LSH pipelines.
//!
//! Every knob is explicit. The only defaults are the ones documented on the
//! constants below; `validate()` rejects anything the algorithms can't run
//! with.

use crate::error::{Result, SimilarityError};
use serde::{Deserialize, Serialize};

/// Default prime modulus `R` of the hash family
pub const DEFAULT_MODULUS: u64 = 1_000_003;

/// Default similarity threshold for "similar" pairs
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Configuration of a direct MinHash run (no banding)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinHashConfig {
    pub num_hash_functions: usize,
    pub modulus: u64,
    pub similarity_threshold: f64,
    /// Seed of the run's random source; `None` draws one from the OS
    pub seed: Option<u64>,
}

impl MinHashConfig {
    pub fn new(num_hash_functions: usize) -> Self {
        Self {
            num_hash_functions,
            modulus: DEFAULT_MODULUS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            seed: None,
        }
    }

    pub fn with_modulus(mut self, modulus: u64) -> Self {
        self.modulus = modulus;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_modulus(self.modulus)?;
        validate_hash_count(self.num_hash_functions, self.modulus)?;
        validate_threshold(self.similarity_threshold)
    }
}

/// Configuration of a banded LSH run
///
/// The signature width is always `num_bands * rows_per_band`. Raising
/// `num_bands` gives pairs more chances to collide (recall), raising
/// `rows_per_band` makes each collision harder (precision).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LshConfig {
    pub num_bands: usize,
    pub rows_per_band: usize,
    pub modulus: u64,
    pub similarity_threshold: f64,
    /// Entities with fewer members than this are left out of the index
    pub min_members: usize,
    pub seed: Option<u64>,
}

impl LshConfig {
    pub fn new(num_bands: usize, rows_per_band: usize) -> Self {
        Self {
            num_bands,
            rows_per_band,
            modulus: DEFAULT_MODULUS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            min_members: 0,
            seed: None,
        }
    }

    /// Pick the band split of `num_hash_functions` whose S-curve midpoint
    /// `(1/b)^(1/r)` lies closest to `threshold`.
    pub fn for_threshold(num_hash_functions: usize, threshold: f64) -> Result<Self> {
        if num_hash_functions == 0 {
            return Err(SimilarityError::config(
                "num_hash_functions",
                "must be at least 1",
            ));
        }
        validate_threshold(threshold)?;

        let mut best = (1, num_hash_functions);
        let mut best_diff = f64::MAX;
        for bands in (1..=num_hash_functions).filter(|b| num_hash_functions % b == 0) {
            let rows = num_hash_functions / bands;
            let midpoint = (1.0 / bands as f64).powf(1.0 / rows as f64);
            let diff = (midpoint - threshold).abs();
            if diff < best_diff {
                best = (bands, rows);
                best_diff = diff;
            }
        }

        Ok(Self::new(best.0, best.1).with_similarity_threshold(threshold))
    }

    /// Pick the split with `bands * rows <= num_hash_functions` that
    /// minimises `fp_weight * FP + fn_weight * FN`.
    ///
    /// FP is the area under the candidate curve below `threshold` (pairs
    /// that collide without being similar enough), FN the area the curve
    /// misses above it. The resulting signature width may be smaller than
    /// `num_hash_functions`.
    pub fn for_threshold_weighted(
        num_hash_functions: usize,
        threshold: f64,
        false_positive_weight: f64,
        false_negative_weight: f64,
    ) -> Result<Self> {
        if num_hash_functions == 0 {
            return Err(SimilarityError::config(
                "num_hash_functions",
                "must be at least 1",
            ));
        }
        validate_threshold(threshold)?;
        validate_weights(false_positive_weight, false_negative_weight)?;

        let mut best = (1, 1);
        let mut best_cost = f64::MAX;
        for bands in 1..=num_hash_functions {
            for rows in 1..=num_hash_functions / bands {
                let fp = false_positive_area(threshold, bands, rows);
                let fn_ = false_negative_area(threshold, bands, rows);
                let cost = false_positive_weight * fp + false_negative_weight * fn_;
                if cost < best_cost {
                    best = (bands, rows);
                    best_cost = cost;
                }
            }
        }

        Ok(Self::new(best.0, best.1).with_similarity_threshold(threshold))
    }

    pub fn with_modulus(mut self, modulus: u64) -> Self {
        self.modulus = modulus;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_min_members(mut self, min_members: usize) -> Self {
        self.min_members = min_members;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Signature width implied by the band split
    pub fn num_hash_functions(&self) -> Result<usize> {
        self.num_bands
            .checked_mul(self.rows_per_band)
            .ok_or_else(|| SimilarityError::config("num_bands", "num_bands * rows_per_band overflows"))
    }

    /// Probability that a pair with Jaccard similarity `s` shares at least
    /// one band: `1 - (1 - s^r)^b`
    pub fn candidate_probability(&self, similarity: f64) -> f64 {
        candidate_probability(similarity, self.num_bands, self.rows_per_band)
    }

    /// Chance mass of dissimilar pairs (below the threshold) becoming candidates
    pub fn false_positive_area(&self) -> f64 {
        false_positive_area(self.similarity_threshold, self.num_bands, self.rows_per_band)
    }

    /// Chance mass of similar pairs (above the threshold) never colliding
    pub fn false_negative_area(&self) -> f64 {
        false_negative_area(self.similarity_threshold, self.num_bands, self.rows_per_band)
    }

    /// The MinHash settings used to build this run's signatures
    pub fn minhash(&self) -> Result<MinHashConfig> {
        Ok(MinHashConfig {
            num_hash_functions: self.num_hash_functions()?,
            modulus: self.modulus,
            similarity_threshold: self.similarity_threshold,
            seed: self.seed,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_bands == 0 {
            return Err(SimilarityError::config("num_bands", "must be at least 1"));
        }
        if self.rows_per_band == 0 {
            return Err(SimilarityError::config("rows_per_band", "must be at least 1"));
        }
        self.minhash()?.validate()
    }
}

pub(crate) fn validate_modulus(modulus: u64) -> Result<()> {
    if modulus < 2 {
        return Err(SimilarityError::config(
            "modulus",
            format!("{} is not a usable modulus (need at least 2)", modulus),
        ));
    }
    if modulus == u64::MAX {
        return Err(SimilarityError::config(
            "modulus",
            "no room above the modulus for the signature sentinel",
        ));
    }
    Ok(())
}

pub(crate) fn validate_hash_count(num_hash_functions: usize, modulus: u64) -> Result<()> {
    if num_hash_functions == 0 {
        return Err(SimilarityError::config(
            "num_hash_functions",
            "must be at least 1",
        ));
    }
    if num_hash_functions as u128 > modulus as u128 {
        return Err(SimilarityError::config(
            "num_hash_functions",
            format!(
                "{} distinct coefficients cannot be drawn from [0, {})",
                num_hash_functions, modulus
            ),
        ));
    }
    Ok(())
}

fn validate_weights(false_positive_weight: f64, false_negative_weight: f64) -> Result<()> {
    let usable = |w: f64| w.is_finite() && w >= 0.0;
    if !usable(false_positive_weight) || !usable(false_negative_weight) {
        return Err(SimilarityError::config(
            "weights",
            format!(
                "({}, {}) must both be finite and non-negative",
                false_positive_weight, false_negative_weight
            ),
        ));
    }
    if false_positive_weight + false_negative_weight <= 0.0 {
        return Err(SimilarityError::config("weights", "at least one weight must be positive"));
    }
    Ok(())
}

/// `1 - (1 - s^r)^b`, with float exponents so huge splits don't wrap
fn candidate_probability(similarity: f64, bands: usize, rows: usize) -> f64 {
    let band_match = similarity.powf(rows as f64);
    1.0 - (1.0 - band_match).powf(bands as f64)
}

fn false_positive_area(threshold: f64, bands: usize, rows: usize) -> f64 {
    integrate(|s| candidate_probability(s, bands, rows), 0.0, threshold)
}

fn false_negative_area(threshold: f64, bands: usize, rows: usize) -> f64 {
    integrate(|s| 1.0 - candidate_probability(s, bands, rows), threshold, 1.0)
}

/// Composite Simpson's rule over `[from, to]`
fn integrate(f: impl Fn(f64) -> f64, from: f64, to: f64) -> f64 {
    const INTERVALS: usize = 64;
    let step = (to - from) / INTERVALS as f64;
    if step <= 0.0 {
        return 0.0;
    }

    let mut sum = f(from) + f(to);
    for i in 1..INTERVALS {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(from + i as f64 * step);
    }
    sum * step / 3.0
}

pub(crate) fn validate_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(SimilarityError::config(
            "similarity_threshold",
            format!("{} is outside [0, 1]", threshold),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LshConfig::new(20, 5);
        assert_eq!(config.modulus, 1_000_003);
        assert_eq!(config.similarity_threshold, 0.5);
        assert_eq!(config.num_hash_functions().unwrap(), 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_too_many_hash_functions() {
        let config = MinHashConfig::new(98).with_modulus(97);
        assert!(matches!(
            config.validate(),
            Err(SimilarityError::Configuration { ref field, .. }) if field == "num_hash_functions"
        ));
        assert!(MinHashConfig::new(97).with_modulus(97).validate().is_ok());
    }

    #[test]
    fn test_unusable_modulus() {
        for modulus in [0, 1, u64::MAX] {
            let config = MinHashConfig::new(1).with_modulus(modulus);
            assert!(config.validate().is_err(), "modulus {} accepted", modulus);
        }
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(MinHashConfig::new(4).with_similarity_threshold(1.5).validate().is_err());
        assert!(MinHashConfig::new(4).with_similarity_threshold(f64::NAN).validate().is_err());
        assert!(MinHashConfig::new(4).with_similarity_threshold(0.0).validate().is_ok());
    }

    #[test]
    fn test_zero_bands_or_rows() {
        assert!(LshConfig::new(0, 4).validate().is_err());
        assert!(LshConfig::new(4, 0).validate().is_err());
    }

    #[test]
    fn test_for_threshold_picks_divisors() {
        let config = LshConfig::for_threshold(100, 0.5).unwrap();
        assert_eq!(config.num_bands * config.rows_per_band, 100);
        assert_eq!(config.similarity_threshold, 0.5);

        // Midpoint of 20 bands x 5 rows is ~0.55, closer than any other split
        assert_eq!((config.num_bands, config.rows_per_band), (20, 5));
    }

    #[test]
    fn test_candidate_probability_with_huge_splits() {
        // 2^32 rows: no band can ever match below similarity 1
        let tall = LshConfig::new(1, 1usize << 32);
        assert!(tall.candidate_probability(0.9) < 1e-9);
        assert_eq!(tall.candidate_probability(1.0), 1.0);

        // 2^32 bands: any non-zero band match is all but certain
        let wide = LshConfig::new(1usize << 32, 1);
        assert!(wide.candidate_probability(0.01) > 0.999);
        assert_eq!(wide.candidate_probability(0.0), 0.0);
    }

    #[test]
    fn test_weighted_split_fits_budget() {
        let config = LshConfig::for_threshold_weighted(100, 0.5, 0.5, 0.5).unwrap();
        assert!(config.num_bands * config.rows_per_band <= 100);
        assert_eq!(config.similarity_threshold, 0.5);
        assert!(config.validate().is_ok());
        assert_eq!((config.num_bands, config.rows_per_band), (20, 5));

        let items = LshConfig::for_threshold_weighted(1000, 0.2, 0.2, 0.8).unwrap();
        assert!(items.num_bands * items.rows_per_band <= 1000);
        // Similar items at the threshold almost always collide
        assert!(items.candidate_probability(0.3) > 0.9);
    }

    #[test]
    fn test_weights_trade_false_negatives_for_false_positives() {
        let recall_heavy = LshConfig::for_threshold_weighted(128, 0.5, 0.1, 0.9).unwrap();
        let precision_heavy = LshConfig::for_threshold_weighted(128, 0.5, 0.9, 0.1).unwrap();

        assert!(recall_heavy.false_negative_area() <= precision_heavy.false_negative_area());
        assert!(recall_heavy.false_positive_area() >= precision_heavy.false_positive_area());
    }

    #[test]
    fn test_bad_weights() {
        assert!(LshConfig::for_threshold_weighted(100, 0.5, -0.1, 1.0).is_err());
        assert!(LshConfig::for_threshold_weighted(100, 0.5, 0.0, 0.0).is_err());
        assert!(LshConfig::for_threshold_weighted(100, 0.5, f64::NAN, 0.5).is_err());
        assert!(LshConfig::for_threshold_weighted(0, 0.5, 0.5, 0.5).is_err());
    }

    #[test]
    fn test_candidate_probability_is_monotonic_in_bands() {
        let few = LshConfig::new(2, 4).candidate_probability(0.6);
        let many = LshConfig::new(8, 4).candidate_probability(0.6);
        assert!(many > few);
        assert!(LshConfig::new(8, 4).candidate_probability(1.0) > 0.999);
    }
}
