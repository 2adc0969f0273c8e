//! # Similarity Crate
//!
//! Approximate set similarity with MinHash and banded LSH, measured against
//! exact Jaccard similarity.
//!
//! ## Components
//!
//! ### Jaccard Oracle
//! Exact `|A ∩ B| / |A ∪ B|`, plus an all-pairs baseline.
//!
//! ### MinHash Signature Generator
//! Fixed-width signatures whose agreement rate estimates Jaccard similarity.
//!
//! ### Banded LSH Index
//! Buckets signature bands so only colliding pairs are re-scored exactly.
//!
//! ### Similarity Evaluator
//! Directional estimation errors, LSH efficiency counters and recall.
//!
//! ### Item Recommender
//! Item-based recommendations from LSH neighbors of the items a user liked.
//!
//! ## Example Usage
//!
//! ```ignore
//! use similarity::{LshConfig, jaccard_similarities, lsh_similarities, recall};
//!
//! let config = LshConfig::new(20, 5).with_seed(42);
//! let outcome = lsh_similarities(&user_items, &config)?;
//! let exact = jaccard_similarities(&user_items, config.similarity_threshold)?;
//!
//! println!("recall: {:.3}", recall(&outcome.similar, &exact.similar));
//! ```
//!
//! ## Reproducibility
//!
//! All randomness comes from one seedable RNG per run, and entities are
//! visited in key order, so the same seed, input and configuration give
//! identical signatures and results.

pub mod config;
pub mod error;
pub mod evaluate;
pub mod hashing;
pub mod jaccard;
pub mod lsh;
pub mod minhash;
pub mod recommend;
pub mod types;

pub use config::{DEFAULT_MODULUS, DEFAULT_SIMILARITY_THRESHOLD, LshConfig, MinHashConfig};
pub use error::{Result, SimilarityError};
pub use evaluate::{EstimationErrors, LshEfficiency, compare_estimates, recall};
pub use hashing::{HashFamily, HashFunction};
pub use jaccard::{jaccard, jaccard_similarities};
pub use lsh::{LshIndex, LshOutcome, build_index, lsh_similarities};
pub use minhash::{MinHasher, SignatureMatrix, minhash_similarities, signature_agreement};
pub use recommend::{ItemRecommender, Recommendation};
pub use types::{
    EntityId, MemberId, MemberSet, MemberSets, PairKey, PairwiseReport, ScoredPair,
    SimilarityTable,
};
