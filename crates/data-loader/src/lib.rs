//! # Data Loader Crate
//!
//! Loads ratings files and turns them into entity → member-set mappings for
//! the similarity crate.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (Rating, Polarity, RatingIndex)
//! - **parser**: Parse `.dat` / delimited ratings files into Rust structs
//! - **index**: Build the index and derive member sets from it
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{PolarityThresholds, RatingIndex};
//! use std::path::Path;
//!
//! let index = RatingIndex::load_from_file(Path::new("data/ml-1m/ratings.dat"))?;
//!
//! // user -> movies seen
//! let user_items = index.user_items();
//!
//! // item -> (user, polarity) tokens
//! let item_raters = index.item_raters(&PolarityThresholds::default());
//! ```

pub mod error;
pub mod types;
pub mod parser;
pub mod index;

pub use error::{DataLoadError, Result};
pub use types::{
    // Type aliases
    ItemId,
    ItemTitles,
    MemberId,
    MemberSets,
    UserId,
    // Core types
    Polarity,
    PolarityThresholds,
    Rating,
    RatingIndex,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_index_creation() {
        let index = RatingIndex::new();
        let (users, items, ratings) = index.counts();

        assert_eq!(users, 0);
        assert_eq!(items, 0);
        assert_eq!(ratings, 0);
    }

    #[test]
    fn test_insert_rating() {
        let mut index = RatingIndex::new();

        index.insert_rating(Rating {
            user_id: 1,
            item_id: 1193,
            rating: 5.0,
            timestamp: Some(978300760),
        });

        let user_ratings = index.get_user_ratings(1);
        assert_eq!(user_ratings.len(), 1);
        assert_eq!(user_ratings[0].rating, 5.0);

        let item_ratings = index.get_item_ratings(1193);
        assert_eq!(item_ratings.len(), 1);
        assert!(index.contains_user(1));
    }

    #[test]
    fn test_empty_queries() {
        let index = RatingIndex::new();

        assert!(index.get_user_ratings(999).is_empty());
        assert!(index.get_item_ratings(999).is_empty());
        assert!(!index.contains_user(999));
    }
}
