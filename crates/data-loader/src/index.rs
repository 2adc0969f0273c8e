//! RatingIndex loading and member-set derivation.
//!
//! This module turns parsed ratings into the two set-valued views the
//! similarity pipelines consume:
//! - user → items the user rated
//! - item → `(user, polarity)` tokens of everyone who rated it

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

impl RatingIndex {
    /// Load and validate a ratings file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading ratings from {:?}", path);

        let ratings = parser::parse_ratings(path)?;
        let index = Self::from_ratings(ratings);
        index.validate()?;

        let (users, items, ratings) = index.counts();
        info!(users, items, ratings, "Rating index built");
        Ok(index)
    }

    /// Build an index from ratings already in memory
    pub fn from_ratings(ratings: impl IntoIterator<Item = Rating>) -> Self {
        let mut index = RatingIndex::new();
        for rating in ratings {
            index.insert_rating(rating);
        }
        index
    }

    /// Check that every stored rating is a finite number
    pub fn validate(&self) -> Result<()> {
        for ratings in self.user_ratings.values() {
            for rating in ratings {
                if !rating.rating.is_finite() {
                    return Err(DataLoadError::InvalidValue {
                        field: "rating".to_string(),
                        value: rating.rating.to_string(),
                    });
                }
            }
        }
        if self.user_ratings.is_empty() {
            return Err(DataLoadError::ValidationError(
                "no ratings were loaded".to_string(),
            ));
        }
        Ok(())
    }

    /// Map every user to the set of items they rated
    ///
    /// Repeated ratings of the same item collapse into one member.
    pub fn user_items(&self) -> MemberSets<UserId> {
        let sets: MemberSets<UserId> = self
            .user_ratings
            .iter()
            .map(|(&user_id, ratings)| {
                let items: HashSet<MemberId> =
                    ratings.iter().map(|r| r.item_id as MemberId).collect();
                (user_id, items)
            })
            .collect();

        debug!("Built item sets for {} users", sets.len());
        sets
    }

    /// Map every item to the `(user, polarity)` tokens of its raters
    ///
    /// Tokens are produced by [`Polarity::token`], so the same user rating
    /// two items with the same polarity contributes the same member to both.
    pub fn item_raters(&self, thresholds: &PolarityThresholds) -> MemberSets<ItemId> {
        let sets: MemberSets<ItemId> = self
            .item_ratings
            .par_iter()
            .map(|(&item_id, ratings)| {
                let tokens: HashSet<MemberId> = ratings
                    .iter()
                    .map(|r| thresholds.discretize(r.rating).token(r.user_id))
                    .collect();
                (item_id, tokens)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        debug!("Built rater sets for {} items", sets.len());
        sets
    }

    /// Every item a user rated, with the rating discretized
    pub fn user_polarities(
        &self,
        user_id: UserId,
        thresholds: &PolarityThresholds,
    ) -> Vec<(ItemId, Polarity)> {
        self.get_user_ratings(user_id)
            .iter()
            .map(|r| (r.item_id, thresholds.discretize(r.rating)))
            .collect()
    }
}
