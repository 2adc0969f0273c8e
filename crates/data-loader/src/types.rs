//! Core domain types for ratings data.
//!
//! This module defines the data structures shared by the parser and the
//! index:
//! - Type aliases for domain clarity (UserId, ItemId, MemberId)
//! - The `Rating` record and its discretized `Polarity`
//! - `RatingIndex`, the in-memory store every member set is derived from

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user
pub type UserId = u32;

/// Unique identifier for a rated item (a movie, a joke, ...)
pub type ItemId = u32;

/// Integer member of a set handed to the similarity crate
pub type MemberId = u64;

/// Entity to member-set mapping, ordered by entity id
///
/// `BTreeMap` gives a stable entity order, which is what makes signature
/// matrices and pair keys reproducible from run to run.
pub type MemberSets<K> = BTreeMap<K, HashSet<MemberId>>;

/// Display name of every item in a catalog file (movie titles, joke text)
pub type ItemTitles = HashMap<ItemId, String>;

// =============================================================================
// Rating Type
// =============================================================================

/// A single rating from a user for an item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub rating: f32,
    /// Unix timestamp, when the source file carries one
    pub timestamp: Option<i64>,
}

// =============================================================================
// Polarity
// =============================================================================

/// Coarse opinion attached to a rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Negative,
    Neutral,
    Positive,
}

impl Polarity {
    const VARIANTS: u64 = 3;

    fn code(self) -> u64 {
        match self {
            Polarity::Negative => 0,
            Polarity::Neutral => 1,
            Polarity::Positive => 2,
        }
    }

    /// Encode a `(user, polarity)` pair as a single set member
    ///
    /// Distinct pairs always map to distinct tokens.
    pub fn token(self, user_id: UserId) -> MemberId {
        user_id as MemberId * Self::VARIANTS + self.code()
    }

    /// Decode a token produced by [`Polarity::token`]
    pub fn from_token(token: MemberId) -> (UserId, Polarity) {
        let polarity = match token % Self::VARIANTS {
            0 => Polarity::Negative,
            1 => Polarity::Neutral,
            _ => Polarity::Positive,
        };
        ((token / Self::VARIANTS) as UserId, polarity)
    }
}

/// Rating cut-offs used to discretize ratings into polarities
///
/// The defaults fit a -10..10 rating scale: below 0 is negative, above 5 is
/// positive, everything in between is neutral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarityThresholds {
    pub negative_below: f32,
    pub positive_above: f32,
}

impl Default for PolarityThresholds {
    fn default() -> Self {
        Self {
            negative_below: 0.0,
            positive_above: 5.0,
        }
    }
}

impl PolarityThresholds {
    pub fn new(negative_below: f32, positive_above: f32) -> Self {
        Self {
            negative_below,
            positive_above,
        }
    }

    pub fn discretize(&self, rating: f32) -> Polarity {
        if rating < self.negative_below {
            Polarity::Negative
        } else if rating > self.positive_above {
            Polarity::Positive
        } else {
            Polarity::Neutral
        }
    }
}

// =============================================================================
// RatingIndex - In-Memory Ratings Store
// =============================================================================

/// Holds every rating, indexed both by user and by item.
///
/// Member sets for the similarity pipelines are derived from this index;
/// the index itself is never mutated once loading is done.
#[derive(Debug, Default)]
pub struct RatingIndex {
    /// All ratings made by each user
    pub(crate) user_ratings: HashMap<UserId, Vec<Rating>>,
    /// All ratings received by each item
    pub(crate) item_ratings: HashMap<ItemId, Vec<Rating>>,
}

impl RatingIndex {
    /// Creates a new, empty RatingIndex
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all ratings made by a user
    ///
    /// Returns an empty slice if the user has no ratings
    pub fn get_user_ratings(&self, user_id: UserId) -> &[Rating] {
        self.user_ratings
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get all ratings for an item
    pub fn get_item_ratings(&self, item_id: ItemId) -> &[Rating] {
        self.item_ratings
            .get(&item_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the user rated anything at all
    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.user_ratings.contains_key(&user_id)
    }

    /// Insert a rating and update both indices
    pub fn insert_rating(&mut self, rating: Rating) {
        self.user_ratings
            .entry(rating.user_id)
            .or_default()
            .push(rating);

        self.item_ratings
            .entry(rating.item_id)
            .or_default()
            .push(rating);
    }

    /// Get (users, items, ratings) counts
    pub fn counts(&self) -> (usize, usize, usize) {
        let total_ratings = self.user_ratings.values().map(|v| v.len()).sum();
        (self.user_ratings.len(), self.item_ratings.len(), total_ratings)
    }
}
