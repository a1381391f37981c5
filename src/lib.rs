#![deny(missing_docs)]
//! # likesim
//!
//! `likesim` predicts how a user will rate an item from the items they
//! (and users with similar tastes) have already rated, and measures how
//! far those predictions land from held-out ratings.
//!
//! Users are compared through the sets of items they *like* (rated at or
//! above a threshold, 4 on the usual 1-5 scale): the similarity of two users
//! is the size of the intersection of their liked sets over the size of the
//! union. Predictions come from a tiered heuristic: known ratings are
//! passed through, users who like almost everything (or almost nothing) get
//! a fixed guess, and everybody else borrows the rating of their nearest
//! neighbour who has seen the item.
//!
//! ## Example
//! Evaluating on the Movielens 100K `u1.base`/`u1.test` split:
//!
//! ```rust,no_run
//! # extern crate likesim;
//! use likesim::data::{MalformedPolicy, RatingScale};
//! use likesim::evaluation::{evaluate, EvaluationConfig};
//! use likesim::models::tiered::PredictorConfig;
//! use likesim::store::RatingStore;
//!
//! let scale = RatingScale::default();
//! let (train, _) = RatingStore::from_path("u1.base", scale, MalformedPolicy::Reject).unwrap();
//! let (test, _) = RatingStore::from_path("u1.test", scale, MalformedPolicy::Reject).unwrap();
//!
//! let predictor = PredictorConfig::new().neighbourhood_size(10).build(&train);
//! let evaluation = evaluate(&predictor, &test, &EvaluationConfig::default()).unwrap();
//!
//! let statistics = evaluation.statistics().unwrap();
//! println!("mean {} stdev {:?}", statistics.mean, statistics.stdev);
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate itertools;

#[macro_use]
extern crate failure;

#[macro_use]
extern crate tracing;

extern crate csv;
extern crate once_cell;
extern crate rand;
extern crate rayon;
extern crate serde;
extern crate serde_json;
extern crate siphasher;

pub mod config;
pub mod data;
pub mod evaluation;
pub mod models;
pub mod similarity;
pub mod store;

/// Alias for user identifiers.
pub type UserId = u32;
/// Alias for item identifiers.
pub type ItemId = u32;
/// Alias for rating values.
pub type Rating = u8;

/// Prediction error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Fail)]
pub enum PredictionError {
    /// The user never appears in the store predictions are made from.
    #[fail(display = "Unknown user: {}", _0)]
    UnknownUser(UserId),
    /// The item never appears in the store predictions are made from.
    #[fail(display = "Unknown item: {}", _0)]
    UnknownItem(ItemId),
}

/// A predicted rating, together with a label naming the
/// rule that produced it.
pub trait Estimate: std::fmt::Debug {
    /// The predicted rating.
    fn rating(&self) -> Rating;
    /// Short name of the rule that produced the rating.
    fn source(&self) -> &'static str;
}

/// Trait describing models that predict the rating a user
/// would give to an item.
pub trait RatingModel {
    /// The prediction the model produces.
    type Prediction: Estimate + Send;
    /// Predict the rating `user_id` would give `item_id`.
    fn predict(&self, user_id: UserId, item_id: ItemId)
        -> Result<Self::Prediction, PredictionError>;
}
