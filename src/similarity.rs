//! Similarity between users, measured on the items they like.
//!
//! The similarity of users `a` and `b` is the Jaccard index of their liked
//! sets:
//! ```text
//! |liked(a) ∩ liked(b)| / |liked(a) ∪ liked(b)|
//! ```
//! It is symmetric, lies in `[0, 1]`, and is undefined when neither user
//! likes anything.
use std::cmp::Ordering;

use super::store::{RatingStore, User};
use super::UserId;

/// Similarity error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Fail)]
pub enum SimilarityError {
    /// Neither user likes any item, so the union of their liked sets is empty.
    #[fail(
        display = "Similarity of users {} and {} is undefined: neither likes any item.",
        _0, _1
    )]
    DivisionUndefined(UserId, UserId),
}

/// A user similar to some other user.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbour {
    /// The neighbour's identifier.
    pub user_id: UserId,
    /// The neighbour's position in the store it was found in.
    pub position: usize,
    /// How similar the neighbour is.
    pub similarity: f64,
}

/// Jaccard similarity of the liked sets of `a` and `b`.
pub fn similarity(a: &User, b: &User) -> Result<f64, SimilarityError> {
    let (smaller, larger) = if a.liked_items().len() <= b.liked_items().len() {
        (a, b)
    } else {
        (b, a)
    };

    let common = smaller
        .liked_items()
        .iter()
        .filter(|&&item_id| larger.likes(item_id))
        .count();
    let total = a.liked_items().len() + b.liked_items().len() - common;

    if total == 0 {
        return Err(SimilarityError::DivisionUndefined(a.id(), b.id()));
    }

    Ok(common as f64 / total as f64)
}

/// The `k` users of `store` most similar to `user`.
///
/// Neighbours come back in ascending order of similarity, so the most
/// similar user is last. Ties keep the order of [`RatingStore::users`].
/// `user` itself is never returned, nor is anyone whose similarity to
/// `user` is undefined.
pub fn most_similar(store: &RatingStore, user: &User, k: usize) -> Vec<Neighbour> {
    let mut neighbours: Vec<Neighbour> = store
        .users()
        .iter()
        .filter(|other| other.id() != user.id())
        .filter_map(|other| match similarity(user, other) {
            Ok(similarity) => Some(Neighbour {
                user_id: other.id(),
                position: other.position(),
                similarity,
            }),
            Err(error) => {
                trace!(%error, "skipping neighbour");
                None
            }
        })
        .collect();

    // Stable: equal scores stay in store order.
    neighbours.sort_by(|a, b| {
        a.similarity
            .partial_cmp(&b.similarity)
            .unwrap_or(Ordering::Equal)
    });

    let start = neighbours.len().saturating_sub(k);
    neighbours.split_off(start)
}
