//! Tiered rating heuristic.
//!
//! A prediction for `(user, item)` is the first of:
//!
//! 1. the user's own rating of the item, if they rated it;
//! 2. `optimistic_rating`, if the user liked every item they rated or
//!    more than `optimistic_fraction` of them;
//! 3. `pessimistic_rating`, if the user liked nothing or less than
//!    `pessimistic_fraction` of what they rated;
//! 4. the rating given by the first of the user's `neighbourhood_size`
//!    most similar users (scanned in the ascending order
//!    [`most_similar`] returns) who rated the item;
//! 5. `fallback_rating`.
//!
//! Neighbourhoods are expensive and only needed for users in the band
//! between the two fractions. They are computed on first use and kept for
//! the lifetime of the predictor; the store is immutable while borrowed, so
//! they never go stale.
use once_cell::sync::OnceCell;
use rayon::prelude::*;

use super::Tier;
use crate::similarity::{most_similar, Neighbour};
use crate::store::{RatingStore, User};
use crate::{Estimate, ItemId, PredictionError, Rating, RatingModel, UserId};

/// Configuration of the tiered predictor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    optimistic_fraction: f64,
    pessimistic_fraction: f64,
    optimistic_rating: Rating,
    pessimistic_rating: Rating,
    fallback_rating: Rating,
    neighbourhood_size: usize,
    require_known_items: bool,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        PredictorConfig::new()
    }
}

impl PredictorConfig {
    /// Build a new configuration with the default policy.
    pub fn new() -> Self {
        PredictorConfig {
            optimistic_fraction: 0.8,
            pessimistic_fraction: 0.25,
            optimistic_rating: 4,
            pessimistic_rating: 2,
            fallback_rating: 4,
            neighbourhood_size: 10,
            require_known_items: false,
        }
    }

    /// Users liking more than this fraction of what they rate get the
    /// optimistic rating.
    pub fn optimistic_fraction(mut self, optimistic_fraction: f64) -> Self {
        self.optimistic_fraction = optimistic_fraction;
        self
    }

    /// Users liking less than this fraction of what they rate get the
    /// pessimistic rating.
    pub fn pessimistic_fraction(mut self, pessimistic_fraction: f64) -> Self {
        self.pessimistic_fraction = pessimistic_fraction;
        self
    }

    /// Set the optimistic rating.
    pub fn optimistic_rating(mut self, optimistic_rating: Rating) -> Self {
        self.optimistic_rating = optimistic_rating;
        self
    }

    /// Set the pessimistic rating.
    pub fn pessimistic_rating(mut self, pessimistic_rating: Rating) -> Self {
        self.pessimistic_rating = pessimistic_rating;
        self
    }

    /// Set the rating used when no neighbour rated the item.
    pub fn fallback_rating(mut self, fallback_rating: Rating) -> Self {
        self.fallback_rating = fallback_rating;
        self
    }

    /// Set the number of similar users consulted.
    pub fn neighbourhood_size(mut self, neighbourhood_size: usize) -> Self {
        self.neighbourhood_size = neighbourhood_size;
        self
    }

    /// Fail with [`PredictionError::UnknownItem`] for items the store has
    /// never seen, instead of predicting them from the user alone.
    pub fn require_known_items(mut self, require_known_items: bool) -> Self {
        self.require_known_items = require_known_items;
        self
    }

    /// Build a predictor answering from `store`.
    pub fn build(self, store: &RatingStore) -> TieredPredictor<'_> {
        TieredPredictor {
            neighbourhoods: (0..store.num_users()).map(|_| OnceCell::new()).collect(),
            store,
            config: self,
        }
    }
}

/// A predicted rating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prediction {
    /// The predicted rating.
    pub rating: Rating,
    /// The rule that produced it.
    pub tier: Tier,
    /// The neighbour whose rating was borrowed, for [`Tier::Neighbour`].
    pub neighbour: Option<UserId>,
}

impl Prediction {
    fn from_tier(tier: Tier, rating: Rating) -> Self {
        Prediction {
            rating,
            tier,
            neighbour: None,
        }
    }
}

impl Estimate for Prediction {
    fn rating(&self) -> Rating {
        self.rating
    }
    fn source(&self) -> &'static str {
        self.tier.name()
    }
}

/// Tiered predictor over a training store.
#[derive(Debug)]
pub struct TieredPredictor<'a> {
    config: PredictorConfig,
    store: &'a RatingStore,
    neighbourhoods: Vec<OnceCell<Vec<Neighbour>>>,
}

impl<'a> TieredPredictor<'a> {
    /// The store predictions are made from.
    pub fn store(&self) -> &'a RatingStore {
        self.store
    }

    /// The predictor's configuration.
    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// The most similar users of `user_id`, least similar first.
    pub fn neighbours(&self, user_id: UserId) -> Result<&[Neighbour], PredictionError> {
        let user = self.store.user(user_id)?;
        Ok(self.neighbourhood(user))
    }

    /// Compute, in parallel, the neighbourhood of every user who
    /// would need one. Predictions afterwards never compute similarities.
    pub fn precompute_neighbourhoods(&self) {
        let computed: usize = self
            .store
            .users()
            .par_iter()
            .filter(|user| self.needs_neighbours(user))
            .map(|user| {
                self.neighbourhood(user);
                1
            })
            .sum();

        debug!(users = computed, "precomputed neighbourhoods");
    }

    /// Number of users whose neighbourhood has been computed.
    pub fn num_cached_neighbourhoods(&self) -> usize {
        self.neighbourhoods
            .iter()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    fn is_optimist(&self, user: &User) -> bool {
        user.liked_items().len() == user.num_ratings()
            || user.liked_fraction() > self.config.optimistic_fraction
    }

    fn is_pessimist(&self, user: &User) -> bool {
        user.liked_items().is_empty() || user.liked_fraction() < self.config.pessimistic_fraction
    }

    fn needs_neighbours(&self, user: &User) -> bool {
        !self.is_optimist(user) && !self.is_pessimist(user)
    }

    // `user` must come from `self.store`.
    fn neighbourhood(&self, user: &User) -> &[Neighbour] {
        self.neighbourhoods[user.position()].get_or_init(|| {
            most_similar(self.store, user, self.config.neighbourhood_size)
        })
    }

    // `user` must come from `self.store`.
    fn estimate(&self, user: &User, item_id: ItemId) -> Prediction {
        if let Some(rating) = user.rating(item_id) {
            return Prediction::from_tier(Tier::Observed, rating);
        }

        if self.is_optimist(user) {
            return Prediction::from_tier(Tier::Optimistic, self.config.optimistic_rating);
        }

        if self.is_pessimist(user) {
            return Prediction::from_tier(Tier::Pessimistic, self.config.pessimistic_rating);
        }

        for neighbour in self.neighbourhood(user) {
            let other = &self.store.users()[neighbour.position];

            if let Some(rating) = other.rating(item_id) {
                trace!(
                    user = user.id(),
                    item = item_id,
                    neighbour = neighbour.user_id,
                    similarity = neighbour.similarity,
                    "borrowed neighbour rating"
                );
                return Prediction {
                    rating,
                    tier: Tier::Neighbour,
                    neighbour: Some(neighbour.user_id),
                };
            }
        }

        Prediction::from_tier(Tier::Fallback, self.config.fallback_rating)
    }
}

impl<'a> RatingModel for TieredPredictor<'a> {
    type Prediction = Prediction;

    fn predict(&self, user_id: UserId, item_id: ItemId) -> Result<Prediction, PredictionError> {
        let user = self.store.user(user_id)?;

        if self.config.require_known_items {
            self.store.item(item_id)?;
        }

        let prediction = self.estimate(user, item_id);
        trace!(
            user = user_id,
            item = item_id,
            tier = %prediction.tier.name(),
            rating = prediction.rating,
            "predicted"
        );

        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::data::RatingRecord;

    fn store(records: &[(UserId, ItemId, Rating)]) -> RatingStore {
        let mut store = RatingStore::default();
        store
            .load(
                records
                    .iter()
                    .map(|&(user, item, rating)| RatingRecord::new(user, item, rating)),
            )
            .unwrap();
        store
    }

    // User 1 likes half of what they rated, so every prediction for them
    // that isn't a pass-through goes through the neighbourhood.
    fn neighbourhood_store() -> RatingStore {
        store(&[
            (1, 10, 5),
            (1, 20, 5),
            (1, 30, 1),
            (1, 40, 2),
            // similarity 1/3
            (2, 10, 5),
            (2, 50, 3),
            (2, 60, 4),
            // similarity 1
            (3, 10, 4),
            (3, 20, 4),
            (3, 60, 1),
            (3, 70, 2),
            // similarity 0
            (4, 80, 5),
            (4, 90, 5),
        ])
    }

    #[test]
    fn passes_through_known_ratings() {
        let store = neighbourhood_store();
        let predictor = PredictorConfig::new().build(&store);

        for user in store.users() {
            for &item_id in user.items() {
                let prediction = predictor.predict(user.id(), item_id).unwrap();
                assert_eq!(prediction.tier, Tier::Observed);
                assert_eq!(Some(prediction.rating), user.rating(item_id));
            }
        }
    }

    #[test]
    fn users_who_like_everything_get_the_optimistic_rating() {
        let store = store(&[(1, 10, 5), (1, 20, 5), (2, 10, 3), (2, 20, 1), (2, 30, 4)]);
        let predictor = PredictorConfig::new().build(&store);

        let prediction = predictor.predict(1, 30).unwrap();
        assert_eq!(prediction.rating, 4);
        assert_eq!(prediction.tier, Tier::Optimistic);
        assert_eq!(predictor.num_cached_neighbourhoods(), 0);
    }

    #[test]
    fn users_who_like_nothing_get_the_pessimistic_rating() {
        let store = store(&[(1, 10, 3), (1, 20, 1), (2, 30, 5)]);
        let predictor = PredictorConfig::new().build(&store);

        let prediction = predictor.predict(1, 30).unwrap();
        assert_eq!(prediction.rating, 2);
        assert_eq!(prediction.tier, Tier::Pessimistic);
    }

    #[test]
    fn fractions_are_strict_thresholds() {
        // 4 of 5 liked: exactly 0.8 is not above the optimistic fraction.
        let store = store(&[
            (1, 10, 5),
            (1, 20, 5),
            (1, 30, 5),
            (1, 40, 5),
            (1, 50, 1),
            (2, 60, 5),
        ]);

        let prediction = PredictorConfig::new().build(&store).predict(1, 60).unwrap();
        assert_eq!(prediction.tier, Tier::Neighbour);

        let prediction = PredictorConfig::new()
            .optimistic_fraction(0.75)
            .optimistic_rating(5)
            .build(&store)
            .predict(1, 60)
            .unwrap();
        assert_eq!(prediction.tier, Tier::Optimistic);
        assert_eq!(prediction.rating, 5);
    }

    #[test]
    fn borrows_the_first_neighbour_rating_in_scan_order() {
        let store = neighbourhood_store();
        let predictor = PredictorConfig::new().build(&store);

        let neighbours: Vec<_> = predictor
            .neighbours(1)
            .unwrap()
            .iter()
            .map(|x| x.user_id)
            .collect();
        assert_eq!(neighbours, vec![4, 2, 3]);

        // Only user 2 rated 50.
        let prediction = predictor.predict(1, 50).unwrap();
        assert_eq!(prediction.rating, 3);
        assert_eq!(prediction.tier, Tier::Neighbour);
        assert_eq!(prediction.neighbour, Some(2));

        // Users 2 and 3 rated 60; user 2 comes first in the scan.
        let prediction = predictor.predict(1, 60).unwrap();
        assert_eq!(prediction.rating, 4);
        assert_eq!(prediction.neighbour, Some(2));

        // Only user 4, the least similar, rated 90.
        let prediction = predictor.predict(1, 90).unwrap();
        assert_eq!(prediction.rating, 5);
        assert_eq!(prediction.neighbour, Some(4));
    }

    #[test]
    fn neighbourhood_size_limits_the_scan() {
        let store = neighbourhood_store();
        let predictor = PredictorConfig::new()
            .neighbourhood_size(1)
            .fallback_rating(3)
            .build(&store);

        assert_eq!(predictor.neighbours(1).unwrap().len(), 1);

        let prediction = predictor.predict(1, 50).unwrap();
        assert_eq!(prediction.tier, Tier::Fallback);
        assert_eq!(prediction.rating, 3);

        let prediction = predictor.predict(1, 70).unwrap();
        assert_eq!(prediction.rating, 2);
        assert_eq!(prediction.neighbour, Some(3));
    }

    #[test]
    fn unknown_ids_fail() {
        let store = neighbourhood_store();
        let predictor = PredictorConfig::new().build(&store);

        assert_eq!(
            predictor.predict(99, 10).unwrap_err(),
            PredictionError::UnknownUser(99)
        );
        assert!(predictor.neighbours(99).is_err());

        let strict = PredictorConfig::new().require_known_items(true).build(&store);
        assert_eq!(
            strict.predict(1, 999).unwrap_err(),
            PredictionError::UnknownItem(999)
        );
    }

    #[test]
    fn unseen_items_are_predicted_from_the_user() {
        let store = store(&[(1, 10, 5), (1, 20, 5), (2, 10, 3), (2, 20, 1)]);
        let predictor = PredictorConfig::new().build(&store);

        let prediction = predictor.predict(1, 30).unwrap();
        assert_eq!(prediction.rating, 4);
        assert_eq!(prediction.tier, Tier::Optimistic);

        let prediction = predictor.predict(2, 30).unwrap();
        assert_eq!(prediction.rating, 2);
        assert_eq!(prediction.tier, Tier::Pessimistic);

        // Nobody in the neighbourhood can have rated an unseen item.
        let store = neighbourhood_store();
        let prediction = PredictorConfig::new().build(&store).predict(1, 999).unwrap();
        assert_eq!(prediction.tier, Tier::Fallback);
        assert_eq!(prediction.rating, 4);
    }

    #[test]
    fn predictions_are_deterministic() {
        let store = neighbourhood_store();
        let predictor = PredictorConfig::new().build(&store);

        let first: Vec<_> = store
            .items()
            .iter()
            .map(|item| predictor.predict(1, item.id()).unwrap())
            .collect();
        let second: Vec<_> = store
            .items()
            .iter()
            .map(|item| predictor.predict(1, item.id()).unwrap())
            .collect();

        assert_eq!(first, second);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn every_tier_decision_is_traced() {
        let store = store(&[(1, 10, 5), (1, 20, 1), (2, 10, 2), (2, 40, 1), (3, 10, 5)]);
        let predictor = PredictorConfig::new().build(&store);

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let tiers: Vec<_> = tracing::subscriber::with_default(subscriber, || {
            [(1, 10), (3, 20), (2, 20), (1, 40), (1, 30)]
                .iter()
                .map(|&(user_id, item_id)| predictor.predict(user_id, item_id).unwrap().tier)
                .collect()
        });
        assert_eq!(
            tiers,
            vec![
                Tier::Observed,
                Tier::Optimistic,
                Tier::Pessimistic,
                Tier::Neighbour,
                Tier::Fallback
            ]
        );

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        for tier in &tiers {
            assert!(
                output.contains(&format!("tier={}", tier.name())),
                "no trace for {:?} in {}",
                tier,
                output
            );
        }
    }

    #[test]
    fn precompute_only_fills_the_middle_band() {
        let store = neighbourhood_store();
        let predictor = PredictorConfig::new().build(&store);

        predictor.precompute_neighbourhoods();

        // Everybody but user 4, who likes everything.
        assert_eq!(predictor.num_cached_neighbourhoods(), 3);
        assert_eq!(predictor.predict(1, 50).unwrap().neighbour, Some(2));
    }
}
