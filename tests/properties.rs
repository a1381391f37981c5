//! Property-based tests for the store, similarity and prediction invariants.

extern crate likesim;
extern crate proptest;

use std::collections::HashSet;

use likesim::data::RatingRecord;
use likesim::evaluation::{absolute_error_stdev, mean_absolute_error};
use likesim::models::tiered::PredictorConfig;
use likesim::models::Tier;
use likesim::similarity::{most_similar, similarity};
use likesim::store::RatingStore;
use likesim::RatingModel;
use proptest::prelude::*;

/// Random ratings with at most one rating per (user, item) pair.
fn ratings() -> impl Strategy<Value = Vec<RatingRecord>> {
    prop::collection::vec((0u32..20, 0u32..30, 1u8..=5), 1..200).prop_map(|raw| {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter(|&(user, item, _)| seen.insert((user, item)))
            .map(|(user, item, rating)| RatingRecord::new(user, item, rating))
            .collect()
    })
}

fn store(records: &[RatingRecord]) -> RatingStore {
    let mut store = RatingStore::default();
    store.load(records.iter().cloned()).unwrap();
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_every_rating_is_counted_once(records in ratings()) {
        let store = store(&records);

        let item_total: usize = store.items().iter().map(|x| x.num_ratings()).sum();
        let user_total: usize = store.users().iter().map(|x| x.num_ratings()).sum();

        prop_assert_eq!(item_total, records.len());
        prop_assert_eq!(user_total, records.len());
        prop_assert_eq!(store.num_ratings(), records.len());

        for item in store.items() {
            prop_assert_eq!(item.ratings().len(), item.rated_by().len());
        }
        for user in store.users() {
            prop_assert!(user.liked_items().iter().all(|x| user.rating(*x).is_some()));
        }
    }

    #[test]
    fn prop_similarity_is_symmetric_and_bounded(records in ratings()) {
        let store = store(&records);

        for a in store.users() {
            for b in store.users() {
                match (similarity(a, b), similarity(b, a)) {
                    (Ok(ab), Ok(ba)) => {
                        prop_assert_eq!(ab, ba);
                        prop_assert!(ab >= 0.0 && ab <= 1.0);
                    }
                    (Err(_), Err(_)) => {
                        prop_assert!(a.liked_items().is_empty() && b.liked_items().is_empty());
                    }
                    _ => prop_assert!(false, "asymmetric definedness"),
                }
            }

            if !a.liked_items().is_empty() {
                prop_assert_eq!(similarity(a, a).unwrap(), 1.0);
            }
        }
    }

    #[test]
    fn prop_most_similar_excludes_self(records in ratings(), k in 0usize..15) {
        let store = store(&records);

        for user in store.users() {
            let neighbours = most_similar(&store, user, k);

            prop_assert!(neighbours.len() <= k);
            prop_assert!(neighbours.iter().all(|x| x.user_id != user.id()));
            prop_assert!(neighbours.iter().all(|x| x.similarity.is_finite()));
            prop_assert!(neighbours.windows(2).all(|x| x[0].similarity <= x[1].similarity));
        }
    }

    #[test]
    fn prop_known_ratings_pass_through(records in ratings()) {
        let store = store(&records);
        let predictor = PredictorConfig::new().build(&store);

        for record in &records {
            let prediction = predictor.predict(record.user_id, record.item_id).unwrap();
            prop_assert_eq!(prediction.rating, record.rating);
            prop_assert_eq!(prediction.tier, Tier::Observed);
        }
    }

    #[test]
    fn prop_predictions_are_deterministic(records in ratings(), item_id in 0u32..40) {
        let store = store(&records);
        let predictor = PredictorConfig::new().build(&store);

        for user in store.users() {
            let first = predictor.predict(user.id(), item_id).unwrap();
            let second = predictor.predict(user.id(), item_id).unwrap();
            prop_assert_eq!(first, second);

            let fresh = PredictorConfig::new().build(&store).predict(user.id(), item_id).unwrap();
            prop_assert_eq!(first, fresh);
        }
    }

    #[test]
    fn prop_error_statistics_are_non_negative(
        differences in prop::collection::vec(-4.0..4.0f64, 2..100)
    ) {
        prop_assert!(mean_absolute_error(&differences).unwrap() >= 0.0);
        prop_assert!(absolute_error_stdev(&differences).unwrap() >= 0.0);
    }
}
