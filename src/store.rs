//! In-memory store of users, items and the ratings connecting them.
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::data::{for_each_record, DataError, MalformedPolicy, RatingRecord, RatingScale};
use super::{ItemId, PredictionError, Rating, UserId};

/// A user and everything they rated.
#[derive(Debug, Clone)]
pub struct User {
    id: UserId,
    position: usize,
    ratings: HashMap<ItemId, Rating>,
    items: Vec<ItemId>,
    liked: Vec<ItemId>,
    liked_set: HashSet<ItemId>,
}

impl User {
    fn new(id: UserId, position: usize) -> Self {
        User {
            id,
            position,
            ratings: HashMap::new(),
            items: Vec::new(),
            liked: Vec::new(),
            liked_set: HashSet::new(),
        }
    }

    fn add_rating(&mut self, item_id: ItemId, rating: Rating, liked: bool) {
        self.ratings.insert(item_id, rating);
        self.items.push(item_id);

        if liked {
            self.liked.push(item_id);
            self.liked_set.insert(item_id);
        }
    }

    /// The user's identifier.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Position of the user in its store's [`RatingStore::users`].
    pub fn position(&self) -> usize {
        self.position
    }

    /// The rating this user gave `item_id`, if any.
    pub fn rating(&self, item_id: ItemId) -> Option<Rating> {
        self.ratings.get(&item_id).cloned()
    }

    /// Items rated, in the order the ratings were loaded.
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    /// Items liked, in the order the ratings were loaded.
    pub fn liked_items(&self) -> &[ItemId] {
        &self.liked
    }

    /// Whether the user liked `item_id`.
    pub fn likes(&self, item_id: ItemId) -> bool {
        self.liked_set.contains(&item_id)
    }

    /// Number of items rated.
    pub fn num_ratings(&self) -> usize {
        self.items.len()
    }

    /// Fraction of rated items that were liked.
    pub fn liked_fraction(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }

        self.liked.len() as f64 / self.items.len() as f64
    }
}

/// An item and the ratings it received.
///
/// `ratings()` and `rated_by()` are index-aligned: position `i`
/// of both describes the same rating event.
#[derive(Debug, Clone)]
pub struct Item {
    id: ItemId,
    ratings: Vec<Rating>,
    rated_by: Vec<UserId>,
}

impl Item {
    fn new(id: ItemId) -> Self {
        Item {
            id,
            ratings: Vec::new(),
            rated_by: Vec::new(),
        }
    }

    fn add_rating(&mut self, user_id: UserId, rating: Rating) {
        self.ratings.push(rating);
        self.rated_by.push(user_id);
    }

    /// The item's identifier.
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Ratings received, in load order.
    pub fn ratings(&self) -> &[Rating] {
        &self.ratings
    }

    /// Users who rated the item, in load order.
    pub fn rated_by(&self) -> &[UserId] {
        &self.rated_by
    }

    /// Number of ratings received.
    pub fn num_ratings(&self) -> usize {
        self.ratings.len()
    }
}

/// Summary of loading a store from a stream.
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// Records that made it into the store.
    pub loaded: usize,
    /// Records skipped under [`MalformedPolicy::Skip`].
    pub skipped: Vec<DataError>,
}

/// All users and items of one dataset partition.
#[derive(Debug, Clone)]
pub struct RatingStore {
    scale: RatingScale,
    users: Vec<User>,
    items: Vec<Item>,
    user_positions: HashMap<UserId, usize>,
    item_positions: HashMap<ItemId, usize>,
    num_ratings: usize,
}

impl Default for RatingStore {
    fn default() -> Self {
        RatingStore::new(RatingScale::default())
    }
}

impl RatingStore {
    /// Create an empty store accepting ratings on `scale`.
    pub fn new(scale: RatingScale) -> Self {
        RatingStore {
            scale,
            users: Vec::new(),
            items: Vec::new(),
            user_positions: HashMap::new(),
            item_positions: HashMap::new(),
            num_ratings: 0,
        }
    }

    /// Read a store from whitespace-separated `user item rating` lines.
    pub fn read<R: std::io::BufRead>(
        reader: R,
        scale: RatingScale,
        policy: MalformedPolicy,
    ) -> Result<(RatingStore, LoadSummary), failure::Error> {
        let mut store = RatingStore::new(scale);
        let mut loaded = 0;

        let skipped = for_each_record(reader, &scale, policy, |record| {
            store.insert(record)?;
            loaded += 1;
            Ok(())
        })?;

        debug!(
            users = store.num_users(),
            items = store.num_items(),
            loaded,
            skipped = skipped.len(),
            "loaded ratings"
        );

        Ok((store, LoadSummary { loaded, skipped }))
    }

    /// Read a store from a file. See [`RatingStore::read`].
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        scale: RatingScale,
        policy: MalformedPolicy,
    ) -> Result<(RatingStore, LoadSummary), failure::Error> {
        let file = File::open(path.as_ref())
            .map_err(|e| format_err!("Cannot open {}: {}", path.as_ref().display(), e))?;

        RatingStore::read(BufReader::new(file), scale, policy)
    }

    /// Add a single rating, creating the user and the item on
    /// first sight.
    ///
    /// The store is left untouched if the rating is out of range
    /// or the user already rated the item.
    pub fn insert(&mut self, record: RatingRecord) -> Result<(), DataError> {
        let RatingRecord {
            user_id,
            item_id,
            rating,
        } = record;

        if !self.scale.contains(i64::from(rating)) {
            return Err(DataError::RatingOutOfRange {
                user_id,
                item_id,
                rating,
                min: self.scale.min,
                max: self.scale.max,
            });
        }

        if let Some(&position) = self.user_positions.get(&user_id) {
            if self.users[position].rating(item_id).is_some() {
                return Err(DataError::DuplicateRating { user_id, item_id });
            }
        }

        let liked = self.scale.likes(rating);

        let user_position = match self.user_positions.get(&user_id) {
            Some(&position) => position,
            None => {
                let position = self.users.len();
                self.users.push(User::new(user_id, position));
                self.user_positions.insert(user_id, position);
                position
            }
        };
        self.users[user_position].add_rating(item_id, rating, liked);

        let item_position = match self.item_positions.get(&item_id) {
            Some(&position) => position,
            None => {
                let position = self.items.len();
                self.items.push(Item::new(item_id));
                self.item_positions.insert(item_id, position);
                position
            }
        };
        self.items[item_position].add_rating(user_id, rating);

        self.num_ratings += 1;

        Ok(())
    }

    /// Add every record, stopping at the first one that cannot be stored.
    /// Returns the number of records added.
    pub fn load<I>(&mut self, records: I) -> Result<usize, DataError>
    where
        I: IntoIterator<Item = RatingRecord>,
    {
        let mut loaded = 0;

        for record in records {
            self.insert(record)?;
            loaded += 1;
        }

        Ok(loaded)
    }

    /// The scale ratings are validated against.
    pub fn scale(&self) -> &RatingScale {
        &self.scale
    }

    /// Look up a user.
    pub fn user(&self, user_id: UserId) -> Result<&User, PredictionError> {
        self.user_positions
            .get(&user_id)
            .map(|&position| &self.users[position])
            .ok_or(PredictionError::UnknownUser(user_id))
    }

    /// Look up an item.
    pub fn item(&self, item_id: ItemId) -> Result<&Item, PredictionError> {
        self.item_positions
            .get(&item_id)
            .map(|&position| &self.items[position])
            .ok_or(PredictionError::UnknownItem(item_id))
    }

    /// All users, in order of first appearance.
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// All items, in order of first appearance.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Number of ratings stored.
    pub fn num_ratings(&self) -> usize {
        self.num_ratings
    }

    /// How many ratings `item_id` received.
    pub fn popularity(&self, item_id: ItemId) -> Result<usize, PredictionError> {
        self.item(item_id).map(Item::num_ratings)
    }

    /// The `n` items with the most ratings, most popular first.
    /// Ties keep their load order.
    pub fn most_popular(&self, n: usize) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items.iter().collect();
        items.sort_by(|a, b| b.num_ratings().cmp(&a.num_ratings()));
        items.truncate(n);

        items
    }
}
