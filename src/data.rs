//! Rating records: parsing, writing and splitting.
//!
//! The input format is one rating per line, whitespace separated:
//! ```text
//! <user_id> <item_id> <rating> [ignored columns...]
//! ```
//! which covers both hand-written fixtures and the tab-separated
//! Movielens `u.data`-style files (the trailing timestamp is ignored).
use std::hash::Hasher;
use std::io::{BufRead, Write};

use rand::seq::SliceRandom;
use rand::Rng;

use siphasher::sip::SipHasher;

use super::{ItemId, Rating, UserId};

/// A single observed rating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRecord {
    /// Who rated.
    pub user_id: UserId,
    /// What was rated.
    pub item_id: ItemId,
    /// The rating given.
    pub rating: Rating,
}

impl RatingRecord {
    /// Build a new record.
    pub fn new(user_id: UserId, item_id: ItemId, rating: Rating) -> Self {
        RatingRecord {
            user_id,
            item_id,
            rating,
        }
    }
}

/// The range of valid ratings and the threshold at which
/// a rating counts as the user liking the item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingScale {
    /// Lowest valid rating.
    pub min: Rating,
    /// Highest valid rating.
    pub max: Rating,
    /// Ratings at or above this value are likes.
    pub like_threshold: Rating,
}

impl Default for RatingScale {
    fn default() -> Self {
        RatingScale {
            min: 1,
            max: 5,
            like_threshold: 4,
        }
    }
}

impl RatingScale {
    /// Build a new scale. Fails unless `min <= like_threshold <= max`.
    pub fn new(min: Rating, max: Rating, like_threshold: Rating) -> Result<Self, DataError> {
        if min > like_threshold || like_threshold > max {
            return Err(DataError::InvalidScale {
                min,
                max,
                like_threshold,
            });
        }

        Ok(RatingScale {
            min,
            max,
            like_threshold,
        })
    }

    /// Whether `rating` lies within the scale.
    pub fn contains(&self, rating: i64) -> bool {
        rating >= i64::from(self.min) && rating <= i64::from(self.max)
    }

    /// Whether `rating` counts as a like.
    pub fn likes(&self, rating: Rating) -> bool {
        rating >= self.like_threshold
    }
}

/// What to do with records that cannot be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MalformedPolicy {
    /// Abort loading on the first bad record.
    Reject,
    /// Log the bad record and carry on.
    Skip,
}

impl Default for MalformedPolicy {
    fn default() -> Self {
        MalformedPolicy::Reject
    }
}

/// Data error types.
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
pub enum DataError {
    /// An input line could not be turned into a rating record.
    #[fail(display = "Malformed record on line {}: {} ({:?})", line, reason, content)]
    MalformedRecord {
        /// One-based line number.
        line: usize,
        /// The offending line.
        content: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A rating outside the store's scale.
    #[fail(
        display = "Rating {} by user {} for item {} is outside {}..={}",
        rating, user_id, item_id, min, max
    )]
    RatingOutOfRange {
        /// Who rated.
        user_id: UserId,
        /// What was rated.
        item_id: ItemId,
        /// The rejected rating.
        rating: Rating,
        /// Lowest valid rating.
        min: Rating,
        /// Highest valid rating.
        max: Rating,
    },
    /// The user already rated the item.
    #[fail(display = "User {} already rated item {}", user_id, item_id)]
    DuplicateRating {
        /// Who rated.
        user_id: UserId,
        /// What was rated.
        item_id: ItemId,
    },
    /// Scale bounds out of order.
    #[fail(
        display = "Invalid rating scale: min {}, like threshold {}, max {}",
        min, like_threshold, max
    )]
    InvalidScale {
        /// Lowest valid rating.
        min: Rating,
        /// Highest valid rating.
        max: Rating,
        /// Like threshold.
        like_threshold: Rating,
    },
}

impl DataError {
    /// Attach a line number and content to an error raised while
    /// storing a parsed record.
    pub fn at_line(self, line: usize, content: &str) -> DataError {
        match self {
            DataError::MalformedRecord { .. } => self,
            other => DataError::MalformedRecord {
                line,
                content: content.to_owned(),
                reason: other.to_string(),
            },
        }
    }
}

fn malformed(line: usize, content: &str, reason: String) -> DataError {
    DataError::MalformedRecord {
        line,
        content: content.to_owned(),
        reason,
    }
}

/// Parse a single line. Blank lines yield `Ok(None)`.
///
/// `line` is the one-based line number, used in diagnostics.
pub fn parse_line(
    line: usize,
    content: &str,
    scale: &RatingScale,
) -> Result<Option<RatingRecord>, DataError> {
    let mut fields = content.split_whitespace();

    let user_field = match fields.next() {
        Some(field) => field,
        None => return Ok(None),
    };
    let (item_field, rating_field) = match (fields.next(), fields.next()) {
        (Some(item), Some(rating)) => (item, rating),
        _ => {
            return Err(malformed(
                line,
                content,
                "expected three fields: user, item, rating".to_owned(),
            ))
        }
    };

    let user_id = user_field
        .parse::<UserId>()
        .map_err(|e| malformed(line, content, format!("user id {:?}: {}", user_field, e)))?;
    let item_id = item_field
        .parse::<ItemId>()
        .map_err(|e| malformed(line, content, format!("item id {:?}: {}", item_field, e)))?;
    let rating = rating_field
        .parse::<i64>()
        .map_err(|e| malformed(line, content, format!("rating {:?}: {}", rating_field, e)))?;

    if !scale.contains(rating) {
        return Err(malformed(
            line,
            content,
            format!("rating {} outside {}..={}", rating, scale.min, scale.max),
        ));
    }

    Ok(Some(RatingRecord::new(user_id, item_id, rating as Rating)))
}

/// Records read from a stream, plus the errors for
/// the lines that were skipped.
#[derive(Debug, Default)]
pub struct ParsedRecords {
    /// Records, in input order.
    pub records: Vec<RatingRecord>,
    /// Skipped lines. Always empty under [`MalformedPolicy::Reject`].
    pub skipped: Vec<DataError>,
}

/// Visit every parsed record of `reader`, applying `policy` to lines that
/// fail to parse or that `visit` rejects.
pub(crate) fn for_each_record<R, F>(
    reader: R,
    scale: &RatingScale,
    policy: MalformedPolicy,
    mut visit: F,
) -> Result<Vec<DataError>, failure::Error>
where
    R: BufRead,
    F: FnMut(RatingRecord) -> Result<(), DataError>,
{
    let mut skipped = Vec::new();

    for (idx, line) in reader.split(b'\n').enumerate() {
        let line_number = idx + 1;
        let bytes = line?;

        let outcome = match std::str::from_utf8(&bytes) {
            Ok(content) => {
                let content = content.trim_end_matches('\r');
                parse_line(line_number, content, scale).and_then(|record| match record {
                    Some(record) => visit(record).map_err(|e| e.at_line(line_number, content)),
                    None => Ok(()),
                })
            }
            Err(e) => Err(malformed(
                line_number,
                &String::from_utf8_lossy(&bytes),
                format!("not valid UTF-8: {}", e),
            )),
        };

        if let Err(error) = outcome {
            match policy {
                MalformedPolicy::Reject => return Err(error.into()),
                MalformedPolicy::Skip => {
                    warn!(line = line_number, %error, "skipping record");
                    skipped.push(error);
                }
            }
        }
    }

    Ok(skipped)
}

/// Read all records from `reader`.
pub fn read_records<R: BufRead>(
    reader: R,
    scale: &RatingScale,
    policy: MalformedPolicy,
) -> Result<ParsedRecords, failure::Error> {
    let mut records = Vec::new();
    let skipped = for_each_record(reader, scale, policy, |record| {
        records.push(record);
        Ok(())
    })?;

    Ok(ParsedRecords { records, skipped })
}

/// Write records as tab-separated `user item rating` lines, the
/// layout the Movielens split files use.
pub fn write_records<W: Write>(writer: W, records: &[RatingRecord]) -> Result<(), failure::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(writer);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

/// Randomly split records into a `(train, test)` pair, with
/// roughly `test_fraction` of them going into the test set.
pub fn train_test_split<R: Rng>(
    records: &mut Vec<RatingRecord>,
    rng: &mut R,
    test_fraction: f32,
) -> (Vec<RatingRecord>, Vec<RatingRecord>) {
    records.shuffle(rng);

    let idx = (test_fraction * records.len() as f32) as usize;
    let (test, train) = records.split_at(idx.min(records.len()));

    (train.to_vec(), test.to_vec())
}

/// Split records into a `(train, test)` pair by hashing the user id:
/// all ratings of a given user end up on the same side.
pub fn user_based_split<R: Rng>(
    records: &[RatingRecord],
    rng: &mut R,
    test_fraction: f32,
) -> (Vec<RatingRecord>, Vec<RatingRecord>) {
    let denominator = 100_000;
    let train_cutoff = (test_fraction * denominator as f32) as u64;

    let (key_0, key_1) = (rng.gen::<u64>(), rng.gen::<u64>());

    let is_train = |x: &RatingRecord| {
        let mut hasher = SipHasher::new_with_keys(key_0, key_1);
        hasher.write_u32(x.user_id);
        hasher.finish() % denominator >= train_cutoff
    };

    records.iter().partition(|x| is_train(*x))
}
