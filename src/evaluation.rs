//! Accuracy of rating predictions on held-out data.
use std::collections::BTreeMap;
use std::io::Write;

use rayon::prelude::*;

use super::store::RatingStore;
use super::{Estimate, ItemId, PredictionError, Rating, RatingModel, UserId};

/// One evaluated `(user, item)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Who rated.
    pub user_id: UserId,
    /// What was rated.
    pub item_id: ItemId,
    /// The held-out rating.
    pub actual: Rating,
    /// The model's prediction.
    pub predicted: Rating,
}

impl PredictionRecord {
    /// Signed error, `predicted - actual`.
    pub fn difference(&self) -> i32 {
        i32::from(self.predicted) - i32::from(self.actual)
    }
}

/// A pair the model could not predict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SkippedPair {
    /// Who rated.
    pub user_id: UserId,
    /// What was rated.
    pub item_id: ItemId,
    /// Why the prediction failed.
    pub error: PredictionError,
}

/// Statistics error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Fail)]
pub enum StatisticsError {
    /// There are no differences to aggregate.
    #[fail(display = "Cannot compute statistics over zero predictions.")]
    EmptyDifferenceSet,
    /// The sample standard deviation needs at least two differences.
    #[fail(display = "Need at least 2 predictions for a sample deviation, got {}.", _0)]
    InsufficientSamples(usize),
}

/// Mean of the absolute differences.
pub fn mean_absolute_error(differences: &[f64]) -> Result<f64, StatisticsError> {
    if differences.is_empty() {
        return Err(StatisticsError::EmptyDifferenceSet);
    }

    Ok(differences.iter().map(|x| x.abs()).sum::<f64>() / differences.len() as f64)
}

/// Sample (`n - 1`) standard deviation of the absolute differences.
pub fn absolute_error_stdev(differences: &[f64]) -> Result<f64, StatisticsError> {
    let mean = mean_absolute_error(differences)?;

    if differences.len() < 2 {
        return Err(StatisticsError::InsufficientSamples(differences.len()));
    }

    let squares: f64 = differences
        .iter()
        .map(|x| (x.abs() - mean).powi(2))
        .sum();

    Ok((squares / (differences.len() - 1) as f64).sqrt())
}

/// Mean of the squared differences.
pub fn mean_squared_error(differences: &[f64]) -> Result<f64, StatisticsError> {
    if differences.is_empty() {
        return Err(StatisticsError::EmptyDifferenceSet);
    }

    Ok(differences.iter().map(|x| x * x).sum::<f64>() / differences.len() as f64)
}

/// Aggregate prediction error.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    /// Number of differences aggregated.
    pub count: usize,
    /// Mean absolute error.
    pub mean: f64,
    /// Sample standard deviation of the absolute error. `None` with
    /// fewer than two differences.
    pub stdev: Option<f64>,
    /// Mean squared error.
    pub mse: f64,
}

impl ErrorStatistics {
    /// Compute all statistics. Fails only when there are no differences;
    /// a single difference leaves `stdev` unset.
    pub fn from_differences(differences: &[f64]) -> Result<Self, StatisticsError> {
        let stdev = match absolute_error_stdev(differences) {
            Ok(stdev) => Some(stdev),
            Err(StatisticsError::InsufficientSamples(_)) => None,
            Err(error) => return Err(error),
        };

        Ok(ErrorStatistics {
            count: differences.len(),
            mean: mean_absolute_error(differences)?,
            stdev,
            mse: mean_squared_error(differences)?,
        })
    }

    /// Sample standard deviation of the absolute error.
    pub fn sample_stdev(&self) -> Result<f64, StatisticsError> {
        self.stdev.ok_or(StatisticsError::InsufficientSamples(self.count))
    }

    /// Root mean squared error.
    pub fn rmse(&self) -> f64 {
        self.mse.sqrt()
    }
}

/// Evaluation settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Threads to predict with; rayon's global pool when unset.
    pub num_threads: Option<usize>,
    /// Stop after this many pairs.
    pub limit: Option<usize>,
}

impl EvaluationConfig {
    /// Set the number of threads.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Evaluate at most `limit` pairs.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Summary of an evaluation, in a form suitable for serialization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Number of pairs predicted.
    pub predicted: usize,
    /// Number of pairs skipped.
    pub skipped: usize,
    /// Statistics, if anything was predicted.
    pub statistics: Option<ErrorStatistics>,
    /// Root mean squared error, if anything was predicted.
    pub rmse: Option<f64>,
    /// Predictions per rule of the model.
    pub sources: BTreeMap<String, usize>,
}

/// The outcome of evaluating a model against a test store.
///
/// Statistics are computed once, when the evaluation is built.
#[derive(Debug)]
pub struct Evaluation {
    records: Vec<PredictionRecord>,
    skipped: Vec<SkippedPair>,
    sources: BTreeMap<&'static str, usize>,
    statistics: Result<ErrorStatistics, StatisticsError>,
}

impl Evaluation {
    fn new(
        records: Vec<PredictionRecord>,
        skipped: Vec<SkippedPair>,
        sources: BTreeMap<&'static str, usize>,
    ) -> Self {
        let differences: Vec<f64> = records.iter().map(|x| f64::from(x.difference())).collect();
        let statistics = ErrorStatistics::from_differences(&differences);

        Evaluation {
            records,
            skipped,
            sources,
            statistics,
        }
    }

    /// Every prediction, ordered by test item and then by the order
    /// in which the item's ratings were loaded.
    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    /// Pairs the model failed to predict.
    pub fn skipped(&self) -> &[SkippedPair] {
        &self.skipped
    }

    /// How many predictions each rule of the model produced.
    pub fn sources(&self) -> &BTreeMap<&'static str, usize> {
        &self.sources
    }

    /// Aggregate error statistics.
    pub fn statistics(&self) -> Result<&ErrorStatistics, StatisticsError> {
        self.statistics.as_ref().map_err(|e| *e)
    }

    /// Serializable summary.
    pub fn report(&self) -> EvaluationReport {
        let statistics = self.statistics.ok();

        EvaluationReport {
            predicted: self.records.len(),
            skipped: self.skipped.len(),
            statistics,
            rmse: statistics.map(|x| x.rmse()),
            sources: self
                .sources
                .iter()
                .map(|(&source, &count)| (source.to_owned(), count))
                .collect(),
        }
    }

    /// Write a plain-text summary: mean and sample deviation of the
    /// absolute error on one line each, then `rmse`, then how many input
    /// lines (`malformed`) and pairs were skipped, if any.
    ///
    /// Statistics that cannot be computed are written as such; the skip
    /// counts are written regardless.
    pub fn write_summary<W: Write>(
        &self,
        mut writer: W,
        malformed: usize,
    ) -> Result<(), failure::Error> {
        match self.statistics {
            Ok(ref statistics) => {
                writeln!(writer, "{}", statistics.mean)?;
                match statistics.sample_stdev() {
                    Ok(stdev) => writeln!(writer, "{}", stdev)?,
                    Err(error) => writeln!(writer, "stdev unavailable: {}", error)?,
                }
                writeln!(writer, "rmse {}", statistics.rmse())?;
            }
            Err(error) => writeln!(writer, "statistics unavailable: {}", error)?,
        }

        if malformed > 0 || !self.skipped.is_empty() {
            writeln!(
                writer,
                "skipped {} malformed lines and {} unpredictable ratings",
                malformed,
                self.skipped.len()
            )?;
        }

        Ok(())
    }

    /// Write all records as CSV, with a header row.
    pub fn write_records<W: Write>(&self, writer: W) -> Result<(), failure::Error> {
        let mut writer = csv::Writer::from_writer(writer);

        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        Ok(())
    }
}

/// Predict every rating of `test` with `model` and compare.
///
/// Pairs the model cannot predict (e.g. users absent from the model's
/// training data) are recorded in [`Evaluation::skipped`] and left out
/// of the statistics.
pub fn evaluate<T: RatingModel + Sync>(
    model: &T,
    test: &RatingStore,
    config: &EvaluationConfig,
) -> Result<Evaluation, failure::Error> {
    let mut pairs: Vec<(UserId, ItemId, Rating)> = test
        .items()
        .iter()
        .flat_map(|item| {
            izip!(item.rated_by(), item.ratings())
                .map(move |(&user_id, &rating)| (user_id, item.id(), rating))
        })
        .collect();

    if let Some(limit) = config.limit {
        pairs.truncate(limit);
    }

    let predict = || -> Vec<(UserId, ItemId, Rating, Result<T::Prediction, PredictionError>)> {
        pairs
            .par_iter()
            .map(|&(user_id, item_id, actual)| {
                (user_id, item_id, actual, model.predict(user_id, item_id))
            })
            .collect()
    };

    let outcomes = match config.num_threads {
        Some(num_threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?
            .install(predict),
        None => predict(),
    };

    let mut records = Vec::with_capacity(outcomes.len());
    let mut skipped = Vec::new();
    let mut sources = BTreeMap::new();

    for (user_id, item_id, actual, outcome) in outcomes {
        match outcome {
            Ok(prediction) => {
                *sources.entry(prediction.source()).or_insert(0) += 1;
                records.push(PredictionRecord {
                    user_id,
                    item_id,
                    actual,
                    predicted: prediction.rating(),
                });
            }
            Err(error) => {
                warn!(user = user_id, item = item_id, %error, "skipping pair");
                skipped.push(SkippedPair {
                    user_id,
                    item_id,
                    error,
                });
            }
        }
    }

    debug!(
        predicted = records.len(),
        skipped = skipped.len(),
        "evaluation finished"
    );

    Ok(Evaluation::new(records, skipped, sources))
}
