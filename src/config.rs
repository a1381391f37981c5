//! Run configuration, readable from JSON.
//!
//! Every field is optional; missing fields take their defaults:
//! ```json
//! {
//!     "scale": { "min": 1, "max": 5, "like_threshold": 4 },
//!     "malformed": "Reject",
//!     "predictor": { "neighbourhood_size": 10, "optimistic_fraction": 0.8 },
//!     "evaluation": { "num_threads": 4, "limit": null }
//! }
//! ```
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::data::{MalformedPolicy, RatingScale};
use super::evaluation::EvaluationConfig;
use super::models::tiered::PredictorConfig;

/// Everything a load-predict-evaluate run needs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Valid ratings and the like threshold.
    pub scale: RatingScale,
    /// What to do with bad input lines.
    pub malformed: MalformedPolicy,
    /// Prediction policy.
    pub predictor: PredictorConfig,
    /// Evaluation settings.
    pub evaluation: EvaluationConfig,
}

impl Config {
    /// Read a configuration from JSON.
    pub fn from_reader<R: Read>(reader: R) -> Result<Config, failure::Error> {
        let config: Config = serde_json::from_reader(reader)?;
        let scale = config.scale;

        // Re-validate: deserialization bypasses `RatingScale::new`.
        RatingScale::new(scale.min, scale.max, scale.like_threshold)?;

        Ok(config)
    }

    /// Read a configuration from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, failure::Error> {
        let file = File::open(path.as_ref())
            .map_err(|e| format_err!("Cannot open {}: {}", path.as_ref().display(), e))?;

        Config::from_reader(BufReader::new(file))
    }
}
