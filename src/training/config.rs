use std::{fs, num::NonZeroUsize, path::Path};

use serde::{Deserialize, Serialize};

use crate::{NetErr, Result};

const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(32).unwrap();

/// The knobs of a training run.
///
/// Every field is optional in the JSON representation, missing ones take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperParameters {
    pub learn_rate: f64,
    /// Inverse time decay of the learning rate, see [`HyperParameters::learn_rate_at`].
    pub learn_rate_decay: f64,
    pub batch_size: NonZeroUsize,
    /// How much of the previous update is kept on each step, `0` is plain gradient descent.
    pub momentum: f64,
    /// Size of a dedicated worker pool, `None` uses one worker per core.
    pub workers: Option<NonZeroUsize>,
    /// Amount of examples between telemetry reports, `None` disables reporting.
    pub report_every: Option<NonZeroUsize>,
}

impl Default for HyperParameters {
    fn default() -> Self {
        Self {
            learn_rate: 0.01,
            learn_rate_decay: 0.001,
            batch_size: DEFAULT_BATCH_SIZE,
            momentum: 0.,
            workers: None,
            report_every: None,
        }
    }
}

impl HyperParameters {
    /// Loads the hyper parameters from a JSON file.
    ///
    /// # Arguments
    /// * `path` - The path to the file.
    ///
    /// # Returns
    /// The validated parameters, or an error if the file can't be read, parsed or holds invalid
    /// values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parses and validates the hyper parameters out of a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| NetErr::Config(format!("invalid JSON: {e}")))?;

        params.validate()?;
        Ok(params)
    }

    /// Checks every value is usable for training.
    pub fn validate(&self) -> Result<()> {
        let non_negative = |name: &str, value: f64| {
            if value.is_finite() && value >= 0. {
                Ok(())
            } else {
                Err(NetErr::Config(format!(
                    "{name} must be finite and non negative, got {value}"
                )))
            }
        };

        non_negative("learn_rate", self.learn_rate)?;
        non_negative("learn_rate_decay", self.learn_rate_decay)?;

        if !(0. ..1.).contains(&self.momentum) {
            return Err(NetErr::Config(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }

        Ok(())
    }

    /// The learning rate to use on the given epoch: `learn_rate / (1 + learn_rate_decay * epoch)`.
    pub fn learn_rate_at(&self, epoch: usize) -> f64 {
        self.learn_rate / (1. + self.learn_rate_decay * epoch as f64)
    }
}
