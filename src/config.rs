//! Engine configuration.
//!
//! Every section has a `Default` matching the production settings, and
//! every field may be omitted from JSON.
//!
//! ```
//! use u_rail::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{"scheduler": {"horizon_min": 90}}"#).unwrap();
//! assert_eq!(config.scheduler.horizon_min, 90);
//! assert_eq!(config.refiner.iterations, 100);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::predictor::PredictorConfig;
use crate::refiner::RefinerConfig;
use crate::scheduler::SolverConfig;

/// Settings of all engine components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SolverConfig,
    pub refiner: RefinerConfig,
    pub predictor: PredictorConfig,
}

impl EngineConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    /// [`Error::Serialization`](crate::Error::Serialization) for malformed
    /// JSON, [`Error::InvalidConfig`](crate::Error::InvalidConfig) for
    /// out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        self.refiner.validate()?;
        self.predictor.validate()
    }

    pub fn with_scheduler(mut self, scheduler: SolverConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_refiner(mut self, refiner: RefinerConfig) -> Self {
        self.refiner = refiner;
        self
    }

    pub fn with_predictor(mut self, predictor: PredictorConfig) -> Self {
        self.predictor = predictor;
        self
    }
}
