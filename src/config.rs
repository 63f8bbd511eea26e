//! Engine configuration.
//!
//! Every section falls back to its defaults, so a partial JSON document
//! such as `{"meeting": {"max_distance": 250}}` is a valid configuration.

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::dwell::DwellConfig;
use crate::error::{CellMatchError, Result};
use crate::filter::EventWindow;
use crate::meetings::MeetingConfig;
use crate::similarity::SimilarityConfig;

/// Combined configuration for all correlation operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub meeting: MeetingConfig,
    pub dwell: DwellConfig,
    pub similarity: SimilarityConfig,
    pub events: EventWindow,
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(text).map_err(|e| CellMatchError::ConfigError {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CellMatchError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_json_str(&text)?;
        info!("[Config] Loaded {}", path.display());
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CellMatchError::Internal {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.meeting.validate()?;
        self.dwell.validate()?;
        self.similarity.validate()?;
        self.events.validate()
    }
}
