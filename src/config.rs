//! Pipeline configuration
//!
//! One JSON document selects the voxel graph generator, the decomposition
//! and the guidance settings. Every section has defaults, so a partial
//! document (even `{}`) is a valid configuration.

use crate::error::{AtlasError, Result};
use crate::guidance::GuidanceConfig;
use crate::hierarchy::{DecompositionConfig, Schedule};
use crate::spatial::EdgeGenerator;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub edges: EdgeGenerator,
    pub decomposition: DecompositionConfig,
    pub guidance: GuidanceConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if let EdgeGenerator::Gabriel { tolerance, max_distance } = self.edges {
            if !(tolerance > 0.0 && tolerance <= 1.0) {
                return Err(AtlasError::Config(format!(
                    "Gabriel tolerance must lie in (0, 1], got {}",
                    tolerance
                )));
            }
            if max_distance.is_some_and(|d| d <= 0.0) {
                return Err(AtlasError::Config("max_distance must be positive".into()));
            }
        }
        if let Schedule::Balanced { n_iterations: Some(0) } = self.decomposition.schedule {
            return Err(AtlasError::Config("balanced schedule needs at least one iteration".into()));
        }
        self.guidance.validate()
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
