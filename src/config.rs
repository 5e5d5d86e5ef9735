// Engine configuration
// Loaded from RON, validated, then turned into a Context and a Transport

use crate::error::{EngineError, EngineResult};
use crate::transport::TimeSignature;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Timing configuration for an engine instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Driver sample rate in Hz
    pub sample_rate: f64,
    /// Frames per driver invocation
    pub block_size: usize,
    /// Pulses per quarter note
    pub ppq: u32,
    /// Initial tempo
    pub bpm: f64,
    pub time_signature: TimeSignature,
}

impl EngineConfig {
    /// Parse and validate a RON document
    pub fn from_ron_str(source: &str) -> EngineResult<Self> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a RON file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&source)?;
        tracing::debug!(
            path = %path.display(),
            sample_rate = config.sample_rate,
            ppq = config.ppq,
            bpm = config.bpm,
            "Loaded engine configuration"
        );
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> EngineResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| EngineError::InvalidConfig(format!("Failed to serialize to RON: {}", e)))
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "sample_rate must be > 0, got {}",
                self.sample_rate
            )));
        }
        if self.block_size == 0 {
            return Err(EngineError::InvalidConfig(
                "block_size must be > 0".to_string(),
            ));
        }
        if self.ppq == 0 {
            return Err(EngineError::InvalidConfig("ppq must be > 0".to_string()));
        }
        if !(self.bpm.is_finite() && self.bpm > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "bpm must be > 0, got {}",
                self.bpm
            )));
        }
        if !self.time_signature.is_valid() {
            return Err(EngineError::InvalidConfig(format!(
                "invalid time signature {}",
                self.time_signature
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            block_size: 128,
            ppq: 192,
            bpm: 120.0,
            time_signature: TimeSignature::four_four(),
        }
    }
}
