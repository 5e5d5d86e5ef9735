// Context - Explicit engine context
// Sample rate, block size and tick resolution shared by every timing object

use crate::config::EngineConfig;

/// Time in seconds on the driver's wall clock
pub type Seconds = f64;

/// Tempo-relative time in ticks
pub type Ticks = f64;

/// Engine-wide timing constants
///
/// Passed by value into every constructor so several independent engines
/// (live and offline, for example) can coexist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Context {
    sample_rate: f64,
    block_size: usize,
    ppq: u32,
}

impl Context {
    pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;
    pub const DEFAULT_BLOCK_SIZE: usize = 128;
    pub const DEFAULT_PPQ: u32 = 192;

    pub fn new(sample_rate: f64, block_size: usize, ppq: u32) -> Self {
        assert!(sample_rate > 0.0, "Sample rate must be > 0");
        assert!(block_size > 0, "Block size must be > 0");
        assert!(ppq > 0, "PPQ must be > 0");
        Self {
            sample_rate,
            block_size,
            ppq,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.sample_rate, config.block_size, config.ppq)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Pulses (ticks) per quarter note
    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    /// Duration of one sample. Used as the smallest meaningful time step.
    pub fn sample_time(&self) -> Seconds {
        1.0 / self.sample_rate
    }

    /// Duration of one driver block
    pub fn block_duration(&self) -> Seconds {
        self.block_size as f64 / self.sample_rate
    }

    /// Tick frequency (ticks per second) for a tempo
    pub fn bpm_to_frequency(&self, bpm: f64) -> f64 {
        bpm * self.ppq as f64 / 60.0
    }

    /// Tempo for a tick frequency
    pub fn frequency_to_bpm(&self, frequency: f64) -> f64 {
        frequency * 60.0 / self.ppq as f64
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_SAMPLE_RATE,
            Self::DEFAULT_BLOCK_SIZE,
            Self::DEFAULT_PPQ,
        )
    }
}
