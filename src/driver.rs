// Block driver - Supplies monotonically increasing wall-clock time
// Advances a sample counter one audio block at a time, like an audio callback would

use crate::context::{Context, Seconds};

/// Sample-counting driver
///
/// Each call to [`BlockDriver::next_block`] advances by one block and returns the
/// new "now", which is what `Clock::process` / `Transport::process` expect.
#[derive(Debug, Clone)]
pub struct BlockDriver {
    context: Context,
    /// Current sample position (incremented per block)
    sample_position: u64,
}

impl BlockDriver {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            sample_position: 0,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn current_sample(&self) -> u64 {
        self.sample_position
    }

    /// Current time in seconds
    pub fn now(&self) -> Seconds {
        self.sample_position as f64 / self.context.sample_rate()
    }

    /// Advance by an arbitrary number of frames
    pub fn advance(&mut self, frames: usize) {
        self.sample_position += frames as u64;
    }

    /// Advance by one block and return the new time
    pub fn next_block(&mut self) -> Seconds {
        self.advance(self.context.block_size());
        self.now()
    }

    /// Convert seconds to a sample count at the driver's rate
    pub fn seconds_to_samples(&self, seconds: Seconds) -> u64 {
        (seconds.max(0.0) * self.context.sample_rate()) as u64
    }

    /// Pump blocks until `end` has been reached, calling `f` with each new time
    pub fn run_until<F, E>(&mut self, end: Seconds, mut f: F) -> Result<(), E>
    where
        F: FnMut(Seconds) -> Result<(), E>,
    {
        while self.now() < end {
            let now = self.next_block();
            f(now)?;
        }
        Ok(())
    }

    /// Rewind to sample 0
    pub fn reset(&mut self) {
        self.sample_position = 0;
    }
}
