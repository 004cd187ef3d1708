//! Processing latency bookkeeping
use core::time::Duration;

use defmt_or_log::info;

/// Latency statistics of the full stack tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    last_latency: Duration,
    max_latency: Duration,
    full_ticks: u32,
}

impl Diagnostics {
    /// Create an empty Diagnostics
    pub const fn new() -> Self {
        Self {
            last_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            full_ticks: 0,
        }
    }

    /// Record the processing time of one full stack tick
    pub fn record_tick(&mut self, latency: Duration) {
        self.last_latency = latency;
        self.max_latency = self.max_latency.max(latency);
        self.full_ticks = self.full_ticks.wrapping_add(1);
    }

    /// Processing time of the most recent full stack tick
    pub fn last_latency(&self) -> Duration {
        self.last_latency
    }

    /// Longest full stack tick seen
    pub fn max_latency(&self) -> Duration {
        self.max_latency
    }

    /// Number of full stack ticks run
    pub fn full_ticks(&self) -> u32 {
        self.full_ticks
    }

    /// Log the latest latency
    pub fn report(&self, fast_ticks: u32, dropped_posts: u32) {
        info!(
            "took {} us to process (max {} us, {} full ticks, {} fast ticks, {} dropped)",
            self.last_latency.as_micros() as u64,
            self.max_latency.as_micros() as u64,
            self.full_ticks,
            fast_ticks,
            dropped_posts
        );
    }
}
