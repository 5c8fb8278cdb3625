//! Rate meters for the simulator workers.
//!
//! Each worker carries two meters: step rate (updates per second) and
//! throughput (GFLOP/s derived from the step rate and the interaction
//! count). The worker thread records samples; accessors on other threads
//! read the published value, so the meter keeps its state behind atomics
//! rather than a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::constants::defaults;

/// Flop estimate for one body-body interaction in the softened kernel.
const FLOPS_PER_INTERACTION: f64 = 20.0;

/// Windowed rate meter publishing through an atomic f64 bit pattern.
pub struct Meter {
    /// Published rate in events per second.
    value: AtomicU64,
    /// Accumulated busy time for the open window, nanoseconds.
    window_nanos: AtomicU64,
    /// Samples recorded in the open window.
    window_samples: AtomicU64,
    /// Samples per published value.
    window_size: u64,
}

impl Meter {
    pub fn new() -> Self {
        Self::with_window(defaults::METER_SIZE)
    }

    pub fn with_window(window_size: usize) -> Self {
        Meter {
            value: AtomicU64::new(0),
            window_nanos: AtomicU64::new(0),
            window_samples: AtomicU64::new(0),
            window_size: window_size.max(1) as u64,
        }
    }

    /// Records one timed event. Publishes a fresh rate once per window and
    /// immediately on the first sample so the HUD shows a value right away.
    pub fn record(&self, elapsed: Duration) {
        let nanos = self.window_nanos.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed)
            + elapsed.as_nanos() as u64;
        let samples = self.window_samples.fetch_add(1, Ordering::Relaxed) + 1;

        if samples == 1 || samples >= self.window_size {
            if nanos > 0 {
                let rate = samples as f64 / (nanos as f64 * 1e-9);
                self.value.store(rate.to_bits(), Ordering::Relaxed);
            }
            if samples >= self.window_size {
                self.window_nanos.store(0, Ordering::Relaxed);
                self.window_samples.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Last published rate in events per second.
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }

    /// Clears the meter; used when a hand-off makes the window meaningless.
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
        self.window_nanos.store(0, Ordering::Relaxed);
        self.window_samples.store(0, Ordering::Relaxed);
    }
}

impl Default for Meter {
    fn default() -> Self {
        Meter::new()
    }
}

/// Converts a step rate into GFLOP/s for an `n`-body direct kernel.
pub fn gflops(steps_per_second: f64, n: usize) -> f64 {
    steps_per_second * (n as f64) * (n as f64) * FLOPS_PER_INTERACTION * 1e-9
}
