//! Audio-clock sources for the scheduler

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic audio timeline, in seconds
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock that only moves when told to. Used by tests and offline rendering.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { bits: AtomicU64::new(start.to_bits()) }
    }

    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.set(self.now() + secs);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}
