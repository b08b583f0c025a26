//! Injectable time source.
//!
//! Engine time is `f64` seconds on an epoch-anchored, monotonic scale, so it
//! can be serialized as a wall-clock instant but never runs backwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Current time in seconds.
    fn now(&self) -> f64;
}

/// Wall-clock epoch captured once at construction, advanced by `Instant`.
#[derive(Debug)]
pub struct SystemClock {
    epoch_secs: f64,
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        SystemClock {
            epoch_secs: now.timestamp_millis() as f64 / 1000.0,
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.epoch_secs + self.started.elapsed().as_secs_f64()
    }
}

/// Manually driven clock for replay and tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        ManualClock {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, t: f64) {
        self.bits.store(t.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        // The closure never returns None, so the update cannot fail.
        let _ = self
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + secs).to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(100.0);
        let other = clock.clone();
        clock.advance(2.5);
        assert_eq!(other.now(), 102.5);
        other.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn test_manual_clock_default_is_zero() {
        assert_eq!(ManualClock::default().now(), 0.0);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        // Anchored to the current epoch, not to zero
        assert!(a > 1_600_000_000.0);
    }
}
