//! Blocking delays.
//!
//! The drivers take any [DelayNs] so tests can record timings instead of waiting.

use embedded_hal::delay::DelayNs;
use std::hint::spin_loop;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Delay backed by the standard library.
///
/// Waits shorter than [StdDelay::SPIN_THRESHOLD] busy-wait, since the OS scheduler can't honor
/// microsecond sleeps; longer ones sleep.
#[derive(Debug, Default, Copy, Clone)]
pub struct StdDelay;

impl StdDelay {
    pub const SPIN_THRESHOLD: Duration = Duration::from_millis(1);
}

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        let duration = Duration::from_nanos(ns as u64);
        if duration >= Self::SPIN_THRESHOLD {
            sleep(duration);
            return;
        }

        let start = Instant::now();
        while start.elapsed() < duration {
            spin_loop();
        }
    }
}
