//! Rolling success-rate monitor.
//!
//! Not part of the core pipeline orchestration — this is an optional
//! building block for user hooks that want to self-observe and voluntarily
//! abort when their own success rate degrades, the same way
//! [`crate::accumulator::Accumulator`] is an optional batching helper.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Window {
    success: u64,
    total: u64,
    begin: Option<Instant>,
}

/// Tracks a rolling success/failure rate over a fixed time window and
/// reports whether it stayed above a configured threshold.
pub struct SuccessTracker {
    success_rate: f64,
    check_interval: Duration,
    window: Mutex<Window>,
}

impl SuccessTracker {
    /// Creates a tracker that checks the success rate every `check_seconds`
    /// against `success_rate` (e.g. `0.95` for 95%).
    pub fn new(success_rate: f64, check_seconds: u64) -> Self {
        Self {
            success_rate,
            check_interval: Duration::from_secs(check_seconds),
            window: Mutex::new(Window {
                success: 0,
                total: 0,
                begin: None,
            }),
        }
    }

    /// Records one outcome. Returns `false` only at the moment a completed
    /// window's success rate fell below the configured threshold; `true`
    /// otherwise (including every call inside an open window).
    pub fn track(&self, success: bool) -> bool {
        let mut window = self.window.lock();

        if success {
            window.success += 1;
        }
        window.total += 1;

        let now = Instant::now();

        let begin = match window.begin {
            None => {
                window.begin = Some(now);
                return true;
            }
            Some(begin) => begin,
        };

        if now.duration_since(begin) < self.check_interval {
            return true;
        }

        window.begin = Some(now);
        let rate = window.success as f64 / window.total as f64;
        tracing::info!(success = window.success, total = window.total, rate, "success tracker window closed");
        window.success = 0;
        window.total = 0;

        if rate < self.success_rate {
            tracing::error!(rate, threshold = self.success_rate, "success rate below threshold");
            return false;
        }

        true
    }
}
