//! Smooth per-worker pacing, approximating a target calls-per-second rate
//! without bursting after idle periods (spec §4.2).

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between rate reports logged by [`SmoothRateLimiter`].
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

struct State {
    last_release: Option<Instant>,
    report_count: u64,
    report_window_start: Option<Instant>,
}

/// Blocks callers so that successive returns from [`wait`](Self::wait) are
/// spaced by at least `1 / rate` seconds. Entirely local to this worker —
/// achieving a global rate `R` across `P` workers means constructing one of
/// these per worker at `R / P` (see [`crate::pipeline`]).
pub struct SmoothRateLimiter {
    delay: Duration,
    report_interval: Duration,
    state: Mutex<State>,
}

impl SmoothRateLimiter {
    /// Creates a limiter targeting `calls_per_second`.
    pub fn new(calls_per_second: f64) -> Self {
        Self::with_report_interval(calls_per_second, DEFAULT_REPORT_INTERVAL)
    }

    /// Like [`new`](Self::new), with an explicit rate-reporting interval.
    pub fn with_report_interval(calls_per_second: f64, report_interval: Duration) -> Self {
        assert!(calls_per_second > 0.0, "calls_per_second must be positive");
        Self {
            delay: Duration::from_secs_f64(1.0 / calls_per_second),
            report_interval,
            state: Mutex::new(State {
                last_release: None,
                report_count: 0,
                report_window_start: None,
            }),
        }
    }

    /// Blocks the caller until it is this call's turn to proceed, then
    /// returns. Holds an internal lock for the whole wait so pacing is
    /// serialized in-process; `last_release` is pre-committed before
    /// sleeping (rather than stamped with the post-sleep clock) so sleep
    /// overshoot never accumulates as drift.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        let entry_time = Instant::now();

        match state.report_window_start {
            None => state.report_window_start = Some(entry_time),
            Some(window_start) if entry_time.duration_since(window_start) >= self.report_interval => {
                let elapsed = entry_time.duration_since(window_start);
                let observed_rate = state.report_count as f64 / elapsed.as_secs_f64();
                tracing::info!(observed_rate, "rate limiter measured rate for this worker");
                state.report_count = 0;
                state.report_window_start = Some(entry_time);
            }
            Some(_) => {}
        }

        let remaining = match state.last_release {
            None => Duration::ZERO,
            Some(last) => self.delay.saturating_sub(entry_time.saturating_duration_since(last)),
        };

        let release_at = entry_time + remaining;
        state.last_release = Some(release_at);
        state.report_count += 1;

        // last_release is committed before the sleep, so drop the lock here
        // and let other callers queue on it while this one sleeps.
        if remaining > Duration::ZERO {
            drop(state);
            std::thread::sleep(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn paces_successive_calls_at_least_delay_apart() {
        let limiter = SmoothRateLimiter::new(100.0); // 10ms delay
        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait();
        }
        let elapsed = start.elapsed();
        // 5 calls => at least 4 full delays of spacing (the first call never waits).
        assert!(elapsed >= Duration::from_millis(40), "elapsed={elapsed:?}");
    }

    #[test]
    fn serializes_across_threads() {
        let limiter = Arc::new(SmoothRateLimiter::new(200.0)); // 5ms delay
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..5 {
                    limiter.wait();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let elapsed = start.elapsed();
        // 20 total waits sharing one limiter => at least 19 delays of spacing.
        assert!(elapsed >= Duration::from_millis(19 * 5), "elapsed={elapsed:?}");
    }
}
