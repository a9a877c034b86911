//! Pipeline configuration (spec §6).

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::pipeline::WorkPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of work worker threads `P`.
    pub processes: usize,
    /// Thread-pool size `W` per work worker.
    pub threads: usize,
    /// Capacity `Q` of the shared work queue.
    pub queue: usize,
    /// Target global calls per second; each work worker gets `rate / processes`.
    pub rate: f64,
}

impl PipelineConfig {
    /// `processes = 1, threads = 1024, queue = 1024, rate = 10`, matching
    /// spec §6's defaults.
    pub const DEFAULT: Self = Self {
        processes: 1,
        threads: 1024,
        queue: 1024,
        rate: 10.0,
    };

    /// The per-worker share of the configured global rate (`rate / processes`).
    pub fn per_worker_rate(&self) -> f64 {
        self.rate / self.processes as f64
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_rate_evenly_across_workers() {
        let config = PipelineConfig {
            processes: 4,
            rate: 1000.0,
            ..PipelineConfig::DEFAULT
        };
        assert_eq!(config.per_worker_rate(), 250.0);
    }
}
