//! Error taxonomy for the pipeline crate (see spec §7).

use std::error::Error as StdError;
use std::fmt;

/// Boxed error type accepted from user hooks.
pub type HookError = Box<dyn StdError + Send + Sync + 'static>;

/// Which kind of worker a hook failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// The single acquire worker.
    Acquire,
    /// One of the `P` work workers, identified by its 0-based index.
    Work(usize),
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::Acquire => write!(f, "acquire"),
            WorkerKind::Work(idx) => write!(f, "work[{idx}]"),
        }
    }
}

/// Error surfaced to the caller of [`crate::pipeline::WorkPipeline::run`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The pipeline was run before being configured. Defensive check; the
    /// public constructor always configures the pipeline, so this should be
    /// unreachable in practice.
    #[error("pipeline was not configured before run()")]
    Unconfigured,

    /// The run aborted abnormally. `reason` is whatever the first failing
    /// site published to the breaker.
    #[error("breaker tripped: {reason}")]
    BreakerTripped {
        /// Descriptive reason published by the first trip.
        reason: String,
    },

    /// A background thread (acquire or work worker) could not be spawned.
    #[error("failed to spawn {worker} thread: {source}")]
    ThreadSpawn {
        /// Which worker failed to start.
        worker: WorkerKind,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A spawned worker thread panicked instead of returning normally.
    #[error("{worker} thread panicked: {message}")]
    ThreadPanic {
        /// Which worker panicked.
        worker: WorkerKind,
        /// Best-effort panic payload rendered as a string.
        message: String,
    },
}
