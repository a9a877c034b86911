//! The user extension surface (spec §6): two required hooks
//! (`acquire_work`, `on_work`) and four optional lifecycle hooks.

use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender};

use crate::breaker::BreakerPoll;
use crate::error::HookError;

const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Raised by [`AcquireContext::distribute`] once the breaker is tripped.
/// Callers **must not** swallow this — let it propagate out of
/// `acquire_work` with `?` so the acquire worker can exit quietly.
#[derive(Debug, thiserror::Error)]
#[error("breaker tripped while distributing work")]
pub struct Aborted;

/// Handed to [`PipelineHooks::acquire_work`]; the only way to publish items
/// onto the shared work queue.
pub struct AcquireContext<T> {
    pub(crate) tx: Sender<T>,
    pub(crate) breaker: BreakerPoll,
}

impl<T> AcquireContext<T> {
    /// Publishes `item` to the shared work queue. Blocks in bounded
    /// ~1-second increments while the queue is full, re-checking the
    /// breaker between attempts; never enqueues once the breaker has
    /// tripped.
    pub fn distribute(&self, mut item: T) -> Result<(), Aborted> {
        loop {
            if self.breaker.is_tripped() {
                return Err(Aborted);
            }

            match self.tx.send_timeout(item, ENQUEUE_TIMEOUT) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => {
                    item = returned;
                    continue;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(Aborted),
            }
        }
    }
}

/// The capability set a caller of [`crate::pipeline::WorkPipeline`] must
/// implement. Required hooks produce and consume work items; optional
/// hooks let each worker set up and tear down per-worker resources (a
/// database handle, an HTTP client, a log file) that must be re-created on
/// every worker rather than shared, matching the isolation the original
/// fork-based design gave each process for free.
pub trait PipelineHooks: Send + Sync {
    /// The type of item flowing from acquisition to work. Only needs to be
    /// `Send` — see SPEC_FULL.md §0 for why this crate does not require
    /// `Serialize`.
    type Item: Send + 'static;

    /// Produces work items, calling [`AcquireContext::distribute`] for
    /// each one. Runs once, on the dedicated acquire worker thread.
    fn acquire_work(&self, ctx: &AcquireContext<Self::Item>) -> Result<(), HookError>;

    /// Consumes one work item. Runs on a work-worker's executor thread;
    /// many calls may be in flight concurrently across workers and their
    /// thread pools, in no guaranteed order.
    fn on_work(&self, item: Self::Item) -> Result<(), HookError>;

    /// Runs once before `acquire_work`, on the acquire worker thread.
    fn on_acquire_setup(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs once after `acquire_work` returns or fails, on the acquire
    /// worker thread. Any error is logged and swallowed — cleanup must
    /// never escalate.
    fn on_acquire_complete(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs once per work worker, before it starts dequeuing, identified by
    /// its 0-based `worker_index`.
    fn on_work_setup(&self, worker_index: usize) -> Result<(), HookError> {
        let _ = worker_index;
        Ok(())
    }

    /// Runs once per work worker after its executor has drained, identified
    /// by its 0-based `worker_index`. Any error is logged and swallowed.
    fn on_work_complete(&self, worker_index: usize) -> Result<(), HookError> {
        let _ = worker_index;
        Ok(())
    }
}
