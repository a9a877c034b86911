//! The supervisor that wires acquisition, the shared queue, and the `P`
//! work workers together (spec §4.5).
//!
//! Lifecycle per run: spawn the acquire thread and `P` work-worker threads,
//! join the acquire thread, join every work-worker thread, then decide the
//! outcome from whatever the breaker ended up holding. Every thread body
//! below is written so it never lets a panic escape: a panic inside a hook
//! trips the breaker with a description of the panic and the thread returns
//! normally, so `JoinHandle::join` only ever reports `Err` for the truly
//! unexpected case (a second panic while already unwinding, or a stack
//! overflow) — see [`PipelineError::ThreadPanic`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::breaker::{Breaker, DEFAULT_GRANULARITY};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, WorkerKind};
use crate::executor::BoundedExecutor;
use crate::hooks::{AcquireContext, Aborted, PipelineHooks};
use crate::rate_limiter::SmoothRateLimiter;

/// How long a work worker blocks on an empty queue before re-checking
/// whether acquisition has finished and it should drain and exit.
const DEQUEUE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// Ties one [`PipelineConfig`] to one [`PipelineHooks`] implementation and
/// runs the two-stage pipeline described in spec §4.
pub struct WorkPipeline<H: PipelineHooks> {
    config: PipelineConfig,
    hooks: Arc<H>,
    breaker: Breaker,
}

impl<H: PipelineHooks> WorkPipeline<H> {
    /// Builds a pipeline from a configuration and a hook implementation.
    /// The breaker is created here (not inside `run`) so callers can grab a
    /// handle via [`breaker`](Self::breaker) and trip it externally — e.g.
    /// from a Ctrl-C handler installed before `run` is called.
    pub fn new(config: PipelineConfig, hooks: H) -> Self {
        Self {
            config,
            hooks: Arc::new(hooks),
            breaker: Breaker::new(),
        }
    }

    /// Returns a cloneable handle to this pipeline's breaker, so it can be
    /// tripped from outside (an interrupt handler, a watchdog thread)
    /// without waiting for a hook to notice and trip it itself.
    pub fn breaker(&self) -> Breaker {
        self.breaker.clone()
    }

    /// Runs the pipeline to completion: spawns the acquire worker and the
    /// configured work workers, blocks until both stages finish, then
    /// reports success or the reason the breaker tripped.
    ///
    /// Returns `Ok(())` on a clean run (acquisition finished and every
    /// queued item was handed to `on_work`) and `Err(PipelineError)` if
    /// anything tripped the breaker first.
    pub fn run(&self) -> Result<(), PipelineError> {
        if self.config.processes == 0 || self.config.threads == 0 {
            return Err(PipelineError::Unconfigured);
        }

        let breaker = self.breaker.clone();
        let done = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::bounded::<H::Item>(self.config.queue);

        let acquire_handle = {
            let hooks = self.hooks.clone();
            let breaker = breaker.clone();
            let done = done.clone();
            thread::Builder::new()
                .name("forge-acquire".to_string())
                .spawn(move || acquire_entry(hooks, tx, breaker, done))
                .map_err(|source| PipelineError::ThreadSpawn {
                    worker: WorkerKind::Acquire,
                    source,
                })?
        };

        let mut work_handles = Vec::with_capacity(self.config.processes);
        for worker_index in 0..self.config.processes {
            let hooks = self.hooks.clone();
            let breaker = breaker.clone();
            let done = done.clone();
            let rx = rx.clone();
            let rate = self.config.per_worker_rate();
            let threads = self.config.threads;
            let handle = thread::Builder::new()
                .name(format!("forge-work-{worker_index}"))
                .spawn(move || work_entry(worker_index, hooks, rx, breaker, done, rate, threads))
                .map_err(|source| PipelineError::ThreadSpawn {
                    worker: WorkerKind::Work(worker_index),
                    source,
                })?;
            work_handles.push(handle);
        }

        if let Err(payload) = acquire_handle.join() {
            return Err(PipelineError::ThreadPanic {
                worker: WorkerKind::Acquire,
                message: panic_message(&payload),
            });
        }

        for (worker_index, handle) in work_handles.into_iter().enumerate() {
            if let Err(payload) = handle.join() {
                return Err(PipelineError::ThreadPanic {
                    worker: WorkerKind::Work(worker_index),
                    message: panic_message(&payload),
                });
            }
        }

        match breaker.consume_reason() {
            Ok(reason) => Err(PipelineError::BreakerTripped { reason }),
            Err(_) => Ok(()),
        }
    }
}

/// Renders a `std::panic` payload as a human-readable string. Payloads are
/// almost always `&str` or `String` (what `panic!` and `.unwrap()` produce);
/// anything else falls back to a generic message.
fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Body of the single acquire worker thread.
///
/// Runs `on_acquire_setup` then `acquire_work`, always runs
/// `on_acquire_complete` afterward regardless of outcome, and always sets
/// `done` before returning (even on failure) — the work workers only use
/// `done` to recognize "the queue will receive no further items", not to
/// infer success.
fn acquire_entry<H: PipelineHooks>(
    hooks: Arc<H>,
    tx: Sender<H::Item>,
    breaker: Breaker,
    done: Arc<AtomicBool>,
) {
    let poll = breaker.poll(DEFAULT_GRANULARITY);
    let ctx = AcquireContext { tx, breaker: poll };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), String> {
        hooks
            .on_acquire_setup()
            .map_err(|e| format!("on_acquire_setup failed: {e}"))?;

        match hooks.acquire_work(&ctx) {
            Ok(()) => Ok(()),
            Err(e) if e.downcast_ref::<Aborted>().is_some() => {
                tracing::warn!("acquire worker: breaker already tripped, exiting quietly");
                Ok(())
            }
            Err(e) => Err(format!("acquire_work failed: {e}")),
        }
    }));

    done.store(true, Ordering::Release);

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(reason)) => {
            tracing::error!(reason = %reason, "acquire worker tripping breaker");
            breaker.trip(reason);
        }
        Err(payload) => {
            let reason = format!("acquire worker panicked: {}", panic_message(&payload));
            tracing::error!(reason = %reason);
            breaker.trip(reason);
        }
    }

    match panic::catch_unwind(AssertUnwindSafe(|| hooks.on_acquire_complete())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "on_acquire_complete failed"),
        Err(_) => tracing::error!("on_acquire_complete panicked"),
    }
}

/// Body of one work-worker thread. Owns a [`SmoothRateLimiter`] paced at
/// this worker's share of the configured rate and a [`BoundedExecutor`]
/// sized `threads` wide with a backlog of `threads` (so at most
/// `2 * threads` items are ever in flight or queued for this worker at
/// once); dequeues from the shared queue and hands each item to the
/// executor, which is where `on_work` actually runs.
fn work_entry<H: PipelineHooks>(
    worker_index: usize,
    hooks: Arc<H>,
    rx: Receiver<H::Item>,
    breaker: Breaker,
    done: Arc<AtomicBool>,
    rate: f64,
    threads: usize,
) {
    let poll = Arc::new(breaker.poll(DEFAULT_GRANULARITY));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), String> {
        hooks
            .on_work_setup(worker_index)
            .map_err(|e| format!("on_work_setup failed: {e}"))?;

        let rate_limiter = Arc::new(SmoothRateLimiter::new(rate));
        let executor = BoundedExecutor::new(threads, threads);

        let drain_result = (|| -> Result<(), String> {
            loop {
                if poll.is_tripped() {
                    tracing::error!(worker_index, "work worker: breaker tripped, stopping early");
                    return Ok(());
                }

                match rx.recv_timeout(DEQUEUE_TIMEOUT) {
                    Ok(item) => {
                        let hooks = hooks.clone();
                        let breaker = breaker.clone();
                        let poll = poll.clone();
                        let rate_limiter = rate_limiter.clone();
                        if executor
                            .submit(move || {
                                work_thread_body(hooks.as_ref(), item, &breaker, &poll, &rate_limiter, worker_index);
                            })
                            .is_err()
                        {
                            return Err("bounded executor refused a submission".to_string());
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if done.load(Ordering::Acquire) && rx.is_empty() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            Ok(())
        })();

        // Always wait for every in-flight item before reporting on_work_complete.
        executor.shutdown(true);
        drain_result
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(reason)) => {
            tracing::error!(worker_index, reason = %reason, "work worker tripping breaker");
            breaker.trip(reason);
        }
        Err(payload) => {
            let reason = format!(
                "work worker {worker_index} panicked: {}",
                panic_message(&payload)
            );
            tracing::error!(reason = %reason);
            breaker.trip(reason);
        }
    }

    match panic::catch_unwind(AssertUnwindSafe(|| hooks.on_work_complete(worker_index))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(worker_index, error = %e, "on_work_complete failed"),
        Err(_) => tracing::error!(worker_index, "on_work_complete panicked"),
    }
}

/// Runs on an executor thread for exactly one item: paces itself through
/// the worker's shared rate limiter, bails out before calling `on_work` if
/// the breaker has already tripped, and trips the breaker itself if
/// `on_work` returns an error or panics. `on_work` is wrapped in its own
/// `catch_unwind` here (rather than leaving a panic to `BoundedExecutor`'s
/// per-task guard) so that a panicking hook trips the breaker the same way
/// an `Err` return does; the executor's own guard only keeps a panic from
/// killing the pool, it does not know about the breaker.
fn work_thread_body<H: PipelineHooks>(
    hooks: &H,
    item: H::Item,
    breaker: &Breaker,
    poll: &crate::breaker::BreakerPoll,
    rate_limiter: &SmoothRateLimiter,
    worker_index: usize,
) {
    if poll.is_tripped() {
        return;
    }

    rate_limiter.wait();

    if poll.is_tripped() {
        return;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| hooks.on_work(item)));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let reason = format!("on_work failed on work worker {worker_index}: {e}");
            tracing::error!(reason = %reason);
            breaker.trip(reason);
        }
        Err(payload) => {
            let reason = format!(
                "on_work panicked on work worker {worker_index}: {}",
                panic_message(&payload)
            );
            tracing::error!(reason = %reason);
            breaker.trip(reason);
        }
    }
}
