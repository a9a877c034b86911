//! Fixed-size thread pool whose `submit` blocks once the backlog threshold
//! is reached, providing local backpressure inside one work worker (spec
//! §4.3).

use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Releases its permit on drop, so a permit is returned exactly once even
/// if the wrapped task panics and unwinds straight past the rest of the
/// closure body.
struct PermitGuard(Sender<()>);

impl Drop for PermitGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Error returned by [`BoundedExecutor::submit`].
#[derive(Debug, thiserror::Error)]
#[error("bounded executor is shutting down")]
pub struct ExecutorShuttingDown;

/// A `W`-thread pool guarded by a counting permit of capacity `W + B`:
/// `submit` acquires a permit before handing work to the pool and the
/// permit is released exactly once, whether the task succeeds, fails, or
/// panics. `(in-flight + queued) <= W + B` holds at all times.
pub struct BoundedExecutor {
    job_tx: Mutex<Option<Sender<Job>>>,
    permits_tx: Sender<()>,
    permits_rx: Receiver<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BoundedExecutor {
    /// Spawns `workers` OS threads and sizes the permit pool at
    /// `workers + backlog`.
    pub fn new(workers: usize, backlog: usize) -> Self {
        assert!(workers > 0, "executor needs at least one worker thread");

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let capacity = workers + backlog;
        let (permits_tx, permits_rx) = crossbeam_channel::bounded::<()>(capacity);
        for _ in 0..capacity {
            permits_tx.send(()).expect("freshly created channel cannot be full");
        }

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let job_rx = job_rx.clone();
            handles.push(
                thread::Builder::new()
                    .name(format!("forge-executor-{idx}"))
                    .spawn(move || {
                        while let Ok(job) = job_rx.recv() {
                            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                                tracing::error!(panic = ?payload, "bounded executor task panicked");
                            }
                        }
                    })
                    .expect("failed to spawn bounded executor worker thread"),
            );
        }

        Self {
            job_tx: Mutex::new(Some(job_tx)),
            permits_tx,
            permits_rx,
            workers: Mutex::new(handles),
        }
    }

    /// Acquires one permit (blocking if all `W + B` are in use), then hands
    /// `job` to the pool. If handoff fails (the executor is shutting down),
    /// the permit is released immediately and an error is returned.
    pub fn submit<F>(&self, job: F) -> Result<(), ExecutorShuttingDown>
    where
        F: FnOnce() + Send + 'static,
    {
        self.permits_rx.recv().map_err(|_| ExecutorShuttingDown)?;

        let permits_tx = self.permits_tx.clone();
        let wrapped: Job = Box::new(move || {
            let _guard = PermitGuard(permits_tx);
            job();
        });

        let sender = self.job_tx.lock().unwrap();
        match sender.as_ref() {
            Some(tx) => match tx.send(wrapped) {
                Ok(()) => Ok(()),
                Err(_) => {
                    let _ = self.permits_tx.send(());
                    Err(ExecutorShuttingDown)
                }
            },
            None => {
                let _ = self.permits_tx.send(());
                Err(ExecutorShuttingDown)
            }
        }
    }

    /// Refuses new submissions and, if `wait` is true, blocks until every
    /// in-flight and queued task has run to completion.
    pub fn shutdown(&self, wait: bool) {
        let sender = self.job_tx.lock().unwrap().take();
        drop(sender); // closes the channel once drained, letting worker loops exit

        if wait {
            let mut workers = self.workers.lock().unwrap();
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        self.shutdown(true);
    }
}
