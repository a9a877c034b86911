//! Single-writer background file sink.
//!
//! Aggregates records from many producer threads into one file without
//! contention on the file handle itself: `collect` only has to push onto a
//! bounded channel, and a single dedicated thread owns the open file and
//! writes everything in FIFO order.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Error returned by [`FileCollector::collect`] and [`FileCollector::new`].
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// The background writer thread could not be started, or failed to open
    /// its target file.
    #[error("file collector failed to start: {0}")]
    Start(#[source] io::Error),
    /// `collect` was called after the collector's queue disconnected (the
    /// writer thread has already exited).
    #[error("file collector is no longer accepting items")]
    Closed,
}

/// Background single-writer sink: `collect(item)` is cheap under normal
/// load (bounded by a queue of depth `Q_f`); a dedicated thread drains items
/// FIFO and writes them to the target file, which is opened once and closed
/// only after `stop()` has been called and the queue has fully drained.
pub struct FileCollector {
    tx: Sender<String>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<io::Result<()>>>,
}

impl FileCollector {
    /// Spawns the background writer thread targeting `path`, appending if
    /// the file already exists. `queue_depth` bounds how many un-written
    /// items may be buffered before `collect` blocks.
    pub fn start(path: impl Into<PathBuf>, queue_depth: usize) -> Result<Self, CollectorError> {
        let path = path.into();
        let (tx, rx): (Sender<String>, Receiver<String>) = crossbeam_channel::bounded(queue_depth.max(1));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_thread = stop_flag.clone();

        let handle = thread::Builder::new()
            .name("forge-file-collector".into())
            .spawn(move || -> io::Result<()> {
                let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
                loop {
                    match rx.recv_timeout(POLL_TIMEOUT) {
                        Ok(item) => {
                            file.write_all(item.as_bytes())?;
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                            if stop_flag_thread.load(Ordering::Acquire) {
                                break;
                            }
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
                file.flush()
            })
            .map_err(|e| CollectorError::Start(io::Error::other(e)))?;

        Ok(Self {
            tx,
            stop_flag,
            handle: Some(handle),
        })
    }

    /// Enqueues `item` to be written. Blocks if the queue is currently at
    /// `queue_depth` capacity (the normal-load case is a cheap push).
    pub fn collect(&self, item: impl Into<String>) -> Result<(), CollectorError> {
        self.tx.send(item.into()).map_err(|_| CollectorError::Closed)
    }

    /// Like [`collect`](Self::collect), but never blocks: returns
    /// `Err(CollectorError::Closed)` if the queue is momentarily full too,
    /// treated the same as a closed channel by callers that would rather
    /// drop than stall.
    pub fn try_collect(&self, item: impl Into<String>) -> Result<(), CollectorError> {
        match self.tx.try_send(item.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => Err(CollectorError::Closed),
        }
    }

    /// Signals the writer thread to exit once the queue drains. Items
    /// enqueued before this call are guaranteed to be flushed; items
    /// enqueued after are not.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    /// Calls [`stop`](Self::stop) and blocks until the writer thread exits.
    pub fn join(mut self) -> io::Result<()> {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| Err(io::Error::other("file collector thread panicked"))),
            None => Ok(()),
        }
    }
}

impl Drop for FileCollector {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_items_in_fifo_order_and_flushes_on_join() {
        let dir = std::env::temp_dir().join(format!("forge-collector-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.txt");
        let _ = fs::remove_file(&path);

        let collector = FileCollector::start(&path, 8).unwrap();
        for i in 0..20 {
            collector.collect(format!("line-{i}\n")).unwrap();
        }
        collector.join().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let expected: String = (0..20).map(|i| format!("line-{i}\n")).collect();
        assert_eq!(contents, expected);
    }
}
