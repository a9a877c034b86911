//! Threadsafe batching primitive: coalesce many small adds into batches of a
//! fixed size and hand each full batch to a user-supplied processor.

use std::mem;
use std::sync::Mutex;

/// Accumulates items added from any number of threads and flushes them in
/// batches of `size` to `on_process`.
///
/// When `serial` is `true`, calls to `on_process` are serialized via a second
/// lock so that batches are processed one at a time, in the order they became
/// full; when `false`, multiple batches may be processed concurrently.
pub struct Accumulator<T> {
    size: usize,
    serial: bool,
    buffer: Mutex<Vec<T>>,
    process_lock: Mutex<()>,
    on_process: Box<dyn Fn(Vec<T>) + Send + Sync>,
}

impl<T> Accumulator<T>
where
    T: Send + 'static,
{
    /// Creates an accumulator that dispatches a batch to `on_process` once it
    /// reaches `size` items.
    pub fn new(size: usize, serial: bool, on_process: impl Fn(Vec<T>) + Send + Sync + 'static) -> Self {
        assert!(size > 0, "accumulator size must be positive");
        Self {
            size,
            serial,
            buffer: Mutex::new(Vec::with_capacity(size)),
            process_lock: Mutex::new(()),
            on_process: Box::new(on_process),
        }
    }

    /// Appends `item` to the buffer. If the buffer has now reached `size`,
    /// the full batch is atomically swapped out and dispatched.
    pub fn add(&self, item: T) {
        let batch = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(item);
            if buffer.len() >= self.size {
                Some(mem::replace(&mut *buffer, Vec::with_capacity(self.size)))
            } else {
                None
            }
        };

        if let Some(batch) = batch {
            self.dispatch(batch);
        }
    }

    /// Dispatches whatever is currently buffered, ignoring the size
    /// threshold. Must be called before teardown to avoid losing a partial
    /// batch.
    pub fn flush(&self) {
        let batch = {
            let mut buffer = self.buffer.lock().unwrap();
            if buffer.is_empty() {
                None
            } else {
                Some(mem::replace(&mut *buffer, Vec::with_capacity(self.size)))
            }
        };

        if let Some(batch) = batch {
            self.dispatch(batch);
        }
    }

    fn dispatch(&self, batch: Vec<T>) {
        if self.serial {
            let _guard = self.process_lock.lock().unwrap();
            (self.on_process)(batch);
        } else {
            (self.on_process)(batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn conserves_every_item_across_threads() {
        let seen_count = Arc::new(AtomicUsize::new(0));
        let seen_count_cb = seen_count.clone();

        let acc = Arc::new(Accumulator::new(5, true, move |batch: Vec<u32>| {
            seen_count_cb.fetch_add(batch.len(), Ordering::SeqCst);
        }));

        let mut handles = Vec::new();
        for t in 0..4u32 {
            let acc = acc.clone();
            handles.push(thread::spawn(move || {
                for i in 0..13 {
                    acc.add(t * 100 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        acc.flush();

        assert_eq!(seen_count.load(Ordering::SeqCst), 4 * 13);
    }

    #[test]
    fn serial_mode_never_overlaps() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let in_flight_cb = in_flight.clone();
        let max_observed_cb = max_observed.clone();
        let acc = Arc::new(Accumulator::new(2, true, move |batch: Vec<u32>| {
            let now = in_flight_cb.fetch_add(1, Ordering::SeqCst) + 1;
            max_observed_cb.fetch_max(now, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(2));
            let _ = batch.len();
            in_flight_cb.fetch_sub(1, Ordering::SeqCst);
        }));

        let mut handles = Vec::new();
        for t in 0..8u32 {
            let acc = acc.clone();
            handles.push(thread::spawn(move || acc.add(t)));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn flush_dispatches_partial_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let acc = Accumulator::new(100, false, move |batch: Vec<u32>| {
            seen_cb.lock().unwrap().extend(batch);
        });

        acc.add(1);
        acc.add(2);
        acc.flush();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
