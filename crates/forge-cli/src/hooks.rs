//! Demonstration [`PipelineHooks`] implementation: acquires newline-delimited
//! records from a file or stdin, accumulates the accepted ones, and flushes
//! batches to an output file via [`FileCollector`].

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use forge_core::{Accumulator, FileCollector};
use forge_engine::{AcquireContext, HookError, PipelineHooks};

/// Reads lines, hands accepted (non-blank) ones to an [`Accumulator`] that
/// flushes batches into a [`FileCollector`]-backed output file.
pub struct LineHooks {
    input: Option<PathBuf>,
    accumulator: Arc<Accumulator<String>>,
}

impl Clone for LineHooks {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            accumulator: self.accumulator.clone(),
        }
    }
}

impl LineHooks {
    /// Starts the output-side file collector and wires an accumulator that
    /// flushes to it every `batch_size` accepted records.
    pub fn new(input: Option<PathBuf>, output: PathBuf, batch_size: usize) -> io::Result<Self> {
        let collector = FileCollector::start(output, 1024).map_err(io::Error::other)?;

        let accumulator = Accumulator::new(batch_size, false, move |batch: Vec<String>| {
            for line in batch {
                if let Err(e) = collector.collect(line) {
                    tracing::error!(error = %e, "failed to forward an accumulated record to the file collector");
                }
            }
        });

        Ok(Self {
            input,
            accumulator: Arc::new(accumulator),
        })
    }

    /// Flushes any partial batch still sitting below the threshold. Call
    /// once, after the pipeline has finished running.
    pub fn flush(&self) {
        self.accumulator.flush();
    }
}

impl PipelineHooks for LineHooks {
    type Item = String;

    fn acquire_work(&self, ctx: &AcquireContext<Self::Item>) -> Result<(), HookError> {
        match &self.input {
            Some(path) => {
                let reader = BufReader::new(File::open(path)?);
                for line in reader.lines() {
                    ctx.distribute(line?)?;
                }
            }
            None => {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    ctx.distribute(line?)?;
                }
            }
        }
        Ok(())
    }

    fn on_work(&self, item: Self::Item) -> Result<(), HookError> {
        let record = item.trim();
        if record.is_empty() {
            return Ok(());
        }
        self.accumulator.add(record.to_string());
        Ok(())
    }
}
