use std::path::PathBuf;

use clap::Parser;

use forge_engine::PipelineConfig;

fn default_processes() -> usize {
    PipelineConfig::DEFAULT.processes
}

fn default_threads() -> usize {
    PipelineConfig::DEFAULT.threads
}

fn default_queue() -> usize {
    PipelineConfig::DEFAULT.queue
}

fn default_rate() -> f64 {
    PipelineConfig::DEFAULT.rate
}

#[derive(Debug, Clone, Parser)]
#[command(name = "forge", version, about = "Two-stage acquire/work pipeline runner")]
pub struct Cli {
    /// File to read newline-delimited records from. Omit to read stdin.
    #[arg(long, env = "FORGE_INPUT")]
    pub input: Option<PathBuf>,

    /// File to write accepted records to.
    #[arg(long, env = "FORGE_OUTPUT", default_value = "forge-output.txt")]
    pub output: PathBuf,

    /// Number of work workers `P`.
    #[arg(long, env = "FORGE_PROCESSES", default_value_t = default_processes())]
    pub processes: usize,

    /// Thread-pool size `W` per work worker.
    #[arg(long, env = "FORGE_THREADS", default_value_t = default_threads())]
    pub threads: usize,

    /// Capacity `Q` of the shared work queue.
    #[arg(long, env = "FORGE_QUEUE", default_value_t = default_queue())]
    pub queue: usize,

    /// Target global records-per-second rate, split evenly across workers.
    #[arg(long, env = "FORGE_RATE", default_value_t = default_rate())]
    pub rate: f64,

    /// Accumulate this many accepted records before flushing to the output file.
    #[arg(long, env = "FORGE_BATCH_SIZE", default_value_t = 32)]
    pub batch_size: usize,
}

impl Cli {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            processes: self.processes,
            threads: self.threads,
            queue: self.queue,
            rate: self.rate,
        }
    }
}
