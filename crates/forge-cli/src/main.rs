mod cli;
mod hooks;
mod shutdown;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use forge_engine::{PipelineError, WorkPipeline};

use crate::cli::Cli;
use crate::hooks::LineHooks;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline_config();

    if config.processes == 0 {
        anyhow::bail!("--processes must be >= 1");
    }
    if config.threads == 0 {
        anyhow::bail!("--threads must be >= 1");
    }

    tracing::info!(
        processes = config.processes,
        threads = config.threads,
        queue = config.queue,
        rate = config.rate,
        "starting pipeline"
    );

    let hooks = LineHooks::new(cli.input.clone(), cli.output.clone(), cli.batch_size)?;
    let hooks_for_flush = hooks.clone();

    let pipeline = WorkPipeline::new(config, hooks);
    shutdown::install(pipeline.breaker());

    match pipeline.run() {
        Ok(()) => {
            hooks_for_flush.flush();
            tracing::info!("pipeline finished cleanly");
            Ok(())
        }
        Err(PipelineError::BreakerTripped { reason }) => {
            hooks_for_flush.flush();
            // Returning an error (rather than process::exit) lets `hooks`,
            // `hooks_for_flush`, and `pipeline` drop normally on the way out,
            // so the accumulator's FileCollector still gets its stop()+join
            // and flushes whatever `flush()` just enqueued.
            anyhow::bail!("forge: aborted: {reason}");
        }
        Err(e) => Err(e.into()),
    }
}
