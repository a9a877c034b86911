//! Ctrl-C handling, expressed synchronously since this binary has no async
//! runtime: interrupts are delivered straight into the breaker rather than
//! routed through a channel and an event loop.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use forge_engine::Breaker;

/// Installs a Ctrl-C handler that trips `breaker` on the first interrupt and
/// force-exits the process on a second one.
pub fn install(breaker: Breaker) {
    let presses = Arc::new(AtomicU8::new(0));
    let result = ctrlc::set_handler(move || {
        let n = presses.fetch_add(1, Ordering::SeqCst) + 1;
        if n == 1 {
            tracing::warn!("interrupt received, tripping breaker and draining in-flight work");
            breaker.trip("interrupted (SIGINT)");
        } else {
            tracing::warn!("second interrupt received, exiting immediately");
            std::process::exit(130);
        }
    });

    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler, interrupts will not be handled gracefully");
    }
}
