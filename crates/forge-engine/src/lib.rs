//! The orchestration core: breaker, rate limiter, bounded executor,
//! configuration, and the [`pipeline::WorkPipeline`] supervisor that ties
//! them together (spec §4).

pub mod breaker;
pub mod config;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod pipeline;
pub mod rate_limiter;

pub use breaker::{Breaker, BreakerPoll};
pub use config::PipelineConfig;
pub use error::{HookError, PipelineError, WorkerKind};
pub use executor::{BoundedExecutor, ExecutorShuttingDown};
pub use hooks::{Aborted, AcquireContext, PipelineHooks};
pub use pipeline::WorkPipeline;
pub use rate_limiter::SmoothRateLimiter;
