//! Small, standalone concurrency primitives shared by [`forge_engine`] and
//! consumable directly by user code: a batching [`Accumulator`], a
//! background-writer [`FileCollector`], and a rolling [`SuccessTracker`].
//!
//! None of these depend on the pipeline supervisor — they are the
//! "optional building blocks" the wider pipeline is built from.

pub mod accumulator;
pub mod collector;
pub mod success_tracker;

pub use accumulator::Accumulator;
pub use collector::{CollectorError, FileCollector};
pub use success_tracker::SuccessTracker;
