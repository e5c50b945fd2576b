//! Orchestration over the browser layer: the sequential per-account loop,
//! result renderers, downstream sinks, and the fixed-delay daemon.

pub mod acquire;
pub mod daemon;
pub mod orchestrator;
pub mod report;
pub mod sinks;

pub use acquire::BrowserAcquirer;
pub use orchestrator::{AcquireOutcome, Acquirer, Orchestrator};
