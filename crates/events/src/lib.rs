//! In-process event bus for analysis lifecycle events.
//!
//! - [`EventBus`] is a publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`AnalysisEvent`] is the event envelope published by the orchestrator.

pub mod bus;

pub use bus::{AnalysisEvent, AnalysisEventKind, EventBus};
