//! Analysis orchestration.
//!
//! [`AnalysisOrchestrator`] drives one analysis per `(videoId, userId)`
//! through the core stages as a Tokio task. [`RunRegistry`] guarantees at
//! most one in-flight run per key; [`AnalysisStore`] is the persistence seam.

pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod store;

pub use error::{PipelineError, StoreError};
pub use orchestrator::{AnalysisOrchestrator, AnalysisRequest, RunHandle};
pub use registry::{PatientGuard, PatientLocks, RunRegistry, RunReservation};
pub use store::{AnalysisStore, InMemoryAnalysisStore};
