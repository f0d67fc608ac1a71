//! Batch analysis worker.
//!
//! Loads configuration from the environment, reads keypoint job files from
//! a directory, runs them through the orchestrator with bounded parallelism,
//! and writes one JSON record per analysis.

pub mod config;
pub mod error;
pub mod job;
pub mod runner;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use runner::{run_jobs, RunSummary};
