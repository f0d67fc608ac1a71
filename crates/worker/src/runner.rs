//! Batch execution of job files.
//!
//! Jobs for the same patient run one after another, ordered by session
//! date, so each run sees the previous session's progress. Different
//! patients run in parallel, bounded by a semaphore.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use physio_core::analysis::AnalysisStatus;
use physio_pipeline::{AnalysisOrchestrator, PipelineError};
use tokio::sync::Semaphore;

use crate::job::{write_record, JobFile};

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    /// Submissions refused by the orchestrator (already running or done).
    pub rejected: usize,
    /// Records that finished but could not be written.
    pub write_errors: usize,
}

impl RunSummary {
    fn merge(mut self, other: RunSummary) -> Self {
        self.completed += other.completed;
        self.failed += other.failed;
        self.rejected += other.rejected;
        self.write_errors += other.write_errors;
        self
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed + self.rejected
    }
}

/// Run every job and write its record into `output_dir`.
pub async fn run_jobs(
    orchestrator: Arc<AnalysisOrchestrator>,
    jobs: Vec<JobFile>,
    output_dir: &Path,
    max_concurrent: usize,
) -> RunSummary {
    let mut by_user: BTreeMap<String, Vec<JobFile>> = BTreeMap::new();
    for job in jobs {
        by_user.entry(job.request.user_id.clone()).or_default().push(job);
    }
    tracing::info!(patients = by_user.len(), max_concurrent, "Starting analysis batch");

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let batches = by_user.into_values().map(|mut user_jobs| {
        // Stable sort: undated jobs keep file order and run first.
        user_jobs.sort_by_key(|j| j.request.session_date);
        let orchestrator = Arc::clone(&orchestrator);
        let semaphore = Arc::clone(&semaphore);
        async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return RunSummary::default();
            };
            let mut summary = RunSummary::default();
            for job in user_jobs {
                summary = summary.merge(run_one(&orchestrator, job, output_dir).await);
            }
            summary
        }
    });

    let summary = join_all(batches)
        .await
        .into_iter()
        .fold(RunSummary::default(), RunSummary::merge);
    tracing::info!(
        completed = summary.completed,
        failed = summary.failed,
        rejected = summary.rejected,
        write_errors = summary.write_errors,
        "Analysis batch finished",
    );
    summary
}

async fn run_one(orchestrator: &Arc<AnalysisOrchestrator>, job: JobFile, output_dir: &Path) -> RunSummary {
    let mut summary = RunSummary::default();
    let analysis = match orchestrator.analyze(job.request).await {
        Ok(analysis) => analysis,
        Err(e @ (PipelineError::ConcurrentRunRejected(_) | PipelineError::AlreadyCompleted(_))) => {
            tracing::warn!(job = %job.path.display(), error = %e, "Job rejected");
            summary.rejected += 1;
            return summary;
        }
        Err(e) => {
            tracing::error!(job = %job.path.display(), error = %e, "Job could not be run");
            summary.failed += 1;
            return summary;
        }
    };

    match analysis.status() {
        AnalysisStatus::Completed => summary.completed += 1,
        _ => summary.failed += 1,
    }
    match write_record(output_dir, &analysis).await {
        Ok(path) => tracing::debug!(record = %path.display(), "Record written"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to write analysis record");
            summary.write_errors += 1;
        }
    }
    summary
}
