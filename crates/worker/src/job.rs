//! Job files in, analysis records out.
//!
//! A job file is one JSON [`AnalysisRequest`]
//! (`{videoId, userId, exerciseType, frames, sessionDate?}`). Records are
//! written as `<videoId>_<userId>.json` in the output directory.

use std::path::{Path, PathBuf};

use physio_core::analysis::Analysis;
use physio_pipeline::AnalysisRequest;

use crate::error::WorkerError;

/// A parsed job and the file it came from.
#[derive(Debug, Clone)]
pub struct JobFile {
    pub path: PathBuf,
    pub request: AnalysisRequest,
}

/// Read every `*.json` job in `dir`, in file-name order.
///
/// Files that fail to parse are logged and skipped; a missing or unreadable
/// directory is an error.
pub async fn load_jobs(dir: &Path) -> Result<Vec<JobFile>, WorkerError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| WorkerError::io(dir, e))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| WorkerError::io(dir, e))? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut jobs = Vec::with_capacity(paths.len());
    for path in paths {
        match read_job(&path).await {
            Ok(request) => jobs.push(JobFile { path, request }),
            Err(e) => tracing::warn!(error = %e, "Skipping unreadable job file"),
        }
    }
    Ok(jobs)
}

async fn read_job(path: &Path) -> Result<AnalysisRequest, WorkerError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| WorkerError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| WorkerError::json(path, e))
}

/// File name for a record: `<videoId>_<userId>.json`, with anything outside
/// `[A-Za-z0-9-]` replaced by `-`.
pub fn record_file_name(analysis: &Analysis) -> String {
    format!(
        "{}_{}.json",
        sanitize(analysis.video_id()),
        sanitize(analysis.user_id())
    )
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Write `analysis` as pretty JSON into `dir`, creating it if needed.
pub async fn write_record(dir: &Path, analysis: &Analysis) -> Result<PathBuf, WorkerError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| WorkerError::io(dir, e))?;
    let path = dir.join(record_file_name(analysis));
    let json = serde_json::to_vec_pretty(analysis).map_err(|e| WorkerError::json(&path, e))?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| WorkerError::io(&path, e))?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
