//! Longitudinal progress tracking.
//!
//! Folds a new session into the patient's score history: overall score,
//! improvement over the most recent prior session, and a qualifying-session
//! streak.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::metrics::{MetricWeights, PerformanceMetrics};
use crate::types::Timestamp;

/// One historical session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub date: Timestamp,
    pub overall_score: f64,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressTracking {
    /// Append-only; includes the session this record belongs to.
    pub previous_scores: Vec<ScoreEntry>,
    pub improvement: f64,
    pub streak: u32,
}

impl ProgressTracking {
    /// The entry with the latest date.
    pub fn latest(&self) -> Option<&ScoreEntry> {
        self.previous_scores.iter().max_by_key(|e| e.date)
    }

    /// Overall scores ordered newest first.
    pub fn recent_overall(&self, count: usize) -> Vec<f64> {
        let mut entries: Vec<&ScoreEntry> = self.previous_scores.iter().collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        entries.into_iter().take(count).map(|e| e.overall_score).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub overall_weights: MetricWeights,
    /// Minimum overall score for a session to extend the streak.
    pub qualifying_score: f64,
    /// Maximum gap in days between qualifying sessions that keeps a streak.
    pub recency_window_days: i64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            overall_weights: MetricWeights::default(),
            qualifying_score: 70.0,
            recency_window_days: 3,
        }
    }
}

impl ProgressConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.overall_weights.validate()?;
        if !(0.0..=100.0).contains(&self.qualifying_score) {
            return Err(CoreError::Configuration(format!(
                "qualifying_score must be between 0 and 100, got {}",
                self.qualifying_score
            )));
        }
        if self.recency_window_days < 0 {
            return Err(CoreError::Configuration(
                "recency_window_days must be non-negative".into(),
            ));
        }
        Ok(())
    }

    pub fn overall_score(&self, metrics: &PerformanceMetrics) -> f64 {
        self.overall_weights.weighted_mean(|n| metrics.get(n))
    }
}

/// Compute progress for a new session dated `now`.
///
/// `prior` is the progress record of the patient's most recent completed
/// analysis, if any. Its history is carried forward with the new entry
/// appended.
pub fn track_progress(
    prior: Option<&ProgressTracking>,
    metrics: &PerformanceMetrics,
    now: Timestamp,
    config: &ProgressConfig,
) -> ProgressTracking {
    let overall = config.overall_score(metrics);
    let previous = prior.and_then(ProgressTracking::latest);

    let improvement = previous.map_or(0.0, |p| overall - p.overall_score);

    let qualifies = overall >= config.qualifying_score;
    let recent = previous.is_some_and(|p| {
        let gap = now - p.date;
        gap >= Duration::zero() && gap <= Duration::days(config.recency_window_days)
    });
    let streak = match (qualifies, recent) {
        (false, _) => 0,
        (true, true) => prior.map_or(0, |p| p.streak).saturating_add(1),
        (true, false) => 1,
    };

    let mut previous_scores = prior.map(|p| p.previous_scores.clone()).unwrap_or_default();
    previous_scores.push(ScoreEntry {
        date: now,
        overall_score: overall,
        metrics: *metrics,
    });

    ProgressTracking {
        previous_scores,
        improvement,
        streak,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
