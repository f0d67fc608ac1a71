//! The analysis record and its status lifecycle.
//!
//! An [`Analysis`] is created `pending`, moves to `analyzing` when a run
//! starts, and ends `completed` or `failed`. Once terminal, results are
//! frozen: only feedback may be appended and the plan attribution updated.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::keypoint::Frame;
use crate::metrics::PerformanceMetrics;
use crate::notes::AiNote;
use crate::plan::ExercisePlan;
use crate::progress::ProgressTracking;
use crate::reference::ExerciseType;
use crate::types::{AnalysisId, Timestamp, VideoMillis};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }

    /// Pending or analyzing: a run owns the record.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        matches!(
            (self, next),
            (Pending, Analyzing) | (Pending, Failed) | (Analyzing, Completed) | (Analyzing, Failed)
        )
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Key and feedback
// ---------------------------------------------------------------------------

/// Uniqueness key of an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisKey {
    pub video_id: String,
    pub user_id: String,
}

impl AnalysisKey {
    pub fn new(video_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for AnalysisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.video_id, self.user_id)
    }
}

/// A physiotherapist comment pinned to a point in the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[validate(range(min = 0.0))]
    pub timestamp: VideoMillis,
    #[validate(length(min = 1, max = 4000))]
    pub comment: String,
    #[validate(length(min = 1))]
    pub physiotherapist_id: String,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Everything a successful run attaches to the record.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub keypoints: Vec<Frame>,
    pub metrics: PerformanceMetrics,
    pub repetitions: usize,
    pub injury_risk_score: f64,
    pub notes: Vec<AiNote>,
    pub progress: ProgressTracking,
    pub plan: Option<ExercisePlan>,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    id: AnalysisId,
    video_id: String,
    user_id: String,
    exercise_type: ExerciseType,
    status: AnalysisStatus,
    #[serde(default)]
    keypoints: Vec<Frame>,
    #[serde(default)]
    injury_risk_score: Option<f64>,
    #[serde(default)]
    performance_metrics: Option<PerformanceMetrics>,
    #[serde(default)]
    repetitions: Option<usize>,
    #[serde(default)]
    progress_tracking: Option<ProgressTracking>,
    #[serde(default)]
    ai_notes: Vec<AiNote>,
    #[serde(default)]
    feedback: Vec<Feedback>,
    #[serde(default)]
    exercise_plan: Option<ExercisePlan>,
    #[serde(default)]
    failure_reason: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Analysis {
    /// A new pending record.
    pub fn new(key: AnalysisKey, exercise_type: ExerciseType, now: Timestamp) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            video_id: key.video_id,
            user_id: key.user_id,
            exercise_type,
            status: AnalysisStatus::Pending,
            keypoints: Vec::new(),
            injury_risk_score: None,
            performance_metrics: None,
            repetitions: None,
            progress_tracking: None,
            ai_notes: Vec::new(),
            feedback: Vec::new(),
            exercise_plan: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn id(&self) -> AnalysisId {
        self.id
    }

    pub fn key(&self) -> AnalysisKey {
        AnalysisKey::new(self.video_id.clone(), self.user_id.clone())
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn exercise_type(&self) -> ExerciseType {
        self.exercise_type
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    pub fn keypoints(&self) -> &[Frame] {
        &self.keypoints
    }

    pub fn injury_risk_score(&self) -> Option<f64> {
        self.injury_risk_score
    }

    pub fn performance_metrics(&self) -> Option<&PerformanceMetrics> {
        self.performance_metrics.as_ref()
    }

    pub fn repetitions(&self) -> Option<usize> {
        self.repetitions
    }

    pub fn progress_tracking(&self) -> Option<&ProgressTracking> {
        self.progress_tracking.as_ref()
    }

    pub fn ai_notes(&self) -> &[AiNote] {
        &self.ai_notes
    }

    pub fn feedback(&self) -> &[Feedback] {
        &self.feedback
    }

    pub fn exercise_plan(&self) -> Option<&ExercisePlan> {
        self.exercise_plan.as_ref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    // -- lifecycle ----------------------------------------------------------

    fn transition(&mut self, next: AnalysisStatus, now: Timestamp) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::Frozen(self.status));
        }
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// `pending -> analyzing`.
    pub fn start(&mut self, now: Timestamp) -> Result<(), CoreError> {
        self.transition(AnalysisStatus::Analyzing, now)
    }

    /// `analyzing -> completed`, attaching the results.
    pub fn complete(&mut self, outcome: AnalysisOutcome, now: Timestamp) -> Result<(), CoreError> {
        self.transition(AnalysisStatus::Completed, now)?;
        self.keypoints = outcome.keypoints;
        self.performance_metrics = Some(outcome.metrics);
        self.repetitions = Some(outcome.repetitions);
        self.injury_risk_score = Some(outcome.injury_risk_score);
        self.ai_notes = outcome.notes;
        self.progress_tracking = Some(outcome.progress);
        self.exercise_plan = outcome.plan;
        Ok(())
    }

    /// `pending | analyzing -> failed`, recording why.
    pub fn fail(&mut self, reason: impl Into<String>, now: Timestamp) -> Result<(), CoreError> {
        self.transition(AnalysisStatus::Failed, now)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Append physiotherapist feedback. Allowed in any status.
    pub fn append_feedback(&mut self, feedback: Feedback, now: Timestamp) -> Result<(), CoreError> {
        feedback
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        self.feedback.push(feedback);
        self.updated_at = now;
        Ok(())
    }

    /// Record who last touched the exercise plan.
    pub fn attribute_plan(&mut self, updated_by: impl Into<String>, now: Timestamp) -> Result<(), CoreError> {
        let updated_by = updated_by.into();
        if updated_by.trim().is_empty() {
            return Err(CoreError::Validation("updated_by must not be empty".into()));
        }
        let Some(plan) = self.exercise_plan.as_mut() else {
            return Err(CoreError::Validation(format!(
                "analysis {} has no exercise plan",
                self.id
            )));
        };
        plan.updated_by = updated_by;
        plan.last_updated = now;
        self.updated_at = now;
        Ok(())
    }

    /// A fresh pending record replacing this failed one. Feedback carries
    /// over; results and the failure reason do not.
    pub fn resubmit_from_failed(
        &self,
        exercise_type: ExerciseType,
        now: Timestamp,
    ) -> Result<Analysis, CoreError> {
        if self.status != AnalysisStatus::Failed {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: AnalysisStatus::Pending,
            });
        }
        let mut fresh = Analysis::new(self.key(), exercise_type, now);
        fresh.feedback = self.feedback.clone();
        Ok(fresh)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
