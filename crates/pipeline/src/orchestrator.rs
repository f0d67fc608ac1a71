//! Analysis orchestrator.
//!
//! Each submission becomes one Tokio task that walks the record through
//! `pending -> analyzing -> completed | failed`. Stages run sequentially;
//! cancellation is checked between them. Lifecycle events go out on the
//! [`EventBus`] and every transition is logged. Runs for the same patient
//! take turns extending the score history; see [`PatientLocks`].

use std::sync::Arc;

use chrono::Utc;
use physio_core::analysis::{Analysis, AnalysisKey, AnalysisOutcome, AnalysisStatus, Feedback};
use physio_core::error::{AnalysisError, CoreError};
use physio_core::keypoint::RawFrame;
use physio_core::kinematics::Kinematics;
use physio_core::metrics::extract_metrics;
use physio_core::notes::generate_notes;
use physio_core::plan::{adapt_plan, PlanSignals};
use physio_core::progress::{track_progress, ProgressConfig};
use physio_core::reference::{ExerciseType, ProfileLibrary};
use physio_core::risk::{classify_risk, score_risk};
use physio_core::sequence::build_sequence;
use physio_core::types::{AnalysisId, Timestamp};
use physio_events::{AnalysisEvent, AnalysisEventKind, EventBus};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::error::PipelineError;
use crate::registry::{PatientGuard, PatientLocks, RunRegistry, RunReservation};
use crate::store::AnalysisStore;

// ---------------------------------------------------------------------------
// Request and handle
// ---------------------------------------------------------------------------

/// One video's keypoints submitted for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[validate(length(min = 1, max = 256))]
    pub video_id: String,
    #[validate(length(min = 1, max = 256))]
    pub user_id: String,
    pub exercise_type: ExerciseType,
    pub frames: Vec<RawFrame>,
    /// Session date for progress tracking. Defaults to the completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_date: Option<Timestamp>,
}

impl AnalysisRequest {
    pub fn key(&self) -> AnalysisKey {
        AnalysisKey::new(self.video_id.clone(), self.user_id.clone())
    }
}

/// Handle to a submitted run.
#[derive(Debug)]
pub struct RunHandle {
    analysis_id: AnalysisId,
    key: AnalysisKey,
    cancel: CancellationToken,
    join: JoinHandle<Result<Analysis, PipelineError>>,
}

impl RunHandle {
    pub fn analysis_id(&self) -> AnalysisId {
        self.analysis_id
    }

    pub fn key(&self) -> &AnalysisKey {
        &self.key
    }

    /// Request cancellation. The run records `failed` at its next stage
    /// boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run and return the final record (completed or failed).
    pub async fn join(self) -> Result<Analysis, PipelineError> {
        self.join
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct AnalysisOrchestrator {
    store: Arc<dyn AnalysisStore>,
    profiles: Arc<ProfileLibrary>,
    events: Arc<EventBus>,
    registry: Arc<RunRegistry>,
    patients: PatientLocks,
    progress: ProgressConfig,
}

impl AnalysisOrchestrator {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        profiles: Arc<ProfileLibrary>,
        events: Arc<EventBus>,
        progress: ProgressConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            profiles,
            events,
            registry: RunRegistry::new(),
            patients: PatientLocks::new(),
            progress,
        })
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.store
    }

    /// Whether a run currently holds `key`.
    pub fn is_active(&self, key: &AnalysisKey) -> bool {
        self.registry.is_active(key)
    }

    /// Create (or recreate, after a failure) the record for `request` and
    /// start its run.
    ///
    /// Rejected without touching the store when a run for the same key is
    /// pending or analyzing, or when the key already completed.
    pub async fn submit(self: &Arc<Self>, request: AnalysisRequest) -> Result<RunHandle, PipelineError> {
        request
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        let key = request.key();

        let Some(reservation) = self.registry.try_reserve(&key) else {
            tracing::warn!(key = %key, "Rejected concurrent analysis submission");
            return Err(PipelineError::ConcurrentRunRejected(key));
        };

        let now = Utc::now();
        let record = match self.store.get(&key).await? {
            None => Analysis::new(key.clone(), request.exercise_type, now),
            Some(existing) => match existing.status() {
                AnalysisStatus::Failed => {
                    tracing::info!(key = %key, previous_id = %existing.id(), "Resubmitting failed analysis");
                    existing.resubmit_from_failed(request.exercise_type, now)?
                }
                AnalysisStatus::Completed => return Err(PipelineError::AlreadyCompleted(key)),
                AnalysisStatus::Pending | AnalysisStatus::Analyzing => {
                    return Err(PipelineError::ConcurrentRunRejected(key))
                }
            },
        };
        let analysis_id = record.id();
        self.store.put(record).await?;

        tracing::info!(
            analysis_id = %analysis_id,
            key = %key,
            exercise = %request.exercise_type,
            frames = request.frames.len(),
            "Analysis submitted",
        );

        let cancel = reservation.token().clone();
        let this = Arc::clone(self);
        let join = tokio::spawn(async move { this.run(reservation, request).await });

        Ok(RunHandle {
            analysis_id,
            key,
            cancel,
            join,
        })
    }

    /// Submit and wait for the final record.
    pub async fn analyze(self: &Arc<Self>, request: AnalysisRequest) -> Result<Analysis, PipelineError> {
        self.submit(request).await?.join().await
    }

    /// Cancel the run for `key`, if any.
    pub fn cancel(&self, key: &AnalysisKey) -> bool {
        let found = self.registry.cancel(key);
        if found {
            tracing::info!(key = %key, "Analysis cancellation requested");
        }
        found
    }

    /// Cancel every in-flight run.
    pub fn cancel_all(&self) -> usize {
        let count = self.registry.cancel_all();
        tracing::info!(count, "Cancelling all in-flight analyses");
        count
    }

    pub async fn get(&self, key: &AnalysisKey) -> Result<Analysis, PipelineError> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| PipelineError::NotFound(key.clone()))
    }

    /// Append physiotherapist feedback. Allowed in any status.
    pub async fn append_feedback(&self, key: &AnalysisKey, feedback: Feedback) -> Result<Analysis, PipelineError> {
        let updated = self
            .store
            .update(key, Box::new(move |a: &mut Analysis| a.append_feedback(feedback, Utc::now())))
            .await?;
        tracing::debug!(key = %key, count = updated.feedback().len(), "Feedback appended");
        Ok(updated)
    }

    /// Record who last touched the analysis' exercise plan.
    pub async fn attribute_plan(&self, key: &AnalysisKey, updated_by: &str) -> Result<Analysis, PipelineError> {
        let by = updated_by.to_string();
        let updated = self
            .store
            .update(key, Box::new(move |a: &mut Analysis| a.attribute_plan(by, Utc::now())))
            .await?;
        Ok(updated)
    }

    // -- run ----------------------------------------------------------------

    async fn run(self: Arc<Self>, reservation: RunReservation, request: AnalysisRequest) -> Result<Analysis, PipelineError> {
        let key = reservation.key().clone();
        let token = reservation.token().clone();

        let started = match self
            .store
            .update(&key, Box::new(|a: &mut Analysis| a.start(Utc::now())))
            .await
        {
            Ok(started) => started,
            Err(e) => return self.record_failure(&key, e.into()).await,
        };
        self.events
            .publish(AnalysisEvent::new(AnalysisEventKind::Started, started.id(), &key));
        tracing::info!(analysis_id = %started.id(), key = %key, "Analysis started");

        let finished = match self.execute(&key, &request, &token).await {
            Ok((outcome, patient)) => {
                let completed = self
                    .store
                    .update(&key, Box::new(move |a: &mut Analysis| a.complete(outcome, Utc::now())))
                    .await;
                drop(patient);
                match completed {
                    Ok(done) => {
                        let risk = done.injury_risk_score().unwrap_or_default();
                        tracing::info!(
                            analysis_id = %done.id(),
                            key = %key,
                            injury_risk_score = risk,
                            notes = done.ai_notes().len(),
                            "Analysis completed",
                        );
                        self.events.publish(
                            AnalysisEvent::new(AnalysisEventKind::Completed, done.id(), &key).with_payload(
                                serde_json::json!({
                                    "injuryRiskScore": risk,
                                    "repetitions": done.repetitions(),
                                    "notes": done.ai_notes().len(),
                                }),
                            ),
                        );
                        done
                    }
                    Err(e) => self.record_failure(&key, e.into()).await?,
                }
            }
            Err(err) => self.record_failure(&key, err).await?,
        };

        // The key is released only after the final record is stored.
        drop(reservation);
        Ok(finished)
    }

    /// Store `err` as the record's failure reason and announce it.
    ///
    /// When even that write fails the original error is returned and the
    /// record keeps its last stored status.
    async fn record_failure(&self, key: &AnalysisKey, err: PipelineError) -> Result<Analysis, PipelineError> {
        let reason = err.to_string();
        let stored_reason = reason.clone();
        let failed = match self
            .store
            .update(key, Box::new(move |a: &mut Analysis| a.fail(stored_reason, Utc::now())))
            .await
        {
            Ok(failed) => failed,
            Err(store_err) => {
                tracing::error!(key = %key, reason = %reason, error = %store_err, "Failed to record analysis failure");
                return Err(err);
            }
        };
        tracing::warn!(analysis_id = %failed.id(), key = %key, reason = %reason, "Analysis failed");
        self.events.publish(
            AnalysisEvent::new(AnalysisEventKind::Failed, failed.id(), key)
                .with_payload(serde_json::json!({ "reason": reason })),
        );
        Ok(failed)
    }

    async fn execute(
        &self,
        key: &AnalysisKey,
        request: &AnalysisRequest,
        token: &CancellationToken,
    ) -> Result<(AnalysisOutcome, PatientGuard), PipelineError> {
        let profile = self.profiles.get(request.exercise_type)?;
        checkpoint(token).await?;

        let (sequence, report) =
            build_sequence(&request.frames, &profile.required_joints, profile.min_confidence)?;
        tracing::debug!(
            key = %key,
            received = report.received,
            kept = report.kept,
            dropped = report.dropped_total(),
            ignored_keypoints = report.ignored_keypoints,
            "Keypoint sequence built",
        );
        checkpoint(token).await?;

        let kinematics = Kinematics::compute(&sequence, &profile.reference);
        let metrics = extract_metrics(&sequence, &kinematics, profile);
        for degenerate in &metrics.degenerate {
            tracing::warn!(key = %key, metric = %degenerate.metric, reason = degenerate.reason, "Metric fell back to neutral score");
        }
        checkpoint(token).await?;

        let notes = generate_notes(&sequence, &kinematics, profile);
        let risk = score_risk(&metrics.metrics, &notes, &profile.risk);
        let risk_level = classify_risk(risk, &profile.risk);
        checkpoint(token).await?;

        // Held by the caller until the completed record is stored.
        let patient = self.patients.acquire(&key.user_id).await;
        checkpoint(token).await?;
        let prior = self.store.latest_completed_for_user(&key.user_id).await?;
        let now = request.session_date.unwrap_or_else(Utc::now);
        let progress = track_progress(
            prior.as_ref().and_then(|a| a.progress_tracking()),
            &metrics.metrics,
            now,
            &self.progress,
        );
        let adjustment = adapt_plan(
            prior.as_ref().and_then(|a| a.exercise_plan()),
            PlanSignals {
                exercise: request.exercise_type,
                risk_level,
                metrics: &metrics.metrics,
                progress: &progress,
            },
            &profile.plan,
            now,
        );
        if adjustment.changed {
            tracing::info!(
                key = %key,
                escalated = adjustment.escalated,
                difficulty = %adjustment.plan.difficulty,
                added_focus = adjustment.added_focus.len(),
                "Exercise plan adjusted",
            );
        }
        checkpoint(token).await?;

        let outcome = AnalysisOutcome {
            keypoints: sequence.frames().to_vec(),
            metrics: metrics.metrics,
            repetitions: metrics.repetitions.len(),
            injury_risk_score: risk,
            notes,
            progress,
            plan: Some(adjustment.plan),
        };
        Ok((outcome, patient))
    }
}

/// Yield to the runtime, then bail out if the run was cancelled.
async fn checkpoint(token: &CancellationToken) -> Result<(), AnalysisError> {
    tokio::task::yield_now().await;
    if token.is_cancelled() {
        return Err(AnalysisError::Cancelled("cancelled by request".into()));
    }
    Ok(())
}
