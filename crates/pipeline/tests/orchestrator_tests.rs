//! Orchestrator lifecycle tests against the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use tokio::sync::Semaphore;

use physio_core::analysis::{Analysis, AnalysisKey, AnalysisStatus, Feedback};
use physio_core::keypoint::{RawFrame, RawKeypoint};
use physio_core::plan::SYSTEM_AUTHOR;
use physio_core::progress::ProgressConfig;
use physio_core::reference::{ExerciseType, ProfileLibrary};
use physio_core::types::Timestamp;
use physio_events::{AnalysisEventKind, EventBus};
use physio_pipeline::store::UpdateFn;
use physio_pipeline::{
    AnalysisOrchestrator, AnalysisRequest, AnalysisStore, InMemoryAnalysisStore, PipelineError,
    StoreError,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn kp(name: String, x: f64, y: f64) -> RawKeypoint {
    RawKeypoint {
        name,
        x,
        y,
        z: 0.0,
        confidence: 0.9,
    }
}

/// Squat frames: knee and hip angles follow 170 -> 90 -> 170 every 10 frames.
fn squat_frames(count: usize) -> Vec<RawFrame> {
    (0..count)
        .map(|i| {
            let k = (i % 10) as f64;
            let angle: f64 = if k <= 5.0 { 170.0 - 16.0 * k } else { 90.0 + 16.0 * (k - 5.0) };
            let (s, c) = angle.to_radians().sin_cos();
            let mut keypoints = Vec::new();
            for (side, x) in [("left", 0.4), ("right", 0.6)] {
                let (ax, ay) = (x, 0.9);
                let (kx, ky) = (ax, ay - 0.4);
                let (hx, hy) = (kx + 0.4 * s, ky + 0.4 * c);
                // Torso: the thigh direction reversed, rotated by the same angle.
                let (dx, dy) = (-s, -c);
                let (tx, ty) = (dx * c - dy * s, dx * s + dy * c);
                keypoints.push(kp(format!("{side}_ankle"), ax, ay));
                keypoints.push(kp(format!("{side}_knee"), kx, ky));
                keypoints.push(kp(format!("{side}_hip"), hx, hy));
                keypoints.push(kp(format!("{side}_shoulder"), hx + 0.5 * tx, hy + 0.5 * ty));
            }
            RawFrame {
                timestamp: i as f64 * 300.0,
                keypoints,
            }
        })
        .collect()
}

fn request(video: &str, user: &str, frames: Vec<RawFrame>) -> AnalysisRequest {
    AnalysisRequest {
        video_id: video.into(),
        user_id: user.into(),
        exercise_type: ExerciseType::Squat,
        frames,
        session_date: None,
    }
}

fn orchestrator_with(store: Arc<dyn AnalysisStore>, profiles: ProfileLibrary) -> (Arc<AnalysisOrchestrator>, Arc<EventBus>) {
    let bus = Arc::new(EventBus::default());
    let orch = AnalysisOrchestrator::new(store, Arc::new(profiles), Arc::clone(&bus), ProgressConfig::default());
    (orch, bus)
}

fn orchestrator() -> (Arc<AnalysisOrchestrator>, Arc<EventBus>) {
    orchestrator_with(Arc::new(InMemoryAnalysisStore::new()), ProfileLibrary::builtin())
}

fn feedback(comment: &str) -> Feedback {
    Feedback {
        timestamp: 900.0,
        comment: comment.into(),
        physiotherapist_id: "physio-1".into(),
        created_at: Utc::now(),
    }
}

/// Store whose updates wait for a permit, to hold a run in `pending` (no
/// permits) or `analyzing` (one permit, for the start).
struct GatedStore {
    inner: InMemoryAnalysisStore,
    gate: Semaphore,
}

impl GatedStore {
    fn new() -> Arc<Self> {
        Self::with_permits(0)
    }

    fn with_permits(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryAnalysisStore::new(),
            gate: Semaphore::new(permits),
        })
    }

    fn open(&self) {
        self.gate.add_permits(1000);
    }
}

#[async_trait]
impl AnalysisStore for GatedStore {
    async fn get(&self, key: &AnalysisKey) -> Result<Option<Analysis>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, analysis: Analysis) -> Result<(), StoreError> {
        self.inner.put(analysis).await
    }

    async fn update(&self, key: &AnalysisKey, f: UpdateFn) -> Result<Analysis, StoreError> {
        self.gate
            .acquire()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .forget();
        self.inner.update(key, f).await
    }

    async fn latest_completed_for_user(&self, user_id: &str) -> Result<Option<Analysis>, StoreError> {
        self.inner.latest_completed_for_user(user_id).await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Analysis>, StoreError> {
        self.inner.list_for_user(user_id).await
    }
}

/// Store that rejects exactly one update, counted from zero.
struct FlakyStore {
    inner: InMemoryAnalysisStore,
    fail_on: usize,
    updates: AtomicUsize,
}

impl FlakyStore {
    fn failing_update(fail_on: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryAnalysisStore::new(),
            fail_on,
            updates: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AnalysisStore for FlakyStore {
    async fn get(&self, key: &AnalysisKey) -> Result<Option<Analysis>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, analysis: Analysis) -> Result<(), StoreError> {
        self.inner.put(analysis).await
    }

    async fn update(&self, key: &AnalysisKey, f: UpdateFn) -> Result<Analysis, StoreError> {
        if self.updates.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(StoreError::Backend("transient write failure".into()));
        }
        self.inner.update(key, f).await
    }

    async fn latest_completed_for_user(&self, user_id: &str) -> Result<Option<Analysis>, StoreError> {
        self.inner.latest_completed_for_user(user_id).await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Analysis>, StoreError> {
        self.inner.list_for_user(user_id).await
    }
}

/// Store with a slow history lookup that records how many lookups overlap.
struct SlowHistoryStore {
    inner: InMemoryAnalysisStore,
    in_flight: AtomicUsize,
    max_overlap: AtomicUsize,
}

impl SlowHistoryStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryAnalysisStore::new(),
            in_flight: AtomicUsize::new(0),
            max_overlap: AtomicUsize::new(0),
        })
    }

    fn max_overlap(&self) -> usize {
        self.max_overlap.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisStore for SlowHistoryStore {
    async fn get(&self, key: &AnalysisKey) -> Result<Option<Analysis>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, analysis: Analysis) -> Result<(), StoreError> {
        self.inner.put(analysis).await
    }

    async fn update(&self, key: &AnalysisKey, f: UpdateFn) -> Result<Analysis, StoreError> {
        self.inner.update(key, f).await
    }

    async fn latest_completed_for_user(&self, user_id: &str) -> Result<Option<Analysis>, StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_overlap.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let result = self.inner.latest_completed_for_user(user_id).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Analysis>, StoreError> {
        self.inner.list_for_user(user_id).await
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completes_and_publishes_lifecycle_events() {
    let (orch, bus) = orchestrator();
    let mut rx = bus.subscribe();

    let analysis = orch.analyze(request("v1", "u1", squat_frames(30))).await.unwrap();

    assert_eq!(analysis.status(), AnalysisStatus::Completed);
    assert_eq!(analysis.repetitions(), Some(3));
    let risk = analysis.injury_risk_score().unwrap();
    assert!((0.0..=100.0).contains(&risk));
    let progress = analysis.progress_tracking().unwrap();
    assert_eq!(progress.improvement, 0.0);
    assert_eq!(progress.previous_scores.len(), 1);
    assert_eq!(analysis.exercise_plan().unwrap().updated_by, SYSTEM_AUTHOR);
    assert!(!orch.is_active(&analysis.key()));

    assert_eq!(rx.recv().await.unwrap().kind, AnalysisEventKind::Started);
    let completed = rx.recv().await.unwrap();
    assert_eq!(completed.kind, AnalysisEventKind::Completed);
    assert_eq!(completed.analysis_id, analysis.id());
}

#[tokio::test]
async fn insufficient_data_fails_the_record() {
    let (orch, bus) = orchestrator();
    let mut rx = bus.subscribe();

    let analysis = orch.analyze(request("v1", "u1", squat_frames(1))).await.unwrap();

    assert_eq!(analysis.status(), AnalysisStatus::Failed);
    assert!(analysis.failure_reason().unwrap().contains("Insufficient data"));
    assert!(analysis.performance_metrics().is_none());
    assert_eq!(rx.recv().await.unwrap().kind, AnalysisEventKind::Started);
    assert_eq!(rx.recv().await.unwrap().kind, AnalysisEventKind::Failed);
}

#[tokio::test]
async fn missing_profile_fails_the_record() {
    let (orch, _bus) = orchestrator_with(Arc::new(InMemoryAnalysisStore::new()), ProfileLibrary::empty());
    let analysis = orch.analyze(request("v1", "u1", squat_frames(30))).await.unwrap();
    assert_eq!(analysis.status(), AnalysisStatus::Failed);
    assert!(analysis.failure_reason().unwrap().contains("squat"));
}

#[tokio::test]
async fn invalid_request_is_rejected_before_any_record() {
    let (orch, _bus) = orchestrator();
    let result = orch.submit(request("", "u1", squat_frames(30))).await;
    assert_matches!(result, Err(PipelineError::Core(_)));
    assert!(orch.store().list_for_user("u1").await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Concurrency and resubmission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_submission_is_rejected_and_leaves_record_unchanged() {
    let store = GatedStore::new();
    let (orch, _bus) = orchestrator_with(store.clone(), ProfileLibrary::builtin());
    let key = AnalysisKey::new("v1", "u1");

    let first = orch.submit(request("v1", "u1", squat_frames(30))).await.unwrap();
    let before = orch.get(&key).await.unwrap();
    assert_eq!(before.status(), AnalysisStatus::Pending);

    let second = orch.submit(request("v1", "u1", squat_frames(30))).await;
    assert_matches!(second, Err(PipelineError::ConcurrentRunRejected(k)) if k == key);
    assert_eq!(orch.get(&key).await.unwrap(), before);

    store.open();
    let done = first.join().await.unwrap();
    assert_eq!(done.status(), AnalysisStatus::Completed);
    assert_eq!(done.id(), before.id());
}

#[tokio::test]
async fn submission_while_analyzing_is_rejected_and_leaves_record_unchanged() {
    let store = GatedStore::with_permits(1);
    let (orch, _bus) = orchestrator_with(store.clone(), ProfileLibrary::builtin());
    let key = AnalysisKey::new("v1", "u1");

    let first = orch.submit(request("v1", "u1", squat_frames(30))).await.unwrap();
    let before = tokio::time::timeout(StdDuration::from_secs(5), async {
        loop {
            let current = orch.get(&key).await.unwrap();
            if current.status() == AnalysisStatus::Analyzing {
                break current;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let second = orch.submit(request("v1", "u1", squat_frames(30))).await;
    assert_matches!(second, Err(PipelineError::ConcurrentRunRejected(k)) if k == key);
    assert_eq!(orch.get(&key).await.unwrap(), before);

    store.open();
    let done = first.join().await.unwrap();
    assert_eq!(done.status(), AnalysisStatus::Completed);
    assert_eq!(done.id(), before.id());
}

#[tokio::test]
async fn stored_active_record_without_a_run_is_rejected() {
    let store = Arc::new(InMemoryAnalysisStore::new());
    let key = AnalysisKey::new("v1", "u1");
    let mut stale = Analysis::new(key.clone(), ExerciseType::Squat, Utc::now());
    stale.start(Utc::now()).unwrap();
    store.put(stale.clone()).await.unwrap();
    let (orch, _bus) = orchestrator_with(store, ProfileLibrary::builtin());

    let result = orch.submit(request("v1", "u1", squat_frames(30))).await;
    assert_matches!(result, Err(PipelineError::ConcurrentRunRejected(k)) if k == key);
    assert_eq!(orch.get(&key).await.unwrap(), stale);
    assert!(!orch.is_active(&key));
}

#[tokio::test]
async fn completed_key_cannot_be_resubmitted() {
    let (orch, _bus) = orchestrator();
    orch.analyze(request("v1", "u1", squat_frames(30))).await.unwrap();
    let again = orch.submit(request("v1", "u1", squat_frames(30))).await;
    assert_matches!(again, Err(PipelineError::AlreadyCompleted(_)));
}

#[tokio::test]
async fn failed_key_restarts_with_feedback_carried_over() {
    let (orch, _bus) = orchestrator();
    let key = AnalysisKey::new("v1", "u1");

    let failed = orch.analyze(request("v1", "u1", squat_frames(1))).await.unwrap();
    orch.append_feedback(&key, feedback("Please film from the side")).await.unwrap();

    let retried = orch.analyze(request("v1", "u1", squat_frames(30))).await.unwrap();
    assert_eq!(retried.status(), AnalysisStatus::Completed);
    assert_ne!(retried.id(), failed.id());
    assert_eq!(retried.feedback().len(), 1);
    assert_eq!(retried.failure_reason(), None);
}

#[tokio::test]
async fn cancellation_fails_the_run_and_discards_results() {
    let store = GatedStore::new();
    let (orch, bus) = orchestrator_with(store.clone(), ProfileLibrary::builtin());
    let mut rx = bus.subscribe();

    let handle = orch.submit(request("v1", "u1", squat_frames(30))).await.unwrap();
    assert!(orch.cancel(handle.key()));
    store.open();

    let analysis = handle.join().await.unwrap();
    assert_eq!(analysis.status(), AnalysisStatus::Failed);
    assert!(analysis.failure_reason().unwrap().contains("cancelled"));
    assert!(analysis.performance_metrics().is_none());
    assert!(analysis.ai_notes().is_empty());
    assert_eq!(rx.recv().await.unwrap().kind, AnalysisEventKind::Started);
    assert_eq!(rx.recv().await.unwrap().kind, AnalysisEventKind::Failed);
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_failure_at_completion_is_recorded_as_failed() {
    let (orch, bus) = orchestrator_with(FlakyStore::failing_update(1), ProfileLibrary::builtin());
    let mut rx = bus.subscribe();
    let key = AnalysisKey::new("v1", "u1");

    let analysis = orch.analyze(request("v1", "u1", squat_frames(30))).await.unwrap();
    assert_eq!(analysis.status(), AnalysisStatus::Failed);
    assert!(analysis.failure_reason().unwrap().contains("transient write failure"));
    assert!(analysis.performance_metrics().is_none());
    assert!(!orch.is_active(&key));
    assert_eq!(rx.recv().await.unwrap().kind, AnalysisEventKind::Started);
    assert_eq!(rx.recv().await.unwrap().kind, AnalysisEventKind::Failed);

    // The key is free for a new attempt.
    let retried = orch.analyze(request("v1", "u1", squat_frames(30))).await.unwrap();
    assert_eq!(retried.status(), AnalysisStatus::Completed);
}

#[tokio::test]
async fn store_failure_at_start_is_recorded_as_failed() {
    let (orch, bus) = orchestrator_with(FlakyStore::failing_update(0), ProfileLibrary::builtin());
    let mut rx = bus.subscribe();

    let analysis = orch.analyze(request("v1", "u1", squat_frames(30))).await.unwrap();
    assert_eq!(analysis.status(), AnalysisStatus::Failed);
    assert!(analysis.failure_reason().unwrap().contains("transient write failure"));
    assert_eq!(rx.recv().await.unwrap().kind, AnalysisEventKind::Failed);
}

// ---------------------------------------------------------------------------
// Progress across sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streak_follows_session_dates() {
    let (orch, _bus) = orchestrator();
    let day1: Timestamp = Utc.with_ymd_and_hms(2024, 9, 2, 18, 0, 0).unwrap();
    let sessions = [("v1", day1), ("v2", day1 + Duration::days(1)), ("v3", day1 + Duration::days(10))];

    let mut streaks = Vec::new();
    for (video, date) in sessions {
        let mut req = request(video, "u1", squat_frames(30));
        req.session_date = Some(date);
        let analysis = orch.analyze(req).await.unwrap();
        streaks.push(analysis.progress_tracking().unwrap().streak);
    }

    assert_eq!(streaks, vec![1, 2, 1]);
    let last = orch.get(&AnalysisKey::new("v3", "u1")).await.unwrap();
    assert_eq!(last.progress_tracking().unwrap().previous_scores.len(), 3);
}

#[tokio::test]
async fn overlapping_sessions_of_one_patient_keep_every_score() {
    let store = SlowHistoryStore::new();
    let (orch, _bus) = orchestrator_with(store.clone(), ProfileLibrary::builtin());
    let day1: Timestamp = Utc.with_ymd_and_hms(2024, 9, 2, 18, 0, 0).unwrap();

    let mut morning = request("va", "u1", squat_frames(30));
    morning.session_date = Some(day1);
    let mut evening = request("vb", "u1", squat_frames(30));
    evening.session_date = Some(day1 + Duration::hours(1));
    let a = orch.submit(morning).await.unwrap();
    let b = orch.submit(evening).await.unwrap();
    let (a, b) = tokio::join!(a.join(), b.join());
    assert_eq!(a.unwrap().status(), AnalysisStatus::Completed);
    assert_eq!(b.unwrap().status(), AnalysisStatus::Completed);
    assert_eq!(store.max_overlap(), 1);

    let mut next_day = request("vc", "u1", squat_frames(30));
    next_day.session_date = Some(day1 + Duration::days(1));
    let last = orch.analyze(next_day).await.unwrap();
    let dates: Vec<Timestamp> = last
        .progress_tracking()
        .unwrap()
        .previous_scores
        .iter()
        .map(|e| e.date)
        .collect();
    assert_eq!(dates.len(), 3);
    assert!(dates.contains(&day1));
    assert!(dates.contains(&(day1 + Duration::hours(1))));
}

#[tokio::test]
async fn other_patients_run_alongside() {
    let store = SlowHistoryStore::new();
    let (orch, _bus) = orchestrator_with(store.clone(), ProfileLibrary::builtin());

    let a = orch.submit(request("v1", "u1", squat_frames(30))).await.unwrap();
    let b = orch.submit(request("v1", "u2", squat_frames(30))).await.unwrap();
    let (a, b) = tokio::join!(a.join(), b.join());
    assert_eq!(a.unwrap().status(), AnalysisStatus::Completed);
    assert_eq!(b.unwrap().status(), AnalysisStatus::Completed);
    assert_eq!(store.max_overlap(), 2);
}

#[tokio::test]
async fn feedback_after_completion_leaves_results_frozen() {
    let (orch, _bus) = orchestrator();
    let done = orch.analyze(request("v1", "u1", squat_frames(30))).await.unwrap();
    let key = done.key();

    let updated = orch.append_feedback(&key, feedback("Nice control")).await.unwrap();
    assert_eq!(updated.performance_metrics(), done.performance_metrics());
    assert_eq!(updated.injury_risk_score(), done.injury_risk_score());
    assert_eq!(updated.feedback().len(), 1);

    let attributed = orch.attribute_plan(&key, "physio-1").await.unwrap();
    assert_eq!(attributed.exercise_plan().unwrap().updated_by, "physio-1");
    assert_eq!(attributed.status(), AnalysisStatus::Completed);
}
