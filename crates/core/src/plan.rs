//! Exercise plan adaptation.
//!
//! Plans only move when there is a reason to: difficulty escalates after
//! sustained mastery at low risk, and weak metrics add a focus area with a
//! corrective exercise. Anything else leaves the plan untouched, including
//! its attribution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::metrics::{MetricName, PerformanceMetrics};
use crate::progress::ProgressTracking;
use crate::reference::ExerciseType;
use crate::risk::RiskLevel;
use crate::types::Timestamp;

/// Author recorded on plans changed by the engine.
pub const SYSTEM_AUTHOR: &str = "system";

const DEFAULT_SETS: u32 = 3;
const DEFAULT_REPS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// The next level up, or `None` at the top.
    pub fn next(self) -> Option<Difficulty> {
        match self {
            Difficulty::Beginner => Some(Difficulty::Intermediate),
            Difficulty::Intermediate => Some(Difficulty::Advanced),
            Difficulty::Advanced => None,
        }
    }

    /// Starting level for a new plan, from form accuracy.
    pub fn from_form_score(score: f64) -> Difficulty {
        if score < 70.0 {
            Difficulty::Beginner
        } else if score < 85.0 {
            Difficulty::Intermediate
        } else {
            Difficulty::Advanced
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedExercise {
    pub name: String,
    pub sets: u32,
    pub reps: u32,
    /// Hold duration in seconds, for timed exercises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExercisePlan {
    pub exercises: Vec<PlannedExercise>,
    pub difficulty: Difficulty,
    pub focus_areas: Vec<String>,
    pub updated_by: String,
    pub last_updated: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanThresholds {
    /// Overall score every recent session must exceed to escalate.
    pub mastery_score: f64,
    /// How many recent sessions must show mastery.
    pub mastery_sessions: usize,
    /// Metrics below this gain a focus area.
    pub needs_work_score: f64,
}

impl Default for PlanThresholds {
    fn default() -> Self {
        Self {
            mastery_score: 85.0,
            mastery_sessions: 3,
            needs_work_score: 60.0,
        }
    }
}

impl PlanThresholds {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.mastery_sessions == 0 {
            return Err(CoreError::Configuration(
                "mastery_sessions must be at least 1".into(),
            ));
        }
        if self.needs_work_score > self.mastery_score {
            return Err(CoreError::Configuration(
                "needs_work_score must not exceed mastery_score".into(),
            ));
        }
        Ok(())
    }
}

/// Result of [`adapt_plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanAdjustment {
    pub plan: ExercisePlan,
    pub changed: bool,
    pub escalated: bool,
    pub added_focus: Vec<MetricName>,
}

/// Signals the adapter reads from the current session.
#[derive(Debug, Clone, Copy)]
pub struct PlanSignals<'a> {
    pub exercise: ExerciseType,
    pub risk_level: RiskLevel,
    pub metrics: &'a PerformanceMetrics,
    pub progress: &'a ProgressTracking,
}

// ---------------------------------------------------------------------------
// Corrective exercises
// ---------------------------------------------------------------------------

fn corrective_exercise(metric: MetricName) -> PlannedExercise {
    let (name, sets, reps, duration, instructions) = match metric {
        MetricName::FormAccuracy => (
            "Slow-tempo form drill",
            2,
            8,
            None,
            "Perform the movement at half speed in front of a mirror, pausing at the working position.",
        ),
        MetricName::RangeOfMotion => (
            "Dynamic mobility flow",
            2,
            10,
            None,
            "Move through the full pain-free range, increasing depth gradually each repetition.",
        ),
        MetricName::Stability => (
            "Single-leg balance hold",
            3,
            1,
            Some(30),
            "Stand on one leg with a soft knee and keep the hips level for the full hold.",
        ),
        MetricName::Consistency => (
            "Metronome-paced repetitions",
            2,
            10,
            None,
            "Match every repetition to a steady metronome beat, keeping depth identical.",
        ),
        MetricName::Speed => (
            "Controlled tempo repetitions",
            2,
            10,
            None,
            "Lower for three seconds and return for two; avoid bouncing at the bottom.",
        ),
    };
    PlannedExercise {
        name: name.into(),
        sets,
        reps,
        duration,
        instructions: instructions.into(),
    }
}

fn primary_exercise(exercise: ExerciseType) -> PlannedExercise {
    let (name, reps, duration, instructions) = match exercise {
        ExerciseType::Squat => ("Squat", DEFAULT_REPS, None, "Feet shoulder-width apart, knees tracking over toes."),
        ExerciseType::Pushup => ("Push-up", DEFAULT_REPS, None, "Keep a straight line from shoulders to ankles."),
        ExerciseType::Lunge => ("Lunge", DEFAULT_REPS, None, "Step forward and lower until both knees reach about 90 degrees."),
        ExerciseType::Plank => ("Plank", 1, Some(30), "Hold a straight line from head to heels with elbows under shoulders."),
        ExerciseType::ShoulderPress => ("Shoulder press", DEFAULT_REPS, None, "Press overhead without arching the lower back."),
        ExerciseType::BicepCurl => ("Bicep curl", DEFAULT_REPS, None, "Keep elbows pinned to the sides throughout."),
        ExerciseType::General => ("General mobility", DEFAULT_REPS, None, "Move slowly through a comfortable range."),
    };
    PlannedExercise {
        name: name.into(),
        sets: DEFAULT_SETS,
        reps,
        duration,
        instructions: instructions.into(),
    }
}

fn weak_metrics(metrics: &PerformanceMetrics, thresholds: &PlanThresholds) -> Vec<MetricName> {
    metrics
        .iter()
        .filter(|(_, score)| *score < thresholds.needs_work_score)
        .map(|(name, _)| name)
        .collect()
}

// ---------------------------------------------------------------------------
// Seeding and adaptation
// ---------------------------------------------------------------------------

/// Initial plan for a patient without one.
pub fn seed_plan(
    exercise: ExerciseType,
    metrics: &PerformanceMetrics,
    thresholds: &PlanThresholds,
    now: Timestamp,
) -> ExercisePlan {
    let weak = weak_metrics(metrics, thresholds);
    let mut exercises = vec![primary_exercise(exercise)];
    exercises.extend(weak.iter().map(|m| corrective_exercise(*m)));
    ExercisePlan {
        exercises,
        difficulty: Difficulty::from_form_score(metrics.form_accuracy),
        focus_areas: weak.iter().map(|m| m.focus_area().to_string()).collect(),
        updated_by: SYSTEM_AUTHOR.into(),
        last_updated: now,
    }
}

/// Revise `current` from this session's signals, or seed a plan when there
/// is none.
pub fn adapt_plan(
    current: Option<&ExercisePlan>,
    signals: PlanSignals<'_>,
    thresholds: &PlanThresholds,
    now: Timestamp,
) -> PlanAdjustment {
    let Some(current) = current else {
        let plan = seed_plan(signals.exercise, signals.metrics, thresholds, now);
        return PlanAdjustment {
            plan,
            changed: true,
            escalated: false,
            added_focus: weak_metrics(signals.metrics, thresholds),
        };
    };

    let mut plan = current.clone();

    let recent = signals.progress.recent_overall(thresholds.mastery_sessions);
    let mastered = recent.len() == thresholds.mastery_sessions
        && recent.iter().all(|s| *s > thresholds.mastery_score);
    let mut escalated = false;
    if signals.risk_level == RiskLevel::Low && mastered {
        if let Some(next) = plan.difficulty.next() {
            plan.difficulty = next;
            escalated = true;
        }
    }

    let mut added_focus = Vec::new();
    for metric in weak_metrics(signals.metrics, thresholds) {
        let area = metric.focus_area();
        if plan.focus_areas.iter().any(|f| f == area) {
            continue;
        }
        plan.focus_areas.push(area.to_string());
        let corrective = corrective_exercise(metric);
        if !plan.exercises.iter().any(|e| e.name == corrective.name) {
            plan.exercises.push(corrective);
        }
        added_focus.push(metric);
    }

    let changed = escalated || !added_focus.is_empty();
    if changed {
        plan.updated_by = SYSTEM_AUTHOR.into();
        plan.last_updated = now;
    }

    PlanAdjustment {
        plan,
        changed,
        escalated,
        added_focus,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
