//! Biomechanical issue detection.
//!
//! Each check emits at most one note per detected issue. Confidence grows
//! with how far the measurement exceeds its threshold; severity comes from
//! fixed exceedance bands. Notes are derived from the same kinematics as the
//! metrics but never change them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geometry::{mean, positional_jitter};
use crate::keypoint::Joint;
use crate::kinematics::Kinematics;
use crate::reference::ExerciseProfile;
use crate::sequence::Sequence;
use crate::types::VideoMillis;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Posture,
    Movement,
    Balance,
    Form,
    Technique,
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoteType::Posture => "posture",
            NoteType::Movement => "movement",
            NoteType::Balance => "balance",
            NoteType::Form => "form",
            NoteType::Technique => "technique",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

/// A generated coaching note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiNote {
    #[serde(rename = "type")]
    pub note_type: NoteType,
    pub description: String,
    pub confidence: f64,
    /// Video time of the worst frame, when the issue is tied to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<VideoMillis>,
    pub severity: Severity,
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Relative exceedance at which a note becomes medium or high severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    pub medium: f64,
    pub high: f64,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            medium: 0.5,
            high: 1.5,
        }
    }
}

impl SeverityBands {
    pub fn classify(&self, exceedance: f64) -> Severity {
        if exceedance >= self.high {
            Severity::High
        } else if exceedance >= self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteThresholds {
    /// Degrees outside a safe range tolerated before a note is raised.
    pub range_tolerance_deg: f64,
    /// Mean left/right difference (degrees) tolerated on a bilateral pair.
    pub asymmetry_deg: f64,
    /// Fractional narrowing of knee width versus ankle width at depth that
    /// counts as valgus. `None` disables the check.
    pub knee_valgus_ratio: Option<f64>,
    pub bands: SeverityBands,
}

impl Default for NoteThresholds {
    fn default() -> Self {
        Self {
            range_tolerance_deg: 5.0,
            asymmetry_deg: 15.0,
            knee_valgus_ratio: None,
            bands: SeverityBands::default(),
        }
    }
}

impl NoteThresholds {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.range_tolerance_deg > 0.0) || !(self.asymmetry_deg > 0.0) {
            return Err(CoreError::Configuration(
                "note thresholds must be positive".into(),
            ));
        }
        if let Some(ratio) = self.knee_valgus_ratio {
            if !(ratio > 0.0 && ratio < 1.0) {
                return Err(CoreError::Configuration(format!(
                    "knee_valgus_ratio must be between 0 and 1, got {ratio}"
                )));
            }
        }
        if !(self.bands.medium > 0.0 && self.bands.medium < self.bands.high) {
            return Err(CoreError::Configuration(
                "severity bands must satisfy 0 < medium < high".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Run every check and return notes in check order.
pub fn generate_notes(
    sequence: &Sequence,
    kinematics: &Kinematics,
    profile: &ExerciseProfile,
) -> Vec<AiNote> {
    let mut notes = Vec::new();
    safe_range_notes(kinematics, profile, &mut notes);
    asymmetry_notes(kinematics, profile, &mut notes);
    balance_notes(sequence, profile, &mut notes);
    knee_valgus_note(sequence, kinematics, profile, &mut notes);
    notes
}

/// `(value - threshold) / threshold`; only meaningful when value > threshold.
fn exceedance(value: f64, threshold: f64) -> f64 {
    (value - threshold) / threshold
}

/// Confidence in `[0.5, 1)`, rising with exceedance.
fn confidence(exceedance: f64) -> f64 {
    0.5 + 0.5 * (1.0 - (-exceedance.max(0.0)).exp())
}

fn note(
    note_type: NoteType,
    description: String,
    value: f64,
    threshold: f64,
    timestamp: Option<VideoMillis>,
    bands: &SeverityBands,
) -> AiNote {
    let ex = exceedance(value, threshold);
    AiNote {
        note_type,
        description,
        confidence: confidence(ex),
        timestamp,
        severity: bands.classify(ex),
    }
}

fn safe_range_notes(kinematics: &Kinematics, profile: &ExerciseProfile, notes: &mut Vec<AiNote>) {
    let tolerance = profile.notes.range_tolerance_deg;
    for range in &profile.reference.safe_ranges {
        let Some(series) = kinematics.series(range.angle) else {
            continue;
        };
        let worst = series
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.map(|v| (i, v, range.excess(v))))
            .max_by(|a, b| a.2.total_cmp(&b.2));
        let Some((index, value, excess)) = worst else {
            continue;
        };
        if excess <= tolerance {
            continue;
        }
        let direction = if value < range.min { "below" } else { "above" };
        notes.push(note(
            range.angle.note_type(),
            format!(
                "{} angle reached {:.0}°, {:.0}° {} the safe range of {:.0}°-{:.0}°",
                capitalize(&range.angle.display_name()),
                value,
                excess,
                direction,
                range.min,
                range.max
            ),
            excess,
            tolerance,
            kinematics.timestamps.get(index).copied(),
            &profile.notes.bands,
        ));
    }
}

fn asymmetry_notes(kinematics: &Kinematics, profile: &ExerciseProfile, notes: &mut Vec<AiNote>) {
    let threshold = profile.notes.asymmetry_deg;
    for (&left, left_series) in kinematics.angles.iter().filter(|(a, _)| a.is_left()) {
        let Some(right_series) = kinematics.series(left.counterpart()) else {
            continue;
        };
        let diffs: Vec<(usize, f64)> = left_series
            .iter()
            .zip(right_series)
            .enumerate()
            .filter_map(|(i, (l, r))| Some((i, (l.as_ref()? - r.as_ref()?).abs())))
            .collect();
        let values: Vec<f64> = diffs.iter().map(|d| d.1).collect();
        let Some(mean_diff) = mean(&values) else {
            continue;
        };
        if mean_diff <= threshold {
            continue;
        }
        let worst = diffs.iter().max_by(|a, b| a.1.total_cmp(&b.1)).map(|d| d.0);
        let joint = left.display_name().replacen("left ", "", 1);
        notes.push(note(
            NoteType::Movement,
            format!("Left and right {joint} angles differ by {mean_diff:.0}° on average"),
            mean_diff,
            threshold,
            worst.and_then(|i| kinematics.timestamps.get(i).copied()),
            &profile.notes.bands,
        ));
    }
}

fn balance_notes(sequence: &Sequence, profile: &ExerciseProfile, notes: &mut Vec<AiNote>) {
    let threshold = profile.tolerances.anchor_jitter_threshold;
    for &joint in &profile.reference.anchors {
        let Some(jitter) = positional_jitter(&sequence.track(joint)) else {
            continue;
        };
        if jitter <= threshold {
            continue;
        }
        notes.push(note(
            NoteType::Balance,
            format!(
                "{} drifted during the exercise; keep it planted",
                capitalize(&joint.display_name())
            ),
            jitter,
            threshold,
            None,
            &profile.notes.bands,
        ));
    }
}

fn knee_valgus_note(
    sequence: &Sequence,
    kinematics: &Kinematics,
    profile: &ExerciseProfile,
    notes: &mut Vec<AiNote>,
) {
    let Some(threshold) = profile.notes.knee_valgus_ratio else {
        return;
    };
    let entry = profile.reference.rep_entry_phase;
    let worst = sequence
        .frames()
        .iter()
        .zip(&kinematics.phases)
        .filter(|(_, phase)| phase.is_some_and(|p| p >= entry))
        .filter_map(|(frame, _)| {
            let knee_width = (frame.get(Joint::LeftKnee)?.x - frame.get(Joint::RightKnee)?.x).abs();
            let ankle_width =
                (frame.get(Joint::LeftAnkle)?.x - frame.get(Joint::RightAnkle)?.x).abs();
            if ankle_width <= f64::EPSILON {
                return None;
            }
            Some((frame.timestamp, 1.0 - knee_width / ankle_width))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let Some((timestamp, narrowing)) = worst else {
        return;
    };
    if narrowing <= threshold {
        return;
    }
    notes.push(note(
        NoteType::Technique,
        format!(
            "Knees collapse inward at depth ({:.0}% narrower than ankles); push knees out over toes",
            narrowing * 100.0
        ),
        narrowing,
        threshold,
        Some(timestamp),
        &profile.notes.bands,
    ));
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
