//! Per-frame joint angles, motion phase, and repetition detection.
//!
//! Computed once per sequence and shared by the metric extractor and the
//! note generator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::reference::{JointAngle, ReferencePattern};
use crate::sequence::Sequence;
use crate::types::VideoMillis;

/// Angle series for every joint angle the reference pattern tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct Kinematics {
    pub timestamps: Vec<VideoMillis>,
    /// One entry per frame; `None` where the geometry was degenerate.
    pub angles: BTreeMap<JointAngle, Vec<Option<f64>>>,
    /// Normalized depth of the primary joint per frame.
    pub phases: Vec<Option<f64>>,
    pub primary: JointAngle,
}

impl Kinematics {
    pub fn compute(sequence: &Sequence, pattern: &ReferencePattern) -> Self {
        let timestamps = sequence.frames().iter().map(|f| f.timestamp).collect();
        let angles: BTreeMap<JointAngle, Vec<Option<f64>>> = pattern
            .tracked_angles()
            .into_iter()
            .map(|angle| {
                let series = sequence.frames().iter().map(|f| angle.measure(f)).collect();
                (angle, series)
            })
            .collect();
        let phases = angles
            .get(&pattern.primary)
            .map(|series| {
                series
                    .iter()
                    .map(|a| a.map(|v| pattern.phase_of(v)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            timestamps,
            angles,
            phases,
            primary: pattern.primary,
        }
    }

    pub fn series(&self, angle: JointAngle) -> Option<&[Option<f64>]> {
        self.angles.get(&angle).map(Vec::as_slice)
    }

    /// Measured primary angles, skipping degenerate frames.
    pub fn primary_values(&self) -> Vec<f64> {
        self.series(self.primary)
            .map(|s| s.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Peak-to-peak primary angle over the whole sequence.
    pub fn primary_excursion(&self) -> Option<f64> {
        excursion(&self.primary_values())
    }
}

fn excursion(values: &[f64]) -> Option<f64> {
    let max = values.iter().copied().reduce(f64::max)?;
    let min = values.iter().copied().reduce(f64::min)?;
    Some(max - min)
}

// ---------------------------------------------------------------------------
// Repetitions
// ---------------------------------------------------------------------------

/// One completed repetition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repetition {
    /// Frame where the rep window opens (end of the previous rep, or 0).
    pub start_index: usize,
    /// Last rest-zone frame before the descent began.
    pub departure_index: usize,
    /// Frame where the primary joint entered the working zone.
    pub entry_index: usize,
    /// Frame where the primary joint returned to rest.
    pub end_index: usize,
    pub entry_timestamp: VideoMillis,
    /// Time from leaving rest to returning to it. Idle time at rest before
    /// the descent is not included.
    pub movement_ms: VideoMillis,
    /// Peak-to-peak primary angle within the window.
    pub amplitude_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepState {
    Rest,
    Working { entry_index: usize },
}

/// Detect repetitions with a hysteresis band on the primary phase.
///
/// A repetition counts only on a full rest → working → rest cycle, so a
/// sequence that ends mid-rep does not count the partial one.
pub fn detect_repetitions(kinematics: &Kinematics, pattern: &ReferencePattern) -> Vec<Repetition> {
    let primary = kinematics.series(kinematics.primary).unwrap_or(&[]);
    let mut reps = Vec::new();
    let mut state = RepState::Rest;
    let mut window_start = 0usize;
    let mut last_rest = 0usize;

    for (i, phase) in kinematics.phases.iter().enumerate() {
        let Some(phase) = *phase else { continue };
        match state {
            RepState::Rest if phase >= pattern.rep_entry_phase => {
                state = RepState::Working { entry_index: i };
            }
            RepState::Rest if phase <= pattern.rep_exit_phase => last_rest = i,
            RepState::Working { entry_index } if phase <= pattern.rep_exit_phase => {
                let window: Vec<f64> = primary[window_start..=i].iter().flatten().copied().collect();
                reps.push(Repetition {
                    start_index: window_start,
                    departure_index: last_rest,
                    entry_index,
                    end_index: i,
                    entry_timestamp: kinematics.timestamps[entry_index],
                    movement_ms: kinematics.timestamps[i] - kinematics.timestamps[last_rest],
                    amplitude_deg: excursion(&window).unwrap_or(0.0),
                });
                window_start = i;
                last_rest = i;
                state = RepState::Rest;
            }
            _ => {}
        }
    }
    reps
}

/// Intervals between successive working-zone entries.
pub fn rep_periods(reps: &[Repetition]) -> Vec<VideoMillis> {
    reps.windows(2)
        .map(|w| w[1].entry_timestamp - w[0].entry_timestamp)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
