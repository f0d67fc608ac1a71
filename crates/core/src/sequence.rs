//! Keypoint sequence builder.
//!
//! Turns the raw detector stream into a [`Sequence`]: frames with the full
//! required joint set, valid confidences, finite coordinates, unique joint
//! names, and strictly increasing timestamps. Invalid frames are dropped and
//! counted; the build only fails when fewer than [`MIN_FRAMES`] remain.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AnalysisError;
use crate::keypoint::{Frame, Joint, Keypoint, RawFrame};
use crate::types::VideoMillis;

/// Minimum number of valid frames needed for motion-derived metrics.
pub const MIN_FRAMES: usize = 2;

// ---------------------------------------------------------------------------
// Sequence
// ---------------------------------------------------------------------------

/// A cleaned, time-ordered keypoint sequence.
///
/// Only constructed by [`build_sequence`], so timestamps are always strictly
/// increasing and there are at least [`MIN_FRAMES`] frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    frames: Vec<Frame>,
}

impl Sequence {
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Timestamp of the frame at `index`.
    pub fn timestamp(&self, index: usize) -> Option<VideoMillis> {
        self.frames.get(index).map(|f| f.timestamp)
    }

    /// Elapsed time between the first and last frame.
    pub fn duration_ms(&self) -> VideoMillis {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Planar positions of one joint across all frames.
    pub fn track(&self, joint: Joint) -> Vec<(f64, f64)> {
        self.frames
            .iter()
            .filter_map(|f| f.get(joint).map(Keypoint::xy))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Build report
// ---------------------------------------------------------------------------

/// Why a raw frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NonFiniteValue,
    ConfidenceOutOfRange,
    DuplicateJoint,
    MissingJoint,
    NonIncreasingTimestamp,
}

/// Summary of a sequence build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub received: usize,
    pub kept: usize,
    pub dropped: BTreeMap<DropReason, usize>,
    /// Keypoints whose label is not a tracked joint.
    pub ignored_keypoints: usize,
}

impl BuildReport {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Validate and normalize a raw frame stream.
///
/// `required` is the joint set every frame must carry with a confidence of at
/// least `min_confidence`.
pub fn build_sequence(
    raw: &[RawFrame],
    required: &[Joint],
    min_confidence: f64,
) -> Result<(Sequence, BuildReport), AnalysisError> {
    let mut report = BuildReport {
        received: raw.len(),
        ..BuildReport::default()
    };
    let mut frames: Vec<Frame> = Vec::with_capacity(raw.len());

    for raw_frame in raw {
        let last_timestamp = frames.last().map(|f| f.timestamp);
        match validate_frame(raw_frame, required, min_confidence, last_timestamp, &mut report) {
            Ok(frame) => frames.push(frame),
            Err(reason) => *report.dropped.entry(reason).or_insert(0) += 1,
        }
    }

    report.kept = frames.len();
    if frames.len() < MIN_FRAMES {
        return Err(AnalysisError::InsufficientData {
            valid: frames.len(),
            required: MIN_FRAMES,
        });
    }

    Ok((Sequence { frames }, report))
}

fn validate_frame(
    raw: &RawFrame,
    required: &[Joint],
    min_confidence: f64,
    last_timestamp: Option<VideoMillis>,
    report: &mut BuildReport,
) -> Result<Frame, DropReason> {
    if !raw.timestamp.is_finite() {
        return Err(DropReason::NonFiniteValue);
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(raw.keypoints.len());
    let mut keypoints = Vec::with_capacity(raw.keypoints.len());
    let mut ignored = 0usize;

    for kp in &raw.keypoints {
        if !kp.is_finite() {
            return Err(DropReason::NonFiniteValue);
        }
        if kp.validate().is_err() {
            return Err(DropReason::ConfidenceOutOfRange);
        }
        if !seen.insert(kp.name.as_str()) {
            return Err(DropReason::DuplicateJoint);
        }
        let Some(joint) = Joint::from_label(&kp.name) else {
            ignored += 1;
            continue;
        };
        keypoints.push(Keypoint {
            joint,
            x: kp.x,
            y: kp.y,
            z: kp.z,
            confidence: kp.confidence,
        });
    }

    let complete = required.iter().all(|joint| {
        keypoints
            .iter()
            .any(|k| k.joint == *joint && k.confidence >= min_confidence)
    });
    if !complete {
        return Err(DropReason::MissingJoint);
    }

    if let Some(last) = last_timestamp {
        if raw.timestamp <= last {
            return Err(DropReason::NonIncreasingTimestamp);
        }
    }

    report.ignored_keypoints += ignored;
    Ok(Frame {
        timestamp: raw.timestamp,
        keypoints,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
