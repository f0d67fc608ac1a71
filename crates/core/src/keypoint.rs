//! Body joints, raw detector keypoints, and validated frames.
//!
//! The upstream pose detector reports joints by string label. Only the 17
//! COCO body joints are tracked; other labels are ignored by the sequence
//! builder.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::VideoMillis;

// ---------------------------------------------------------------------------
// Joint
// ---------------------------------------------------------------------------

/// A tracked body joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    /// Every tracked joint, in COCO index order.
    pub const ALL: [Joint; 17] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    /// The detector label for this joint, e.g. `"left_knee"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftEye => "left_eye",
            Joint::RightEye => "right_eye",
            Joint::LeftEar => "left_ear",
            Joint::RightEar => "right_ear",
            Joint::LeftShoulder => "left_shoulder",
            Joint::RightShoulder => "right_shoulder",
            Joint::LeftElbow => "left_elbow",
            Joint::RightElbow => "right_elbow",
            Joint::LeftWrist => "left_wrist",
            Joint::RightWrist => "right_wrist",
            Joint::LeftHip => "left_hip",
            Joint::RightHip => "right_hip",
            Joint::LeftKnee => "left_knee",
            Joint::RightKnee => "right_knee",
            Joint::LeftAnkle => "left_ankle",
            Joint::RightAnkle => "right_ankle",
        }
    }

    /// Resolve a detector label. Returns `None` for untracked labels.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|j| j.as_str() == label)
    }

    /// Human-readable name, e.g. `"left knee"`.
    pub fn display_name(self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Raw detector input
// ---------------------------------------------------------------------------

/// A keypoint exactly as reported by the pose detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RawKeypoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
}

impl RawKeypoint {
    /// Whether all coordinates and the confidence are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.confidence.is_finite()
    }
}

/// One detector frame: a timestamp plus its keypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub timestamp: VideoMillis,
    pub keypoints: Vec<RawKeypoint>,
}

// ---------------------------------------------------------------------------
// Validated frames
// ---------------------------------------------------------------------------

/// A validated keypoint bound to a tracked joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    #[serde(rename = "name")]
    pub joint: Joint,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub confidence: f64,
}

impl Keypoint {
    /// Planar position used for angle and jitter computations.
    pub fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// A validated frame. Joints are unique; order follows the detector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp: VideoMillis,
    pub keypoints: Vec<Keypoint>,
}

impl Frame {
    /// Look up the keypoint for a joint.
    pub fn get(&self, joint: Joint) -> Option<&Keypoint> {
        self.keypoints.iter().find(|k| k.joint == joint)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
