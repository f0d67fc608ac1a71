//! Exercise reference patterns and per-exercise scoring profiles.
//!
//! A [`ProfileLibrary`] maps each [`ExerciseType`] to an [`ExerciseProfile`]:
//! the expected movement ([`ReferencePattern`]) plus every threshold the
//! metric, note, risk and plan stages consume. Profiles are passed explicitly
//! into each stage; nothing here is global.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, CoreError};
use crate::geometry::angle_deg;
use crate::keypoint::{Frame, Joint};
use crate::metrics::MetricTolerances;
use crate::notes::{NoteThresholds, NoteType};
use crate::plan::PlanThresholds;
use crate::risk::RiskWeights;

// ---------------------------------------------------------------------------
// Exercise type
// ---------------------------------------------------------------------------

/// The exercises the engine has reference data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    Squat,
    Pushup,
    Lunge,
    Plank,
    ShoulderPress,
    BicepCurl,
    General,
}

impl ExerciseType {
    pub const ALL: [ExerciseType; 7] = [
        ExerciseType::Squat,
        ExerciseType::Pushup,
        ExerciseType::Lunge,
        ExerciseType::Plank,
        ExerciseType::ShoulderPress,
        ExerciseType::BicepCurl,
        ExerciseType::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExerciseType::Squat => "squat",
            ExerciseType::Pushup => "pushup",
            ExerciseType::Lunge => "lunge",
            ExerciseType::Plank => "plank",
            ExerciseType::ShoulderPress => "shoulder_press",
            ExerciseType::BicepCurl => "bicep_curl",
            ExerciseType::General => "general",
        }
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Joint angles
// ---------------------------------------------------------------------------

/// An angle measured at the middle joint of a (proximal, joint, distal) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointAngle {
    LeftElbow,
    RightElbow,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
}

impl JointAngle {
    /// The three joints that define this angle; the vertex is in the middle.
    pub fn triple(self) -> (Joint, Joint, Joint) {
        use Joint::*;
        match self {
            JointAngle::LeftElbow => (LeftShoulder, LeftElbow, LeftWrist),
            JointAngle::RightElbow => (RightShoulder, RightElbow, RightWrist),
            JointAngle::LeftShoulder => (LeftElbow, LeftShoulder, LeftHip),
            JointAngle::RightShoulder => (RightElbow, RightShoulder, RightHip),
            JointAngle::LeftHip => (LeftShoulder, LeftHip, LeftKnee),
            JointAngle::RightHip => (RightShoulder, RightHip, RightKnee),
            JointAngle::LeftKnee => (LeftHip, LeftKnee, LeftAnkle),
            JointAngle::RightKnee => (RightHip, RightKnee, RightAnkle),
        }
    }

    /// The same angle on the other side of the body.
    pub fn counterpart(self) -> JointAngle {
        match self {
            JointAngle::LeftElbow => JointAngle::RightElbow,
            JointAngle::RightElbow => JointAngle::LeftElbow,
            JointAngle::LeftShoulder => JointAngle::RightShoulder,
            JointAngle::RightShoulder => JointAngle::LeftShoulder,
            JointAngle::LeftHip => JointAngle::RightHip,
            JointAngle::RightHip => JointAngle::LeftHip,
            JointAngle::LeftKnee => JointAngle::RightKnee,
            JointAngle::RightKnee => JointAngle::LeftKnee,
        }
    }

    pub fn is_left(self) -> bool {
        matches!(
            self,
            JointAngle::LeftElbow | JointAngle::LeftShoulder | JointAngle::LeftHip | JointAngle::LeftKnee
        )
    }

    /// Hinge joints (elbow, knee) are scored as form; hip and shoulder
    /// angles describe trunk posture.
    pub fn note_type(self) -> NoteType {
        match self {
            JointAngle::LeftElbow
            | JointAngle::RightElbow
            | JointAngle::LeftKnee
            | JointAngle::RightKnee => NoteType::Form,
            _ => NoteType::Posture,
        }
    }

    /// Measure this angle in a frame. `None` if a joint is absent or the
    /// geometry is degenerate.
    pub fn measure(self, frame: &Frame) -> Option<f64> {
        let (a, b, c) = self.triple();
        angle_deg(frame.get(a)?.xy(), frame.get(b)?.xy(), frame.get(c)?.xy())
    }

    /// Human-readable name, e.g. `"left knee"`.
    pub fn display_name(self) -> String {
        self.triple().1.display_name()
    }
}

// ---------------------------------------------------------------------------
// Reference pattern
// ---------------------------------------------------------------------------

/// Expected angle at a point in the motion.
///
/// `phase` is the normalized depth of the primary joint: 0 at the rest
/// angle, 1 at the peak angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub phase: f64,
    pub angle: f64,
}

/// Expected angle of one joint across the motion, linearly interpolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCurve {
    pub angle: JointAngle,
    pub points: Vec<CurvePoint>,
}

impl ReferenceCurve {
    /// A straight line from `at_rest` (phase 0) to `at_peak` (phase 1).
    pub fn linear(angle: JointAngle, at_rest: f64, at_peak: f64) -> Self {
        Self {
            angle,
            points: vec![
                CurvePoint { phase: 0.0, angle: at_rest },
                CurvePoint { phase: 1.0, angle: at_peak },
            ],
        }
    }

    /// A joint expected to hold one angle throughout.
    pub fn constant(angle: JointAngle, value: f64) -> Self {
        Self::linear(angle, value, value)
    }

    /// Expected angle at `phase`. Phases outside the curve clamp to its ends.
    pub fn expected_at(&self, phase: f64) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if phase <= first.phase {
            return Some(first.angle);
        }
        if phase >= last.phase {
            return Some(last.angle);
        }
        self.points.windows(2).find_map(|w| {
            let (lo, hi) = (w[0], w[1]);
            if phase >= lo.phase && phase <= hi.phase {
                let span = hi.phase - lo.phase;
                if span <= f64::EPSILON {
                    return Some(hi.angle);
                }
                let t = (phase - lo.phase) / span;
                Some(lo.angle + t * (hi.angle - lo.angle))
            } else {
                None
            }
        })
    }
}

/// Allowed envelope for a joint angle over the whole movement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeRange {
    pub angle: JointAngle,
    pub min: f64,
    pub max: f64,
}

impl SafeRange {
    /// Degrees outside the envelope; 0 when inside.
    pub fn excess(&self, value: f64) -> f64 {
        if value < self.min {
            self.min - value
        } else if value > self.max {
            value - self.max
        } else {
            0.0
        }
    }
}

/// Ground-truth movement for one exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePattern {
    /// The joint whose angle drives phase and repetition detection.
    pub primary: JointAngle,
    /// Primary angle at the start/end of a repetition.
    pub rest_angle: f64,
    /// Primary angle at the working extreme of a repetition.
    pub peak_angle: f64,
    /// Phase at or above which the primary joint is in the working zone.
    pub rep_entry_phase: f64,
    /// Phase at or below which the primary joint is back at rest.
    pub rep_exit_phase: f64,
    /// Target repetitions per minute. Zero for static holds.
    pub target_cadence_rpm: f64,
    /// Target primary-angle excursion in degrees. Zero for static holds.
    pub target_excursion_deg: f64,
    pub curves: Vec<ReferenceCurve>,
    /// Joints expected to stay still.
    pub anchors: Vec<Joint>,
    pub safe_ranges: Vec<SafeRange>,
}

impl ReferencePattern {
    /// Normalized depth of a primary-angle reading, clamped to `[0, 1]`.
    ///
    /// Static patterns (rest == peak) always sit at phase 0.
    pub fn phase_of(&self, primary_angle: f64) -> f64 {
        let span = self.rest_angle - self.peak_angle;
        if span.abs() < f64::EPSILON {
            return 0.0;
        }
        ((self.rest_angle - primary_angle) / span).clamp(0.0, 1.0)
    }

    /// Every angle the pattern measures: primary, curves and safe ranges.
    pub fn tracked_angles(&self) -> Vec<JointAngle> {
        let mut angles = vec![self.primary];
        angles.extend(self.curves.iter().map(|c| c.angle));
        angles.extend(self.safe_ranges.iter().map(|r| r.angle));
        angles.sort();
        angles.dedup();
        angles
    }

    /// Every joint the pattern reads.
    pub fn referenced_joints(&self) -> Vec<Joint> {
        let mut joints: Vec<Joint> = self
            .tracked_angles()
            .into_iter()
            .flat_map(|a| {
                let (p, v, d) = a.triple();
                [p, v, d]
            })
            .chain(self.anchors.iter().copied())
            .collect();
        joints.sort();
        joints.dedup();
        joints
    }

    fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&self.rep_exit_phase)
            || !(0.0..=1.0).contains(&self.rep_entry_phase)
            || self.rep_exit_phase >= self.rep_entry_phase
        {
            return Err(CoreError::Configuration(format!(
                "rep phases must satisfy 0 <= exit < entry <= 1, got exit {} entry {}",
                self.rep_exit_phase, self.rep_entry_phase
            )));
        }
        if self.target_cadence_rpm < 0.0 || self.target_excursion_deg < 0.0 {
            return Err(CoreError::Configuration(
                "target cadence and excursion must be non-negative".into(),
            ));
        }
        for curve in &self.curves {
            if curve.points.is_empty() {
                return Err(CoreError::Configuration(format!(
                    "reference curve for {:?} has no points",
                    curve.angle
                )));
            }
            let ordered = curve.points.windows(2).all(|w| w[0].phase <= w[1].phase);
            if !ordered {
                return Err(CoreError::Configuration(format!(
                    "reference curve for {:?} must be ordered by phase",
                    curve.angle
                )));
            }
        }
        for range in &self.safe_ranges {
            if range.min > range.max {
                return Err(CoreError::Configuration(format!(
                    "safe range for {:?} has min {} above max {}",
                    range.angle, range.min, range.max
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Exercise profile
// ---------------------------------------------------------------------------

/// Default minimum keypoint confidence for a required joint.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;

/// Everything the analysis stages need for one exercise type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseProfile {
    pub exercise: ExerciseType,
    /// Joints every frame must carry.
    pub required_joints: Vec<Joint>,
    pub min_confidence: f64,
    pub reference: ReferencePattern,
    #[serde(default)]
    pub tolerances: MetricTolerances,
    #[serde(default)]
    pub notes: NoteThresholds,
    #[serde(default)]
    pub risk: RiskWeights,
    #[serde(default)]
    pub plan: PlanThresholds,
}

impl ExerciseProfile {
    /// Build a profile with default thresholds; required joints are derived
    /// from the reference pattern.
    pub fn new(exercise: ExerciseType, reference: ReferencePattern) -> Self {
        Self {
            exercise,
            required_joints: reference.referenced_joints(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            reference,
            tolerances: MetricTolerances::default(),
            notes: NoteThresholds::default(),
            risk: RiskWeights::default(),
            plan: PlanThresholds::default(),
        }
    }

    pub fn with_notes(mut self, notes: NoteThresholds) -> Self {
        self.notes = notes;
        self
    }

    /// Check internal consistency: the required joint set must cover every
    /// joint the pattern reads, and all thresholds must be usable.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.reference.validate()?;
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CoreError::Configuration(format!(
                "min_confidence must be between 0.0 and 1.0, got {}",
                self.min_confidence
            )));
        }
        let missing: Vec<String> = self
            .reference
            .referenced_joints()
            .into_iter()
            .filter(|j| !self.required_joints.contains(j))
            .map(|j| j.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::Configuration(format!(
                "{} profile reads joints not in required_joints: {}",
                self.exercise,
                missing.join(", ")
            )));
        }
        self.tolerances.validate()?;
        self.notes.validate()?;
        self.risk.validate()?;
        self.plan.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Profile library
// ---------------------------------------------------------------------------

/// Read-only lookup of exercise profiles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileLibrary {
    profiles: BTreeMap<ExerciseType, ExerciseProfile>,
}

impl ProfileLibrary {
    /// A library with no profiles.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in profiles for every [`ExerciseType`].
    pub fn builtin() -> Self {
        let profiles = ExerciseType::ALL
            .into_iter()
            .map(|ex| (ex, builtin_profile(ex)))
            .collect();
        Self { profiles }
    }

    /// Add or replace a profile after validating it.
    pub fn insert(&mut self, profile: ExerciseProfile) -> Result<(), CoreError> {
        profile.validate()?;
        self.profiles.insert(profile.exercise, profile);
        Ok(())
    }

    /// Parse a JSON array of profiles and insert each, replacing any
    /// existing profile for the same exercise.
    pub fn apply_overrides_json(&mut self, json: &str) -> Result<usize, CoreError> {
        let overrides: Vec<ExerciseProfile> = serde_json::from_str(json)
            .map_err(|e| CoreError::Configuration(format!("invalid profile JSON: {e}")))?;
        let count = overrides.len();
        for profile in overrides {
            self.insert(profile)?;
        }
        Ok(count)
    }

    /// Look up the profile for an exercise.
    pub fn get(&self, exercise: ExerciseType) -> Result<&ExerciseProfile, AnalysisError> {
        self.profiles
            .get(&exercise)
            .ok_or(AnalysisError::ConfigurationMissing(exercise))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Built-in reference data. Angles follow the clinical reference table for
/// each exercise; rep thresholds are expressed as phases of the primary joint.
pub fn builtin_profile(exercise: ExerciseType) -> ExerciseProfile {
    use JointAngle::*;

    let reference = match exercise {
        ExerciseType::Squat => ReferencePattern {
            primary: LeftKnee,
            rest_angle: 170.0,
            peak_angle: 90.0,
            rep_entry_phase: 0.75,
            rep_exit_phase: 0.25,
            target_cadence_rpm: 20.0,
            target_excursion_deg: 80.0,
            curves: vec![
                ReferenceCurve::linear(LeftKnee, 170.0, 90.0),
                ReferenceCurve::linear(RightKnee, 170.0, 90.0),
                ReferenceCurve::linear(LeftHip, 170.0, 90.0),
                ReferenceCurve::linear(RightHip, 170.0, 90.0),
            ],
            anchors: vec![Joint::LeftAnkle, Joint::RightAnkle],
            safe_ranges: vec![
                SafeRange { angle: LeftKnee, min: 70.0, max: 180.0 },
                SafeRange { angle: RightKnee, min: 70.0, max: 180.0 },
                SafeRange { angle: LeftHip, min: 60.0, max: 180.0 },
                SafeRange { angle: RightHip, min: 60.0, max: 180.0 },
            ],
        },
        ExerciseType::Pushup => ReferencePattern {
            primary: LeftElbow,
            rest_angle: 165.0,
            peak_angle: 90.0,
            rep_entry_phase: 0.75,
            rep_exit_phase: 0.25,
            target_cadence_rpm: 20.0,
            target_excursion_deg: 75.0,
            curves: vec![
                ReferenceCurve::linear(LeftElbow, 165.0, 90.0),
                ReferenceCurve::linear(RightElbow, 165.0, 90.0),
                ReferenceCurve::constant(LeftHip, 175.0),
                ReferenceCurve::constant(RightHip, 175.0),
            ],
            anchors: vec![Joint::LeftAnkle, Joint::RightAnkle],
            safe_ranges: vec![
                SafeRange { angle: LeftElbow, min: 60.0, max: 180.0 },
                SafeRange { angle: RightElbow, min: 60.0, max: 180.0 },
                SafeRange { angle: LeftHip, min: 160.0, max: 180.0 },
                SafeRange { angle: RightHip, min: 160.0, max: 180.0 },
            ],
        },
        ExerciseType::Lunge => ReferencePattern {
            primary: LeftKnee,
            rest_angle: 170.0,
            peak_angle: 90.0,
            rep_entry_phase: 0.75,
            rep_exit_phase: 0.25,
            target_cadence_rpm: 15.0,
            target_excursion_deg: 80.0,
            curves: vec![
                ReferenceCurve::linear(LeftKnee, 170.0, 90.0),
                ReferenceCurve::linear(RightKnee, 170.0, 90.0),
                ReferenceCurve::linear(LeftHip, 170.0, 110.0),
                ReferenceCurve::linear(RightHip, 170.0, 110.0),
            ],
            anchors: vec![Joint::LeftAnkle],
            safe_ranges: vec![
                SafeRange { angle: LeftKnee, min: 70.0, max: 180.0 },
                SafeRange { angle: RightKnee, min: 70.0, max: 180.0 },
                SafeRange { angle: LeftHip, min: 80.0, max: 180.0 },
                SafeRange { angle: RightHip, min: 80.0, max: 180.0 },
            ],
        },
        ExerciseType::Plank => ReferencePattern {
            primary: LeftHip,
            rest_angle: 175.0,
            peak_angle: 175.0,
            rep_entry_phase: 0.75,
            rep_exit_phase: 0.25,
            target_cadence_rpm: 0.0,
            target_excursion_deg: 0.0,
            curves: vec![
                ReferenceCurve::constant(LeftHip, 175.0),
                ReferenceCurve::constant(RightHip, 175.0),
                ReferenceCurve::constant(LeftElbow, 90.0),
                ReferenceCurve::constant(RightElbow, 90.0),
                ReferenceCurve::constant(LeftShoulder, 90.0),
                ReferenceCurve::constant(RightShoulder, 90.0),
            ],
            anchors: vec![
                Joint::LeftElbow,
                Joint::RightElbow,
                Joint::LeftAnkle,
                Joint::RightAnkle,
            ],
            safe_ranges: vec![
                SafeRange { angle: LeftHip, min: 160.0, max: 180.0 },
                SafeRange { angle: RightHip, min: 160.0, max: 180.0 },
                SafeRange { angle: LeftElbow, min: 70.0, max: 110.0 },
                SafeRange { angle: RightElbow, min: 70.0, max: 110.0 },
            ],
        },
        ExerciseType::ShoulderPress => ReferencePattern {
            primary: LeftElbow,
            rest_angle: 90.0,
            peak_angle: 170.0,
            rep_entry_phase: 0.75,
            rep_exit_phase: 0.25,
            target_cadence_rpm: 15.0,
            target_excursion_deg: 80.0,
            curves: vec![
                ReferenceCurve::linear(LeftElbow, 90.0, 170.0),
                ReferenceCurve::linear(RightElbow, 90.0, 170.0),
                ReferenceCurve::linear(LeftShoulder, 90.0, 170.0),
                ReferenceCurve::linear(RightShoulder, 90.0, 170.0),
            ],
            anchors: vec![Joint::LeftHip, Joint::RightHip],
            safe_ranges: vec![
                SafeRange { angle: LeftElbow, min: 40.0, max: 180.0 },
                SafeRange { angle: RightElbow, min: 40.0, max: 180.0 },
            ],
        },
        ExerciseType::BicepCurl => ReferencePattern {
            primary: LeftElbow,
            rest_angle: 160.0,
            peak_angle: 50.0,
            rep_entry_phase: 0.75,
            rep_exit_phase: 0.25,
            target_cadence_rpm: 20.0,
            target_excursion_deg: 110.0,
            curves: vec![
                ReferenceCurve::linear(LeftElbow, 160.0, 50.0),
                ReferenceCurve::linear(RightElbow, 160.0, 50.0),
                ReferenceCurve::constant(LeftShoulder, 15.0),
                ReferenceCurve::constant(RightShoulder, 15.0),
            ],
            anchors: vec![
                Joint::LeftShoulder,
                Joint::RightShoulder,
                Joint::LeftHip,
                Joint::RightHip,
            ],
            safe_ranges: vec![
                SafeRange { angle: LeftElbow, min: 30.0, max: 180.0 },
                SafeRange { angle: RightElbow, min: 30.0, max: 180.0 },
                SafeRange { angle: LeftShoulder, min: 0.0, max: 45.0 },
                SafeRange { angle: RightShoulder, min: 0.0, max: 45.0 },
            ],
        },
        ExerciseType::General => ReferencePattern {
            primary: LeftShoulder,
            rest_angle: 90.0,
            peak_angle: 90.0,
            rep_entry_phase: 0.75,
            rep_exit_phase: 0.25,
            target_cadence_rpm: 0.0,
            target_excursion_deg: 0.0,
            curves: vec![
                ReferenceCurve::constant(LeftShoulder, 90.0),
                ReferenceCurve::constant(RightShoulder, 90.0),
            ],
            anchors: vec![Joint::LeftHip, Joint::RightHip],
            safe_ranges: vec![
                SafeRange { angle: LeftShoulder, min: 60.0, max: 120.0 },
                SafeRange { angle: RightShoulder, min: 60.0, max: 120.0 },
            ],
        },
    };

    let profile = ExerciseProfile::new(exercise, reference);
    match exercise {
        ExerciseType::Squat | ExerciseType::Lunge => profile.with_notes(NoteThresholds {
            knee_valgus_ratio: Some(0.1),
            ..NoteThresholds::default()
        }),
        _ => profile,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn every_builtin_profile_is_valid() {
        let library = ProfileLibrary::builtin();
        assert_eq!(library.len(), ExerciseType::ALL.len());
        for ex in ExerciseType::ALL {
            let profile = library.get(ex).unwrap();
            profile.validate().unwrap_or_else(|e| panic!("{ex}: {e}"));
        }
    }

    #[test]
    fn missing_profile_is_configuration_missing() {
        let library = ProfileLibrary::empty();
        assert_matches!(
            library.get(ExerciseType::Plank),
            Err(AnalysisError::ConfigurationMissing(ExerciseType::Plank))
        );
    }

    #[test]
    fn linear_curve_interpolates_and_clamps() {
        let curve = ReferenceCurve::linear(JointAngle::LeftKnee, 170.0, 90.0);
        assert_eq!(curve.expected_at(0.0), Some(170.0));
        assert_eq!(curve.expected_at(0.5), Some(130.0));
        assert_eq!(curve.expected_at(1.0), Some(90.0));
        assert_eq!(curve.expected_at(1.7), Some(90.0));
        assert_eq!(curve.expected_at(-0.2), Some(170.0));
    }

    #[test]
    fn multi_point_curve_interpolates_per_segment() {
        let curve = ReferenceCurve {
            angle: JointAngle::LeftHip,
            points: vec![
                CurvePoint { phase: 0.0, angle: 170.0 },
                CurvePoint { phase: 0.5, angle: 150.0 },
                CurvePoint { phase: 1.0, angle: 90.0 },
            ],
        };
        assert_eq!(curve.expected_at(0.25), Some(160.0));
        assert_eq!(curve.expected_at(0.75), Some(120.0));
    }

    #[test]
    fn phase_follows_working_direction() {
        let squat = builtin_profile(ExerciseType::Squat).reference;
        assert_eq!(squat.phase_of(170.0), 0.0);
        assert_eq!(squat.phase_of(130.0), 0.5);
        assert_eq!(squat.phase_of(60.0), 1.0);

        let press = builtin_profile(ExerciseType::ShoulderPress).reference;
        assert_eq!(press.phase_of(90.0), 0.0);
        assert_eq!(press.phase_of(170.0), 1.0);

        let plank = builtin_profile(ExerciseType::Plank).reference;
        assert_eq!(plank.phase_of(150.0), 0.0);
    }

    #[test]
    fn required_joints_cover_referenced_joints() {
        let mut profile = builtin_profile(ExerciseType::Squat);
        profile.required_joints.retain(|j| *j != Joint::LeftAnkle);
        assert_matches!(profile.validate(), Err(CoreError::Configuration(_)));
    }

    #[test]
    fn inverted_rep_phases_are_rejected() {
        let mut profile = builtin_profile(ExerciseType::Squat);
        profile.reference.rep_entry_phase = 0.2;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn overrides_replace_builtin_profiles() {
        let mut library = ProfileLibrary::builtin();
        let mut squat = builtin_profile(ExerciseType::Squat);
        squat.reference.target_cadence_rpm = 12.0;
        let json = serde_json::to_string(&vec![squat]).unwrap();

        assert_eq!(library.apply_overrides_json(&json).unwrap(), 1);
        let loaded = library.get(ExerciseType::Squat).unwrap();
        assert_eq!(loaded.reference.target_cadence_rpm, 12.0);
    }

    #[test]
    fn malformed_override_json_is_a_configuration_error() {
        let mut library = ProfileLibrary::builtin();
        assert_matches!(
            library.apply_overrides_json("{not json"),
            Err(CoreError::Configuration(_))
        );
    }

    #[test]
    fn counterparts_are_symmetric() {
        for angle in [JointAngle::LeftKnee, JointAngle::RightElbow, JointAngle::LeftHip] {
            assert_eq!(angle.counterpart().counterpart(), angle);
            assert_ne!(angle.is_left(), angle.counterpart().is_left());
        }
    }
}
