//! Performance metric extraction.
//!
//! Five bounded scores computed from a [`Sequence`] against the exercise's
//! [`ReferencePattern`](crate::reference::ReferencePattern). A metric that
//! cannot be computed for the sequence (no repetitions, zero target, no
//! anchors) falls back to [`NEUTRAL_SCORE`] and is reported as a
//! [`DegenerateMetricError`] alongside the result.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, DegenerateMetricError};
use crate::geometry::{clamp_score, coefficient_of_variation, mean, positional_jitter};
use crate::kinematics::{detect_repetitions, rep_periods, Kinematics, Repetition};
use crate::reference::ExerciseProfile;
use crate::sequence::Sequence;

/// Score substituted for a metric that cannot be computed.
pub const NEUTRAL_SCORE: f64 = 50.0;

// ---------------------------------------------------------------------------
// Metric names and values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricName {
    FormAccuracy,
    RangeOfMotion,
    Stability,
    Consistency,
    Speed,
}

impl MetricName {
    pub const ALL: [MetricName; 5] = [
        MetricName::FormAccuracy,
        MetricName::RangeOfMotion,
        MetricName::Stability,
        MetricName::Consistency,
        MetricName::Speed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricName::FormAccuracy => "formAccuracy",
            MetricName::RangeOfMotion => "rangeOfMotion",
            MetricName::Stability => "stability",
            MetricName::Consistency => "consistency",
            MetricName::Speed => "speed",
        }
    }

    /// Label used for plan focus areas.
    pub fn focus_area(self) -> &'static str {
        match self {
            MetricName::FormAccuracy => "form",
            MetricName::RangeOfMotion => "range of motion",
            MetricName::Stability => "stability",
            MetricName::Consistency => "consistency",
            MetricName::Speed => "tempo",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five metric scores, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub form_accuracy: f64,
    pub range_of_motion: f64,
    pub stability: f64,
    pub consistency: f64,
    pub speed: f64,
}

impl PerformanceMetrics {
    /// All five metrics at the same score.
    pub fn uniform(score: f64) -> Self {
        Self {
            form_accuracy: score,
            range_of_motion: score,
            stability: score,
            consistency: score,
            speed: score,
        }
    }

    pub fn get(&self, name: MetricName) -> f64 {
        match name {
            MetricName::FormAccuracy => self.form_accuracy,
            MetricName::RangeOfMotion => self.range_of_motion,
            MetricName::Stability => self.stability,
            MetricName::Consistency => self.consistency,
            MetricName::Speed => self.speed,
        }
    }

    fn set(&mut self, name: MetricName, value: f64) {
        let slot = match name {
            MetricName::FormAccuracy => &mut self.form_accuracy,
            MetricName::RangeOfMotion => &mut self.range_of_motion,
            MetricName::Stability => &mut self.stability,
            MetricName::Consistency => &mut self.consistency,
            MetricName::Speed => &mut self.speed,
        };
        *slot = clamp_score(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricName, f64)> + '_ {
        MetricName::ALL.into_iter().map(|n| (n, self.get(n)))
    }
}

/// Per-metric weights. Normalized by their sum when applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricWeights {
    pub form_accuracy: f64,
    pub range_of_motion: f64,
    pub stability: f64,
    pub consistency: f64,
    pub speed: f64,
}

impl Default for MetricWeights {
    /// Equal weighting.
    fn default() -> Self {
        Self {
            form_accuracy: 0.2,
            range_of_motion: 0.2,
            stability: 0.2,
            consistency: 0.2,
            speed: 0.2,
        }
    }
}

impl MetricWeights {
    pub fn get(&self, name: MetricName) -> f64 {
        match name {
            MetricName::FormAccuracy => self.form_accuracy,
            MetricName::RangeOfMotion => self.range_of_motion,
            MetricName::Stability => self.stability,
            MetricName::Consistency => self.consistency,
            MetricName::Speed => self.speed,
        }
    }

    fn total(&self) -> f64 {
        MetricName::ALL.into_iter().map(|n| self.get(n)).sum()
    }

    /// Weighted mean of `value(metric)` over all metrics.
    pub fn weighted_mean(&self, value: impl Fn(MetricName) -> f64) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        MetricName::ALL
            .into_iter()
            .map(|n| self.get(n) * value(n))
            .sum::<f64>()
            / total
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if MetricName::ALL.into_iter().any(|n| !(self.get(n) >= 0.0)) {
            return Err(CoreError::Configuration(
                "metric weights must be non-negative".into(),
            ));
        }
        if self.total() <= 0.0 {
            return Err(CoreError::Configuration(
                "metric weights must not all be zero".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tolerances
// ---------------------------------------------------------------------------

/// Scale parameters mapping raw measurements onto scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricTolerances {
    /// Mean angular deviation (degrees) at which form accuracy reaches 0.
    pub max_form_deviation_deg: f64,
    /// Anchor jitter at which stability scores 50. Zero at twice this.
    pub anchor_jitter_threshold: f64,
    /// Coefficient of variation at which consistency reaches 0.
    pub max_consistency_cv: f64,
    /// Cadence ratio (either direction) at which speed reaches 0.
    pub max_cadence_ratio: f64,
}

impl Default for MetricTolerances {
    fn default() -> Self {
        Self {
            max_form_deviation_deg: 20.0,
            anchor_jitter_threshold: 0.02,
            max_consistency_cv: 0.5,
            max_cadence_ratio: 2.0,
        }
    }
}

impl MetricTolerances {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.max_form_deviation_deg > 0.0)
            || !(self.anchor_jitter_threshold > 0.0)
            || !(self.max_consistency_cv > 0.0)
        {
            return Err(CoreError::Configuration(
                "metric tolerances must be positive".into(),
            ));
        }
        if !(self.max_cadence_ratio > 1.0) {
            return Err(CoreError::Configuration(format!(
                "max_cadence_ratio must exceed 1.0, got {}",
                self.max_cadence_ratio
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Output of [`extract_metrics`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    pub metrics: PerformanceMetrics,
    pub repetitions: Vec<Repetition>,
    /// Metrics that fell back to [`NEUTRAL_SCORE`].
    pub degenerate: Vec<DegenerateMetricError>,
}

/// Compute all five metrics for a sequence.
pub fn extract_metrics(
    sequence: &Sequence,
    kinematics: &Kinematics,
    profile: &ExerciseProfile,
) -> MetricsReport {
    let reps = detect_repetitions(kinematics, &profile.reference);
    let mut metrics = PerformanceMetrics::uniform(NEUTRAL_SCORE);
    let mut degenerate = Vec::new();

    let results = [
        (MetricName::FormAccuracy, form_accuracy(kinematics, profile)),
        (MetricName::RangeOfMotion, range_of_motion(kinematics, profile)),
        (MetricName::Stability, stability(sequence, profile)),
        (MetricName::Consistency, consistency(&reps, profile)),
        (MetricName::Speed, speed(&reps, profile)),
    ];
    for (name, result) in results {
        match result {
            Ok(score) => metrics.set(name, score),
            Err(reason) => degenerate.push(DegenerateMetricError { metric: name, reason }),
        }
    }

    MetricsReport {
        metrics,
        repetitions: reps,
        degenerate,
    }
}

type MetricResult = Result<f64, &'static str>;

fn form_accuracy(kinematics: &Kinematics, profile: &ExerciseProfile) -> MetricResult {
    let mut deviations = Vec::new();
    for curve in &profile.reference.curves {
        let Some(series) = kinematics.series(curve.angle) else {
            continue;
        };
        for (measured, phase) in series.iter().zip(&kinematics.phases) {
            if let (Some(measured), Some(phase)) = (measured, phase) {
                if let Some(expected) = curve.expected_at(*phase) {
                    deviations.push((measured - expected).abs());
                }
            }
        }
    }
    let deviation = mean(&deviations).ok_or("no measurable reference angles")?;
    Ok(100.0 * (1.0 - deviation / profile.tolerances.max_form_deviation_deg))
}

fn range_of_motion(kinematics: &Kinematics, profile: &ExerciseProfile) -> MetricResult {
    let target = profile.reference.target_excursion_deg;
    if target <= 0.0 {
        return Err("no target excursion for a static exercise");
    }
    let observed = kinematics
        .primary_excursion()
        .ok_or("no measurable primary angle")?;
    Ok(100.0 * observed / target)
}

fn stability(sequence: &Sequence, profile: &ExerciseProfile) -> MetricResult {
    let jitters: Vec<f64> = profile
        .reference
        .anchors
        .iter()
        .filter_map(|joint| positional_jitter(&sequence.track(*joint)))
        .collect();
    let jitter = mean(&jitters).ok_or("no anchor joints")?;
    let threshold = profile.tolerances.anchor_jitter_threshold;
    Ok(100.0 * (1.0 - jitter / (2.0 * threshold)))
}

fn consistency(reps: &[Repetition], profile: &ExerciseProfile) -> MetricResult {
    match reps.len() {
        0 => return Err("no repetitions detected"),
        1 => return Err("a single repetition has no variation"),
        _ => {}
    }
    let periods = rep_periods(reps);
    let amplitudes: Vec<f64> = reps.iter().map(|r| r.amplitude_deg).collect();
    let cvs: Vec<f64> = [
        coefficient_of_variation(&periods),
        coefficient_of_variation(&amplitudes),
    ]
    .into_iter()
    .flatten()
    .collect();
    let cv = mean(&cvs).ok_or("zero-length repetition cycles")?;
    Ok(100.0 * (1.0 - cv / profile.tolerances.max_consistency_cv))
}

fn speed(reps: &[Repetition], profile: &ExerciseProfile) -> MetricResult {
    let target = profile.reference.target_cadence_rpm;
    if target <= 0.0 {
        return Err("no target cadence for a static exercise");
    }
    if reps.is_empty() {
        return Err("no repetitions detected");
    }
    let periods = rep_periods(reps);
    let cycle_ms = if periods.is_empty() {
        reps[0].movement_ms
    } else {
        mean(&periods).unwrap_or(0.0)
    };
    if cycle_ms <= 0.0 {
        return Err("zero-length repetition cycles");
    }
    let observed = 60_000.0 / cycle_ms;
    let ratio = observed / target;
    Ok(100.0 * (1.0 - ratio.ln().abs() / profile.tolerances.max_cadence_ratio.ln()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(entry_timestamp: f64, amplitude_deg: f64) -> Repetition {
        Repetition {
            start_index: 0,
            departure_index: 0,
            entry_index: 0,
            end_index: 0,
            entry_timestamp,
            movement_ms: 3000.0,
            amplitude_deg,
        }
    }

    fn squat() -> ExerciseProfile {
        crate::reference::builtin_profile(crate::reference::ExerciseType::Squat)
    }

    // -- weights ------------------------------------------------------------

    #[test]
    fn equal_weights_are_a_plain_mean() {
        let m = PerformanceMetrics {
            form_accuracy: 100.0,
            range_of_motion: 80.0,
            stability: 60.0,
            consistency: 40.0,
            speed: 20.0,
        };
        let overall = MetricWeights::default().weighted_mean(|n| m.get(n));
        assert!((overall - 60.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weights_are_rejected() {
        let w = MetricWeights {
            form_accuracy: 0.0,
            range_of_motion: 0.0,
            stability: 0.0,
            consistency: 0.0,
            speed: 0.0,
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn serializes_with_camel_case_names() {
        let json = serde_json::to_value(PerformanceMetrics::uniform(10.0)).unwrap();
        assert!(json.get("formAccuracy").is_some());
        assert!(json.get("rangeOfMotion").is_some());
    }

    // -- consistency --------------------------------------------------------

    #[test]
    fn single_repetition_is_degenerate() {
        assert!(consistency(&[rep(0.0, 80.0)], &squat()).is_err());
    }

    #[test]
    fn identical_repetitions_are_fully_consistent() {
        let reps = [rep(0.0, 80.0), rep(3000.0, 80.0), rep(6000.0, 80.0)];
        assert_eq!(consistency(&reps, &squat()), Ok(100.0));
    }

    #[test]
    fn irregular_repetitions_lose_consistency() {
        let reps = [rep(0.0, 80.0), rep(1000.0, 40.0), rep(5000.0, 80.0)];
        let score = consistency(&reps, &squat()).unwrap();
        assert!(score < 60.0, "score {score}");
    }

    // -- speed --------------------------------------------------------------

    #[test]
    fn speed_peaks_at_target_cadence() {
        // 3 s per rep = 20 reps/min, the squat target.
        let reps = [rep(0.0, 80.0), rep(3000.0, 80.0)];
        assert!((speed(&reps, &squat()).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn speed_penalizes_both_directions_symmetrically() {
        let fast = [rep(0.0, 80.0), rep(1500.0, 80.0)];
        let slow = [rep(0.0, 80.0), rep(6000.0, 80.0)];
        let f = speed(&fast, &squat()).unwrap();
        let s = speed(&slow, &squat()).unwrap();
        // Double and half the target cadence both hit the max ratio.
        assert!(f.abs() < 1e-9);
        assert!(s.abs() < 1e-9);
    }

    #[test]
    fn speed_without_repetitions_is_degenerate() {
        assert!(speed(&[], &squat()).is_err());
    }

    #[test]
    fn static_exercise_has_no_target_cadence() {
        let plank = crate::reference::builtin_profile(crate::reference::ExerciseType::Plank);
        assert!(speed(&[rep(0.0, 1.0)], &plank).is_err());
    }
}
