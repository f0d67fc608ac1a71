//! Injury-risk scoring.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geometry::clamp_score;
use crate::metrics::{MetricWeights, PerformanceMetrics};
use crate::notes::{AiNote, Severity};

/// Risk points added per note, scaled by the note's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityPenalties {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for SeverityPenalties {
    fn default() -> Self {
        Self {
            low: 2.0,
            medium: 6.0,
            high: 18.0,
        }
    }
}

impl SeverityPenalties {
    pub fn for_severity(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub metric_weights: MetricWeights,
    /// Fraction of the weighted metric deficit carried into the score.
    pub metric_share: f64,
    pub penalties: SeverityPenalties,
    /// Scores at or above this are [`RiskLevel::Moderate`].
    pub moderate_from: f64,
    /// Scores at or above this are [`RiskLevel::High`].
    pub high_from: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            metric_weights: MetricWeights::default(),
            metric_share: 0.6,
            penalties: SeverityPenalties::default(),
            moderate_from: 30.0,
            high_from: 60.0,
        }
    }
}

impl RiskWeights {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.metric_weights.validate()?;
        if !(0.0..=1.0).contains(&self.metric_share) {
            return Err(CoreError::Configuration(format!(
                "metric_share must be between 0.0 and 1.0, got {}",
                self.metric_share
            )));
        }
        let p = &self.penalties;
        if !(p.low >= 0.0 && p.low <= p.medium && p.medium <= p.high) {
            return Err(CoreError::Configuration(
                "severity penalties must satisfy 0 <= low <= medium <= high".into(),
            ));
        }
        if !(self.moderate_from < self.high_from) {
            return Err(CoreError::Configuration(
                "moderate_from must be below high_from".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Combine metric deficits and note penalties into a score in `[0, 100]`.
pub fn score_risk(metrics: &PerformanceMetrics, notes: &[AiNote], weights: &RiskWeights) -> f64 {
    let deficit = weights
        .metric_weights
        .weighted_mean(|name| 100.0 - metrics.get(name));
    let penalty: f64 = notes
        .iter()
        .map(|n| weights.penalties.for_severity(n.severity) * n.confidence)
        .sum();
    clamp_score(weights.metric_share * deficit + penalty)
}

pub fn classify_risk(score: f64, weights: &RiskWeights) -> RiskLevel {
    if score >= weights.high_from {
        RiskLevel::High
    } else if score >= weights.moderate_from {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::NoteType;

    fn note(severity: Severity, confidence: f64) -> AiNote {
        AiNote {
            note_type: NoteType::Form,
            description: String::new(),
            confidence,
            timestamp: None,
            severity,
        }
    }

    #[test]
    fn perfect_metrics_without_notes_is_zero_risk() {
        let risk = score_risk(&PerformanceMetrics::uniform(100.0), &[], &RiskWeights::default());
        assert_eq!(risk, 0.0);
    }

    #[test]
    fn deficit_is_scaled_by_metric_share() {
        let risk = score_risk(&PerformanceMetrics::uniform(50.0), &[], &RiskWeights::default());
        assert!((risk - 30.0).abs() < 1e-9);
    }

    #[test]
    fn high_severity_dominates() {
        let w = RiskWeights::default();
        let m = PerformanceMetrics::uniform(100.0);
        let lows = score_risk(&m, &[note(Severity::Low, 1.0), note(Severity::Low, 1.0)], &w);
        let high = score_risk(&m, &[note(Severity::High, 1.0)], &w);
        assert!(high > 2.0 * lows);
    }

    #[test]
    fn score_is_clamped() {
        let notes = vec![note(Severity::High, 1.0); 20];
        let risk = score_risk(&PerformanceMetrics::uniform(0.0), &notes, &RiskWeights::default());
        assert_eq!(risk, 100.0);
    }

    #[test]
    fn levels_follow_cutoffs() {
        let w = RiskWeights::default();
        assert_eq!(classify_risk(10.0, &w), RiskLevel::Low);
        assert_eq!(classify_risk(30.0, &w), RiskLevel::Moderate);
        assert_eq!(classify_risk(75.0, &w), RiskLevel::High);
    }
}
