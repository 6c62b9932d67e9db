//! Score fusion: combines the anomaly score and rule factors into one
//! final 0-100 risk score

use crate::rules::{RiskFactor, Severity};
use serde::{Deserialize, Serialize};

/// Fusion policy constants.
///
/// The severity weights and blend weights are deployment policy rather than
/// derived values, so they live in configuration with the reference
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionWeights {
    pub ml_weight: f64,
    pub rules_weight: f64,
    pub low_severity: f64,
    pub medium_severity: f64,
    pub high_severity: f64,
    /// Minimum final score for transactions at or above the amount threshold
    pub override_floor: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            ml_weight: 0.6,
            rules_weight: 0.4,
            low_severity: 25.0,
            medium_severity: 50.0,
            high_severity: 80.0,
            override_floor: 80.0,
        }
    }
}

impl FusionWeights {
    fn severity_weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.low_severity,
            Severity::Medium => self.medium_severity,
            Severity::High => self.high_severity,
        }
    }
}

/// Final score with its retained components
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusedScore {
    pub final_score: f64,
    pub ml_score: f64,
    pub rules_score: f64,
}

/// Map a raw anomaly score in [-1, 1] to a 0-100 ML score.
///
/// Monotonic: raw -1 (most anomalous) maps to 100, raw 1 to 0.
pub fn ml_score(raw_anomaly_score: f64) -> f64 {
    ((1.0 - (raw_anomaly_score + 1.0) / 2.0) * 100.0).clamp(0.0, 100.0)
}

/// Sum severity weights over the factors, capped at 100
pub fn rules_score(factors: &[RiskFactor], weights: &FusionWeights) -> f64 {
    factors
        .iter()
        .map(|factor| weights.severity_weight(factor.severity))
        .sum::<f64>()
        .min(100.0)
}

/// Fuse the anomaly score and rule factors into the final score.
///
/// Normal case is the weighted blend. Transactions whose absolute amount
/// crosses the hard threshold are forced to `max(ml, rules, floor)` so they
/// can never score below the floor regardless of model output.
pub fn fuse(
    raw_anomaly_score: f64,
    factors: &[RiskFactor],
    amount: f64,
    amount_threshold: f64,
    weights: &FusionWeights,
) -> FusedScore {
    let ml = ml_score(raw_anomaly_score);
    let rules = rules_score(factors, weights);

    let final_score = if amount.abs() >= amount_threshold {
        ml.max(rules).max(weights.override_floor)
    } else {
        weights.ml_weight * ml + weights.rules_weight * rules
    };

    FusedScore {
        final_score: final_score.clamp(0.0, 100.0),
        ml_score: ml,
        rules_score: rules,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::FactorType;

    fn factor(severity: Severity) -> RiskFactor {
        RiskFactor {
            factor_type: FactorType::HighAmount,
            severity,
            detail: "test".to_string(),
        }
    }

    #[test]
    fn test_ml_score_endpoints() {
        assert_eq!(ml_score(-1.0), 100.0);
        assert_eq!(ml_score(1.0), 0.0);
        assert_eq!(ml_score(0.0), 50.0);
    }

    #[test]
    fn test_ml_score_is_monotonic() {
        let scores: Vec<f64> = (-10..=10).map(|i| ml_score(i as f64 / 10.0)).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_rules_score_weights() {
        let weights = FusionWeights::default();
        assert_eq!(rules_score(&[factor(Severity::Low)], &weights), 25.0);
        assert_eq!(rules_score(&[factor(Severity::Medium)], &weights), 50.0);
        assert_eq!(rules_score(&[factor(Severity::High)], &weights), 80.0);
    }

    #[test]
    fn test_rules_score_caps_at_100() {
        let weights = FusionWeights::default();
        let factors = vec![factor(Severity::High), factor(Severity::High)];
        assert_eq!(rules_score(&factors, &weights), 100.0);
    }

    #[test]
    fn test_weighted_blend() {
        let weights = FusionWeights::default();
        // ml = 50, rules = 25 -> 0.6*50 + 0.4*25 = 40
        let fused = fuse(0.0, &[factor(Severity::Low)], 500.0, 10000.0, &weights);
        assert!((fused.final_score - 40.0).abs() < 1e-12);
        assert_eq!(fused.ml_score, 50.0);
        assert_eq!(fused.rules_score, 25.0);
    }

    #[test]
    fn test_amount_override_floor() {
        let weights = FusionWeights::default();
        // Model says completely normal, but the amount crosses the threshold
        let fused = fuse(1.0, &[], 15000.0, 10000.0, &weights);
        assert_eq!(fused.final_score, 80.0);
        assert_eq!(fused.ml_score, 0.0);
    }

    #[test]
    fn test_amount_override_keeps_max() {
        let weights = FusionWeights::default();
        // ml = 95 beats the floor
        let fused = fuse(-0.9, &[], 15000.0, 10000.0, &weights);
        assert_eq!(fused.final_score, 95.0);
    }

    #[test]
    fn test_amount_override_uses_absolute_value() {
        let weights = FusionWeights::default();
        let fused = fuse(1.0, &[], -15000.0, 10000.0, &weights);
        assert!(fused.final_score >= 80.0);
    }

    #[test]
    fn test_final_score_always_in_range() {
        let weights = FusionWeights::default();
        let factors = vec![factor(Severity::High), factor(Severity::High)];
        for raw in [-1.0, -0.5, 0.0, 0.5, 1.0] {
            for amount in [0.0, 500.0, 9999.99, 10000.0, 1_000_000.0] {
                let fused = fuse(raw, &factors, amount, 10000.0, &weights);
                assert!((0.0..=100.0).contains(&fused.final_score));
            }
        }
    }
}
