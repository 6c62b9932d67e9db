//! Batch-level aggregation of scored transactions

use crate::rules::FactorType;
use crate::ScoredTransaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Summary statistics for one scored batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Amount-weighted mean of per-transaction risk scores, 0-100
    pub overall_risk: f64,
    pub transaction_count: usize,
    /// Transactions at or above the profile's high-risk threshold
    pub high_risk_count: usize,
    pub risk_factor_summary: HashMap<FactorType, usize>,
}

/// Aggregate a scored batch.
///
/// Overall risk weights each score by the transaction's absolute amount;
/// a batch with zero total volume (including the empty batch) aggregates
/// to zero.
pub fn aggregate(scored: &[ScoredTransaction], high_risk_threshold: f64) -> BatchResult {
    let total_volume: f64 = scored
        .iter()
        .map(|s| s.transaction.amount.abs())
        .sum();

    let overall_risk = if total_volume > 0.0 {
        let weighted: f64 = scored
            .iter()
            .map(|s| s.risk_score * s.transaction.amount.abs())
            .sum();
        (weighted / total_volume).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let high_risk_count = scored
        .iter()
        .filter(|s| s.risk_score >= high_risk_threshold)
        .count();

    let mut risk_factor_summary = HashMap::new();
    for scored_transaction in scored {
        for factor in &scored_transaction.risk_factors {
            *risk_factor_summary.entry(factor.factor_type).or_insert(0) += 1;
        }
    }

    BatchResult {
        overall_risk,
        transaction_count: scored.len(),
        high_risk_count,
        risk_factor_summary,
    }
}
