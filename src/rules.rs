//! Deterministic rule evaluation producing typed risk factors

use crate::{RiskProfile, Transaction};
use chrono::Timelike;
use serde::{Deserialize, Serialize};

/// Risk factor type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FactorType {
    HighAmount,
    HighFrequency,
    UnusualTime,
    RoundAmount,
}

impl std::fmt::Display for FactorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactorType::HighAmount => write!(f, "high_amount"),
            FactorType::HighFrequency => write!(f, "high_frequency"),
            FactorType::UnusualTime => write!(f, "unusual_time"),
            FactorType::RoundAmount => write!(f, "round_amount"),
        }
    }
}

/// Factor severity, ordered low to high
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A named, severity-tagged reason a transaction is considered risky
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor_type: FactorType,
    pub severity: Severity,
    pub detail: String,
}

/// Precomputed cross-transaction aggregates for rules that look beyond
/// a single record.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext {
    /// Transactions in the trailing profile window ending at this
    /// transaction's timestamp, inclusive of itself (always >= 1).
    pub window_count: usize,
    pub window_hours: i64,
}

/// A rule is a pure function over (transaction, context); the catalogue is
/// an ordered table so the set stays open for extension without dynamic
/// dispatch.
type Rule = fn(&RuleEvaluator, &Transaction, &RuleContext) -> Option<RiskFactor>;

const CATALOGUE: &[Rule] = &[
    RuleEvaluator::high_amount,
    RuleEvaluator::high_frequency,
    RuleEvaluator::unusual_time,
    RuleEvaluator::round_amount,
];

/// Rule evaluator over a fixed catalogue of threshold/pattern rules
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    amount_threshold: f64,
    frequency_threshold: usize,
}

impl RuleEvaluator {
    /// Create an evaluator from a risk profile
    pub fn new(profile: &RiskProfile) -> Self {
        Self {
            amount_threshold: profile.amount_threshold,
            frequency_threshold: profile.frequency_threshold,
        }
    }

    /// Evaluate every rule against one transaction.
    ///
    /// Duplicate factors are not suppressed across calls, so the pipeline
    /// calls this exactly once per transaction per run.
    pub fn evaluate(&self, transaction: &Transaction, context: &RuleContext) -> Vec<RiskFactor> {
        CATALOGUE
            .iter()
            .filter_map(|rule| rule(self, transaction, context))
            .collect()
    }

    fn high_amount(&self, transaction: &Transaction, _context: &RuleContext) -> Option<RiskFactor> {
        let amount = transaction.amount.abs();
        if amount >= self.amount_threshold {
            return Some(RiskFactor {
                factor_type: FactorType::HighAmount,
                severity: Severity::High,
                detail: format!(
                    "Transaction amount ${:.2} exceeds threshold ${:.2}",
                    amount, self.amount_threshold
                ),
            });
        }
        None
    }

    fn high_frequency(
        &self,
        _transaction: &Transaction,
        context: &RuleContext,
    ) -> Option<RiskFactor> {
        if context.window_count > self.frequency_threshold {
            return Some(RiskFactor {
                factor_type: FactorType::HighFrequency,
                severity: Severity::Medium,
                detail: format!(
                    "{} transactions in {}h window (limit: {})",
                    context.window_count, context.window_hours, self.frequency_threshold
                ),
            });
        }
        None
    }

    fn unusual_time(&self, transaction: &Transaction, _context: &RuleContext) -> Option<RiskFactor> {
        let hour = transaction.timestamp.hour();
        if !(6..=22).contains(&hour) {
            return Some(RiskFactor {
                factor_type: FactorType::UnusualTime,
                severity: Severity::Low,
                detail: format!("Transaction at {:02}:00 outside normal hours", hour),
            });
        }
        None
    }

    fn round_amount(&self, transaction: &Transaction, _context: &RuleContext) -> Option<RiskFactor> {
        let amount = transaction.amount.abs();
        if amount > 1000.0 && amount % 1000.0 == 0.0 {
            return Some(RiskFactor {
                factor_type: FactorType::RoundAmount,
                severity: Severity::Medium,
                detail: format!(
                    "Round amount ${:.2} detected (possible structuring)",
                    amount
                ),
            });
        }
        None
    }
}
