//! # Ledger Risk Engine
//!
//! Risk scoring for financial ledger transactions, combining unsupervised
//! anomaly detection with deterministic business rules.
//!
//! ## Features
//!
//! - **Feature Extraction**: amount, temporal, frequency and category
//!   features from raw transaction records
//! - **Anomaly Detection**: seeded isolation forest with an explicit
//!   fit/score contract
//! - **Business Rules**: fixed catalogue of threshold and pattern rules
//!   producing severity-tagged risk factors
//! - **Score Fusion**: weighted blend of model and rule scores with a hard
//!   amount-threshold override
//! - **Batch Aggregation**: amount-weighted overall risk and factor summary
//!   per ledger
//!
//! ## Usage
//!
//! ```no_run
//! use ledger_risk_engine::{ledger, RiskProfile, RiskScorer};
//!
//! # fn main() -> Result<(), ledger_risk_engine::RiskError> {
//! let history = ledger::parse_csv_path("history.csv")?;
//! let batch = ledger::parse_csv_path("ledger.csv")?;
//!
//! let mut scorer = RiskScorer::new(RiskProfile::default())?;
//! scorer.fit(&history)?;
//!
//! let analysis = scorer.score_batch(&batch)?;
//! println!("overall risk: {:.1}", analysis.summary.overall_risk);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod features;
pub mod fusion;
pub mod ledger;
pub mod model;
pub mod rules;

pub use aggregate::BatchResult;
pub use features::{FeatureExtractor, FeatureMatrix};
pub use fusion::{FusedScore, FusionWeights};
pub use ledger::LedgerMetrics;
pub use model::AnomalyDetector;
pub use rules::{FactorType, RiskFactor, RuleContext, RuleEvaluator, Severity};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Risk engine errors
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum RiskError {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("Feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("Model has not been fitted; call fit() or opt into fit-on-score mode")]
    ModelNotFitted,

    #[error("Invalid risk profile: {0}")]
    Configuration(String),
}

/// Transaction category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionCategory {
    Payment,
    Transfer,
    Withdrawal,
    Deposit,
    Other,
}

impl TransactionCategory {
    /// Parse a category string; unknown values map to `Other`
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "payment" => TransactionCategory::Payment,
            "transfer" => TransactionCategory::Transfer,
            "withdrawal" => TransactionCategory::Withdrawal,
            "deposit" => TransactionCategory::Deposit,
            _ => TransactionCategory::Other,
        }
    }
}

impl std::fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionCategory::Payment => write!(f, "payment"),
            TransactionCategory::Transfer => write!(f, "transfer"),
            TransactionCategory::Withdrawal => write!(f, "withdrawal"),
            TransactionCategory::Deposit => write!(f, "deposit"),
            TransactionCategory::Other => write!(f, "other"),
        }
    }
}

/// A ledger transaction record, immutable input to the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub reference_id: String,
    pub timestamp: DateTime<Utc>,
    /// Signed amount; debits are negative
    pub amount: f64,
    pub description: String,
    pub category: TransactionCategory,
}

/// Thresholds and model hyperparameters governing one scoring run.
///
/// Validated once when a [`RiskScorer`] is constructed and read-only
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    pub amount_threshold: f64,
    pub frequency_threshold: usize,
    pub time_window_hours: i64,
    pub high_risk_score_threshold: f64,
    /// Trailing windows for frequency features, in hours
    pub frequency_windows_hours: Vec<i64>,
    /// Expected anomaly fraction, in (0, 1)
    pub contamination: f64,
    pub n_estimators: usize,
    pub fusion: FusionWeights,
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            amount_threshold: 10_000.0,
            frequency_threshold: 5,
            time_window_hours: 24,
            high_risk_score_threshold: 75.0,
            frequency_windows_hours: vec![1, 3, 6, 12, 24],
            contamination: 0.1,
            n_estimators: 100,
            fusion: FusionWeights::default(),
        }
    }
}

impl RiskProfile {
    /// Validate profile values
    pub fn validate(&self) -> Result<(), RiskError> {
        if self.amount_threshold <= 0.0 {
            return Err(RiskError::Configuration(format!(
                "amount_threshold must be positive, got {}",
                self.amount_threshold
            )));
        }
        if self.frequency_threshold == 0 {
            return Err(RiskError::Configuration(
                "frequency_threshold must be at least 1".to_string(),
            ));
        }
        if self.time_window_hours <= 0 {
            return Err(RiskError::Configuration(format!(
                "time_window_hours must be positive, got {}",
                self.time_window_hours
            )));
        }
        if !(0.0..=100.0).contains(&self.high_risk_score_threshold) {
            return Err(RiskError::Configuration(format!(
                "high_risk_score_threshold must be in [0, 100], got {}",
                self.high_risk_score_threshold
            )));
        }
        if self.frequency_windows_hours.is_empty()
            || self.frequency_windows_hours.iter().any(|w| *w <= 0)
        {
            return Err(RiskError::Configuration(
                "frequency_windows_hours must be a non-empty list of positive hours".to_string(),
            ));
        }
        if self.contamination <= 0.0 || self.contamination >= 1.0 {
            return Err(RiskError::Configuration(format!(
                "contamination must be in (0, 1), got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 {
            return Err(RiskError::Configuration(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A transaction with its risk score, component scores and factors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredTransaction {
    pub transaction: Transaction,
    /// Final fused score in [0, 100]
    pub risk_score: f64,
    pub ml_score: f64,
    pub rules_score: f64,
    pub risk_factors: Vec<RiskFactor>,
}

/// Result of scoring one batch: per-transaction scores in input order plus
/// the aggregate summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAnalysis {
    pub transactions: Vec<ScoredTransaction>,
    pub summary: BatchResult,
}

/// How the pipeline behaves when asked to score without a fitted model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// Scoring an unfit model is an error (default)
    RequireFitted,
    /// Explicit fallback: fit a throwaway model on the scoring batch
    /// itself. Scores then measure anomaly relative to the batch, not to a
    /// stable baseline; the fallback is logged whenever it engages.
    FitOnScore,
}

/// The risk scoring pipeline: feature extraction, anomaly scoring, rule
/// evaluation, score fusion and batch aggregation.
///
/// A fitted scorer never mutates during `score_batch`, so it can be shared
/// by concurrent readers.
pub struct RiskScorer {
    profile: RiskProfile,
    extractor: FeatureExtractor,
    evaluator: RuleEvaluator,
    detector: AnomalyDetector,
    mode: ScoringMode,
}

impl RiskScorer {
    /// Create a scorer that requires an explicit `fit` before scoring
    pub fn new(profile: RiskProfile) -> Result<Self, RiskError> {
        Self::with_mode(profile, ScoringMode::RequireFitted)
    }

    /// Create a scorer with an explicit scoring mode
    pub fn with_mode(profile: RiskProfile, mode: ScoringMode) -> Result<Self, RiskError> {
        profile.validate()?;
        let extractor = FeatureExtractor::new(profile.frequency_windows_hours.clone());
        let evaluator = RuleEvaluator::new(&profile);
        let detector = AnomalyDetector::new(profile.contamination, profile.n_estimators);
        Ok(Self {
            profile,
            extractor,
            evaluator,
            detector,
            mode,
        })
    }

    pub fn profile(&self) -> &RiskProfile {
        &self.profile
    }

    pub fn is_fitted(&self) -> bool {
        self.detector.is_fitted()
    }

    /// Fit the anomaly model on historical reference transactions
    pub fn fit(&mut self, history: &[Transaction]) -> Result<(), RiskError> {
        if history.is_empty() {
            return Err(RiskError::InputValidation(
                "cannot fit on an empty dataset".to_string(),
            ));
        }
        let matrix = self.extractor.extract(history);
        self.detector.fit(&matrix)?;
        info!(
            transactions = history.len(),
            features = matrix.dim(),
            "anomaly model fitted"
        );
        Ok(())
    }

    /// Score a batch of transactions.
    ///
    /// Returns scored transactions in input order plus the batch summary.
    /// Never mutates the scorer: in fit-on-score mode a local throwaway
    /// detector is fitted on the batch instead.
    pub fn score_batch(&self, batch: &[Transaction]) -> Result<BatchAnalysis, RiskError> {
        if batch.is_empty() {
            return Err(RiskError::InputValidation(
                "cannot score an empty batch".to_string(),
            ));
        }

        let matrix = self.extractor.extract(batch);
        let raw_scores = self.anomaly_scores(&matrix)?;

        let window = Duration::hours(self.profile.time_window_hours);
        let window_counts = features::trailing_window_counts(batch, window);

        let transactions: Vec<ScoredTransaction> = batch
            .iter()
            .enumerate()
            .map(|(idx, transaction)| {
                let context = RuleContext {
                    window_count: window_counts[idx],
                    window_hours: self.profile.time_window_hours,
                };
                // Exactly one rule evaluation per transaction per run
                let risk_factors = self.evaluator.evaluate(transaction, &context);
                let fused = fusion::fuse(
                    raw_scores[idx],
                    &risk_factors,
                    transaction.amount,
                    self.profile.amount_threshold,
                    &self.profile.fusion,
                );
                ScoredTransaction {
                    transaction: transaction.clone(),
                    risk_score: fused.final_score,
                    ml_score: fused.ml_score,
                    rules_score: fused.rules_score,
                    risk_factors,
                }
            })
            .collect();

        let summary = aggregate::aggregate(&transactions, self.profile.high_risk_score_threshold);
        debug!(
            transactions = summary.transaction_count,
            high_risk = summary.high_risk_count,
            overall_risk = summary.overall_risk,
            "batch scored"
        );

        Ok(BatchAnalysis {
            transactions,
            summary,
        })
    }

    fn anomaly_scores(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, RiskError> {
        if self.detector.is_fitted() {
            return self.detector.score(matrix);
        }
        match self.mode {
            ScoringMode::RequireFitted => Err(RiskError::ModelNotFitted),
            ScoringMode::FitOnScore => {
                warn!(
                    rows = matrix.n_rows(),
                    "no fitted model; fitting on the scoring batch itself (fit-on-score fallback)"
                );
                let mut local =
                    AnomalyDetector::new(self.profile.contamination, self.profile.n_estimators);
                local.fit(matrix)?;
                local.score(matrix)
            }
        }
    }
}
