//! Feature extraction from transaction records
//!
//! Builds the numeric matrix consumed by the anomaly model: amount and
//! log-amount columns, one-hot temporal and category encodings, and
//! trailing-window frequency counts.

use crate::{RiskError, Transaction, TransactionCategory};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

/// Ordered timestamp formats tried at ingest; first match wins.
///
/// RFC 3339 is handled separately before these.
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

const HOURS_PER_DAY: usize = 24;
const DAYS_PER_WEEK: usize = 7;
const CATEGORY_COUNT: usize = 5;

/// Parse a timestamp string against the known format list.
///
/// Exhausting every format is a feature-extraction failure naming the
/// offending value; the date dimension is never silently dropped.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RiskError> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.and_utc());
        }
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            // Date-only formats resolve to midnight
            return Ok(parsed
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| {
                    RiskError::FeatureExtraction(format!("invalid date value: {value}"))
                })?
                .and_utc());
        }
    }

    Err(RiskError::FeatureExtraction(format!(
        "could not parse date value '{value}' with any known format"
    )))
}

/// Count, for each transaction, how many batch transactions fall in the
/// trailing window `(t - window, t]` ending at its timestamp.
///
/// The scan covers the whole batch regardless of row order, so a row that
/// appears later in input order but carries an earlier timestamp is still
/// counted. Windows are trailing in time: timestamps later than the row's
/// own are never included. Counts include the row itself, so every count
/// is at least 1.
pub fn trailing_window_counts(transactions: &[Transaction], window: Duration) -> Vec<usize> {
    let mut sorted: Vec<DateTime<Utc>> = transactions.iter().map(|t| t.timestamp).collect();
    sorted.sort_unstable();

    transactions
        .iter()
        .map(|t| {
            let upper = sorted.partition_point(|ts| *ts <= t.timestamp);
            let lower = sorted.partition_point(|ts| *ts <= t.timestamp - window);
            upper - lower
        })
        .collect()
}

/// Row-major feature matrix with a fixed column count
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<Vec<f64>>,
    dim: usize,
}

impl FeatureMatrix {
    pub(crate) fn new(rows: Vec<Vec<f64>>, dim: usize) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == dim));
        Self { rows, dim }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

/// Turns transaction records into the numeric matrix the anomaly model
/// consumes. Dimensionality is fixed for a given window configuration and
/// identical between fit and score calls.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    window_hours: Vec<i64>,
}

impl FeatureExtractor {
    /// Create an extractor with one frequency column per trailing window
    pub fn new(window_hours: Vec<i64>) -> Self {
        Self { window_hours }
    }

    /// Number of columns produced per row
    pub fn dim(&self) -> usize {
        // amount + log-amount + hour one-hot + weekday one-hot
        // + one frequency column per window + category one-hot
        2 + HOURS_PER_DAY + DAYS_PER_WEEK + self.window_hours.len() + CATEGORY_COUNT
    }

    /// Extract the feature matrix, rows aligned 1:1 with input order.
    ///
    /// Deterministic: fixed input and window configuration reproduce the
    /// matrix byte for byte.
    pub fn extract(&self, transactions: &[Transaction]) -> FeatureMatrix {
        let window_counts: Vec<Vec<usize>> = self
            .window_hours
            .iter()
            .map(|hours| trailing_window_counts(transactions, Duration::hours(*hours)))
            .collect();

        let rows = transactions
            .iter()
            .enumerate()
            .map(|(idx, transaction)| {
                let mut row = Vec::with_capacity(self.dim());

                row.push(transaction.amount);
                row.push(transaction.amount.abs().ln_1p());

                // Hour and weekday one-hot so the model sees no false
                // ordinal distance between hour 23 and hour 0
                let hour = transaction.timestamp.hour() as usize;
                for h in 0..HOURS_PER_DAY {
                    row.push(if h == hour { 1.0 } else { 0.0 });
                }
                let weekday = transaction.timestamp.weekday().num_days_from_monday() as usize;
                for d in 0..DAYS_PER_WEEK {
                    row.push(if d == weekday { 1.0 } else { 0.0 });
                }

                for counts in &window_counts {
                    row.push(counts[idx] as f64);
                }

                let category = category_index(transaction.category);
                for c in 0..CATEGORY_COUNT {
                    row.push(if c == category { 1.0 } else { 0.0 });
                }

                row
            })
            .collect();

        FeatureMatrix::new(rows, self.dim())
    }
}

fn category_index(category: TransactionCategory) -> usize {
    match category {
        TransactionCategory::Payment => 0,
        TransactionCategory::Transfer => 1,
        TransactionCategory::Withdrawal => 2,
        TransactionCategory::Deposit => 3,
        TransactionCategory::Other => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn transaction_at(timestamp: DateTime<Utc>, amount: f64) -> Transaction {
        Transaction {
            reference_id: "TX-001".to_string(),
            timestamp,
            amount,
            description: "test".to_string(),
            category: TransactionCategory::Payment,
        }
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 13, 45, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-15T13:45:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-15 13:45:00").unwrap(), expected);

        let midnight = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-15").unwrap(), midnight);
        assert_eq!(parse_timestamp("01/15/2024").unwrap(), midnight);
        // Month slot overflows, so the day-first format matches
        assert_eq!(parse_timestamp("15/01/2024").unwrap(), midnight);
    }

    #[test]
    fn test_parse_timestamp_exhausts_formats() {
        let err = parse_timestamp("not-a-date").unwrap_err();
        assert!(matches!(err, RiskError::FeatureExtraction(_)));
        assert!(err.to_string().contains("not-a-date"));
    }

    #[test]
    fn test_trailing_window_counts_include_self() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let transactions = vec![transaction_at(base, 100.0)];
        let counts = trailing_window_counts(&transactions, Duration::hours(24));
        assert_eq!(counts, vec![1]);
    }

    #[test]
    fn test_trailing_window_counts_are_batch_relative() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        // Out of chronological order: the first row's window still sees the
        // second row's earlier timestamp.
        let transactions = vec![
            transaction_at(base + Duration::hours(2), 100.0),
            transaction_at(base, 100.0),
        ];
        let counts = trailing_window_counts(&transactions, Duration::hours(24));
        assert_eq!(counts, vec![2, 1]);
    }

    #[test]
    fn test_trailing_window_excludes_future_and_expired() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let transactions = vec![
            transaction_at(base - Duration::hours(30), 100.0), // outside window
            transaction_at(base - Duration::hours(1), 100.0),
            transaction_at(base, 100.0),
            transaction_at(base + Duration::hours(1), 100.0), // future for row 2
        ];
        let counts = trailing_window_counts(&transactions, Duration::hours(24));
        assert_eq!(counts[2], 2); // itself and the one an hour before
        assert_eq!(counts[3], 3);
    }

    #[test]
    fn test_feature_dimensionality_is_fixed() {
        let extractor = FeatureExtractor::new(vec![1, 3, 6, 12, 24]);
        assert_eq!(extractor.dim(), 2 + 24 + 7 + 5 + 5);

        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let transactions = vec![
            transaction_at(base, 100.0),
            transaction_at(base + Duration::hours(1), -250.0),
        ];
        let matrix = extractor.extract(&transactions);
        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.dim(), extractor.dim());
        assert!(matrix.rows().iter().all(|r| r.len() == extractor.dim()));
    }

    #[test]
    fn test_amount_features() {
        let extractor = FeatureExtractor::new(vec![24]);
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let matrix = extractor.extract(&[transaction_at(base, -500.0)]);
        let row = &matrix.rows()[0];
        assert_eq!(row[0], -500.0);
        assert!((row[1] - 500.0_f64.ln_1p()).abs() < 1e-12);
    }

    #[test]
    fn test_one_hot_encodings() {
        let extractor = FeatureExtractor::new(vec![24]);
        // 2024-03-01 is a Friday (weekday 4), 09:00
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let matrix = extractor.extract(&[transaction_at(timestamp, 100.0)]);
        let row = &matrix.rows()[0];

        let hour_block = &row[2..2 + 24];
        assert_eq!(hour_block.iter().sum::<f64>(), 1.0);
        assert_eq!(hour_block[9], 1.0);

        let day_block = &row[2 + 24..2 + 24 + 7];
        assert_eq!(day_block.iter().sum::<f64>(), 1.0);
        assert_eq!(day_block[4], 1.0);

        let category_block = &row[row.len() - 5..];
        assert_eq!(category_block, &[1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = FeatureExtractor::new(vec![1, 24]);
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let transactions: Vec<Transaction> = (0..10)
            .map(|i| transaction_at(base + Duration::minutes(i * 17), 100.0 * i as f64))
            .collect();
        assert_eq!(
            extractor.extract(&transactions),
            extractor.extract(&transactions)
        );
    }
}
