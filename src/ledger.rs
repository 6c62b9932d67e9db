//! Tabular ledger parsing into the in-memory transaction model
//!
//! Accepts CSV input with case-insensitive column names. Required columns
//! are `date`, `amount`, and `description`; `category` and `reference_id`
//! are optional and unknown columns are ignored.

use crate::features::parse_timestamp;
use crate::{RiskError, Transaction, TransactionCategory};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

const REQUIRED_COLUMNS: &[&str] = &["date", "amount", "description"];

struct ColumnMap {
    date: usize,
    amount: usize,
    description: usize,
    category: Option<usize>,
    reference_id: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, RiskError> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let find = |name: &str| normalized.iter().position(|h| h == name);

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| find(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(RiskError::InputValidation(format!(
                "missing required columns: {}. Found columns: {}",
                missing.join(", "),
                normalized.join(", ")
            )));
        }

        Ok(Self {
            date: find("date").unwrap_or_default(),
            amount: find("amount").unwrap_or_default(),
            description: find("description").unwrap_or_default(),
            category: find("category"),
            reference_id: find("reference_id"),
        })
    }
}

/// Parse a CSV ledger from a reader.
///
/// Rows whose amount fails to parse are skipped with a warning (row-level
/// tolerance); a date value that exhausts every known format aborts the
/// parse. Zero surviving rows is an input validation error.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<Transaction>, RiskError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| RiskError::InputValidation(format!("could not read header row: {e}")))?
        .clone();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut transactions = Vec::new();
    for (row_number, record) in csv_reader.records().enumerate() {
        let record =
            record.map_err(|e| RiskError::InputValidation(format!("malformed CSV row: {e}")))?;

        let raw_amount = record.get(columns.amount).unwrap_or_default();
        let amount = match raw_amount.parse::<f64>() {
            Ok(amount) if amount.is_finite() => amount,
            _ => {
                warn!(
                    row = row_number + 1,
                    value = raw_amount,
                    "skipping row with unparseable amount"
                );
                continue;
            }
        };

        let timestamp = parse_timestamp(record.get(columns.date).unwrap_or_default())?;

        let category = columns
            .category
            .and_then(|idx| record.get(idx))
            .map(TransactionCategory::parse_lossy)
            .unwrap_or(TransactionCategory::Other);

        let reference_id = columns
            .reference_id
            .and_then(|idx| record.get(idx))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("TX-{}", Uuid::new_v4()));

        transactions.push(Transaction {
            reference_id,
            timestamp,
            amount,
            description: record
                .get(columns.description)
                .unwrap_or_default()
                .to_string(),
            category,
        });
    }

    if transactions.is_empty() {
        return Err(RiskError::InputValidation(
            "no valid transactions found in input".to_string(),
        ));
    }

    Ok(transactions)
}

/// Parse a CSV ledger file from disk
pub fn parse_csv_path<P: AsRef<Path>>(path: P) -> Result<Vec<Transaction>, RiskError> {
    let file = std::fs::File::open(path.as_ref()).map_err(|e| {
        RiskError::InputValidation(format!(
            "could not open ledger file {}: {e}",
            path.as_ref().display()
        ))
    })?;
    parse_csv(file)
}

/// Descriptive metrics over a parsed ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerMetrics {
    pub transaction_count: usize,
    /// Sum of absolute amounts
    pub total_volume: f64,
    pub unique_descriptions: usize,
    pub date_range_days: i64,
}

/// Compute descriptive metrics for a ledger
pub fn ledger_metrics(transactions: &[Transaction]) -> LedgerMetrics {
    let total_volume = transactions.iter().map(|t| t.amount.abs()).sum();

    let mut descriptions: Vec<&str> = transactions
        .iter()
        .map(|t| t.description.as_str())
        .collect();
    descriptions.sort_unstable();
    descriptions.dedup();

    let date_range_days = match (
        transactions.iter().map(|t| t.timestamp).min(),
        transactions.iter().map(|t| t.timestamp).max(),
    ) {
        (Some(first), Some(last)) => (last - first).num_days(),
        _ => 0,
    };

    LedgerMetrics {
        transaction_count: transactions.len(),
        total_volume,
        unique_descriptions: descriptions.len(),
        date_range_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
date,amount,description,category,reference_id
2024-03-01,1500.00,Office rent,payment,TX-100
2024-03-02 09:30:00,-250.50,Refund issued,transfer,TX-101
2024-03-03,12000.00,Equipment purchase,,
";

    #[test]
    fn test_parse_basic_ledger() {
        let transactions = parse_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(transactions.len(), 3);
        assert_eq!(transactions[0].reference_id, "TX-100");
        assert_eq!(transactions[0].amount, 1500.0);
        assert_eq!(transactions[0].category, TransactionCategory::Payment);
        assert_eq!(transactions[1].amount, -250.5);
        assert_eq!(transactions[1].category, TransactionCategory::Transfer);
        // Empty category falls back to Other; empty reference gets generated
        assert_eq!(transactions[2].category, TransactionCategory::Other);
        assert!(transactions[2].reference_id.starts_with("TX-"));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let input = "Date,AMOUNT,Description\n2024-03-01,100.0,Coffee\n";
        let transactions = parse_csv(input.as_bytes()).unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].description, "Coffee");
    }

    #[test]
    fn test_unknown_columns_ignored() {
        let input = "date,amount,description,branch\n2024-03-01,100.0,Coffee,North\n";
        let transactions = parse_csv(input.as_bytes()).unwrap();
        assert_eq!(transactions.len(), 1);
    }

    #[test]
    fn test_missing_required_column() {
        let input = "date,description\n2024-03-01,Coffee\n";
        let err = parse_csv(input.as_bytes()).unwrap_err();
        assert!(matches!(err, RiskError::InputValidation(_)));
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_bad_amount_row_is_skipped() {
        let input = "\
date,amount,description
2024-03-01,100.0,Good row
2024-03-02,not-a-number,Bad row
2024-03-03,200.0,Another good row
";
        let transactions = parse_csv(input.as_bytes()).unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[1].description, "Another good row");
    }

    #[test]
    fn test_bad_date_aborts_parse() {
        let input = "date,amount,description\nnot-a-date,100.0,Coffee\n";
        let err = parse_csv(input.as_bytes()).unwrap_err();
        assert!(matches!(err, RiskError::FeatureExtraction(_)));
    }

    #[test]
    fn test_empty_input_fails() {
        let input = "date,amount,description\n";
        let err = parse_csv(input.as_bytes()).unwrap_err();
        assert!(matches!(err, RiskError::InputValidation(_)));
    }

    #[test]
    fn test_parse_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let transactions = parse_csv_path(file.path()).unwrap();
        assert_eq!(transactions.len(), 3);
    }

    #[test]
    fn test_missing_file_fails() {
        let err = parse_csv_path("/nonexistent/ledger.csv").unwrap_err();
        assert!(matches!(err, RiskError::InputValidation(_)));
    }

    #[test]
    fn test_ledger_metrics() {
        let transactions = parse_csv(SAMPLE.as_bytes()).unwrap();
        let metrics = ledger_metrics(&transactions);
        assert_eq!(metrics.transaction_count, 3);
        assert!((metrics.total_volume - 13750.5).abs() < 1e-9);
        assert_eq!(metrics.unique_descriptions, 3);
        assert_eq!(metrics.date_range_days, 2);
    }

    #[test]
    fn test_ledger_metrics_empty() {
        let metrics = ledger_metrics(&[]);
        assert_eq!(metrics.transaction_count, 0);
        assert_eq!(metrics.total_volume, 0.0);
        assert_eq!(metrics.date_range_days, 0);
    }
}
