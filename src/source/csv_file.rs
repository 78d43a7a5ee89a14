use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use super::{SourceAdapter, SourceBatch, SourceRow};
use crate::common::error::{EtlError, Result};
use crate::utils::sha256_hex;

/// CSV-backed source adapter. Normalizes the human-friendly export headers
/// into the canonical operational columns and tags the batch with the
/// file's SHA-256.
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

/// Maps a source header onto its canonical column name. Unknown headers are
/// snake_cased so they survive into the payload under a predictable key.
fn canonical_column(header: &str) -> String {
    match header.trim() {
        "Customer ID" => "customer_id".to_string(),
        "TransactionID" | "Transaction ID" => "transaction_id".to_string(),
        "Transaction Date" => "transaction_date".to_string(),
        "Transaction Amount" => "transaction_amount".to_string(),
        "Transaction Type" => "transaction_type".to_string(),
        "Account Type" => "account_type".to_string(),
        "Email" => "customer_email".to_string(),
        "Contact Number" => "customer_phone".to_string(),
        "Age" => "customer_age".to_string(),
        "Branch ID" => "branch_id".to_string(),
        "City" => "branch_location".to_string(),
        "Loan Status" => "account_status".to_string(),
        "First Name" => "first_name".to_string(),
        "Last Name" => "last_name".to_string(),
        "Loan Type" => "loan_type".to_string(),
        "Card Type" => "card_type".to_string(),
        other => other.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_"),
    }
}

fn non_empty(row: &SourceRow, column: &str) -> Option<String> {
    row.get(column)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Derives columns the warehouse expects but the export spreads across
/// other headers: full name from its halves, product type from whichever
/// of account/loan/card type is populated.
fn derive_columns(row: &mut SourceRow) {
    if non_empty(row, "customer_name").is_none() {
        let first = non_empty(row, "first_name").unwrap_or_default();
        let last = non_empty(row, "last_name").unwrap_or_default();
        let full = format!("{} {}", first, last).trim().to_string();
        if !full.is_empty() {
            row.insert("customer_name".to_string(), full);
        }
    }

    if non_empty(row, "product_type").is_none() {
        for source in ["account_type", "loan_type", "card_type"] {
            if let Some(value) = non_empty(row, source) {
                row.insert("product_type".to_string(), value);
                break;
            }
        }
    }
}

impl SourceAdapter for CsvFileSource {
    fn source_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown_source")
    }

    fn fetch(&self) -> Result<SourceBatch> {
        if !self.path.exists() {
            return Err(EtlError::Config(format!(
                "Input file not found: {}",
                self.path.display()
            )));
        }

        let bytes = fs::read(&self.path)?;
        let file_hash = sha256_hex(&bytes);
        info!(
            file = %self.path.display(),
            size_bytes = bytes.len(),
            hash = %file_hash,
            "reading source file"
        );

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(bytes.as_slice());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(canonical_column)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row = SourceRow::new();
            for (header, value) in headers.iter().zip(record.iter()) {
                row.insert(header.clone(), value.to_string());
            }

            // Skip rows that are entirely blank.
            if row.values().all(|v| v.trim().is_empty()) {
                debug!("skipping blank source row");
                continue;
            }

            derive_columns(&mut row);
            rows.push(row);
        }

        Ok(SourceBatch {
            file_name: self.source_name().to_string(),
            file_hash,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.csv");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn headers_are_normalized_to_canonical_columns() {
        let (_dir, path) = write_csv(
            "Customer ID,TransactionID,Transaction Date,Transaction Amount,Branch ID,City\n\
             C001,T001,2024-03-01,125.50,BR1,Seattle\n",
        );
        let batch = CsvFileSource::new(&path).fetch().unwrap();
        assert_eq!(batch.rows.len(), 1);
        let row = &batch.rows[0];
        assert_eq!(row.get("customer_id").unwrap(), "C001");
        assert_eq!(row.get("transaction_amount").unwrap(), "125.50");
        assert_eq!(row.get("branch_location").unwrap(), "Seattle");
    }

    #[test]
    fn customer_name_is_joined_and_product_type_coalesced() {
        let (_dir, path) = write_csv(
            "Customer ID,TransactionID,First Name,Last Name,Loan Type\n\
             C001,T001,Ada,Lovelace,Mortgage\n",
        );
        let batch = CsvFileSource::new(&path).fetch().unwrap();
        let row = &batch.rows[0];
        assert_eq!(row.get("customer_name").unwrap(), "Ada Lovelace");
        assert_eq!(row.get("product_type").unwrap(), "Mortgage");
    }

    #[test]
    fn blank_rows_are_skipped_and_hash_is_stable() {
        let content = "Customer ID,TransactionID\nC001,T001\n,\n";
        let (_dir, path) = write_csv(content);
        let source = CsvFileSource::new(&path);
        let first = source.fetch().unwrap();
        let second = source.fetch().unwrap();
        assert_eq!(first.rows.len(), 1);
        assert_eq!(first.file_hash, second.file_hash);
    }

    #[test]
    fn known_headers_map_into_canonical_columns() {
        for header in [
            "Customer ID",
            "TransactionID",
            "Transaction Date",
            "Transaction Amount",
            "Email",
            "Contact Number",
            "Age",
            "Branch ID",
            "City",
            "Loan Status",
        ] {
            let column = canonical_column(header);
            assert!(
                crate::source::CANONICAL_COLUMNS.contains(&column.as_str()),
                "{header} mapped to non-canonical column {column}"
            );
        }
        // Unknown headers are snake_cased instead of dropped.
        assert_eq!(canonical_column("Account Balance"), "account_balance");
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = CsvFileSource::new("/nonexistent/input.csv").fetch().unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
