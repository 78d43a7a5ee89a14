use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Surrogate key of the sentinel "UNKNOWN" row seeded in every dimension.
/// Facts whose natural keys cannot be resolved reference this row instead of
/// failing the load.
pub const UNKNOWN_KEY: i64 = 1;

/// Lifecycle of a staged raw record: `Pending` rows are eligible for the
/// next cleansing run, `Processed` rows are never picked up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawRecordState {
    Pending,
    Processed,
}

impl RawRecordState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawRecordState::Pending => "pending",
            RawRecordState::Processed => "processed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RawRecordState::Pending),
            "processed" => Some(RawRecordState::Processed),
            _ => None,
        }
    }
}

/// Lifecycle of a cleaned record: `Pending` rows await the dimensional
/// loader, `Loaded` rows are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanedRecordState {
    Pending,
    Loaded,
}

impl CleanedRecordState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanedRecordState::Pending => "pending",
            CleanedRecordState::Loaded => "loaded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CleanedRecordState::Pending),
            "loaded" => Some(CleanedRecordState::Loaded),
            _ => None,
        }
    }
}

/// One source row staged verbatim, tagged with provenance. Immutable once
/// written apart from the state flip performed by the cleansing engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: i64,
    pub batch_id: String,
    pub source_file_name: String,
    pub source_file_hash: String,
    pub row_index: i64,
    /// The untouched source row as column -> text JSON.
    pub payload: serde_json::Value,
    pub customer_id: Option<String>,
    pub transaction_id: Option<String>,
    pub transaction_date: Option<String>,
    pub product_type: Option<String>,
    pub transaction_amount: Option<String>,
    pub transaction_type: Option<String>,
    pub account_type: Option<String>,
    pub account_status: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_age: Option<String>,
    pub customer_segment: Option<String>,
    pub branch_id: Option<String>,
    pub branch_location: Option<String>,
    pub state: RawRecordState,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A validated, typed record produced from exactly one raw record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub id: Option<i64>,
    pub source_row_id: i64,
    pub batch_id: String,
    pub customer_id: String,
    pub transaction_id: String,
    pub transaction_date: NaiveDate,
    pub transaction_amount: f64,
    pub product_type: String,
    pub transaction_type: Option<String>,
    pub account_type: Option<String>,
    pub account_status: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_age: Option<i64>,
    pub customer_segment: String,
    pub branch_id: Option<String>,
    pub branch_location: Option<String>,
    pub state: CleanedRecordState,
}

/// Why the cleansing engine refused a raw record. Recorded in the rejection
/// audit trail and in the batch's rejected counter, never fatal to the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// A mandatory field was absent or empty after trimming.
    MissingField(&'static str),
    /// The amount did not parse as a number after character cleanup.
    NonNumericAmount(String),
    /// The amount parsed but was zero or negative.
    NonPositiveAmount(String),
    /// The date matched none of the accepted formats.
    UnparseableDate(String),
    /// Another record in the same batch already claimed this
    /// (customer_id, transaction_id, transaction_date) key.
    DuplicateInBatch,
}

impl RejectionReason {
    /// Stable label used for metrics and the audit trail.
    pub fn label(&self) -> &'static str {
        match self {
            RejectionReason::MissingField(_) => "missing_field",
            RejectionReason::NonNumericAmount(_) => "non_numeric_amount",
            RejectionReason::NonPositiveAmount(_) => "non_positive_amount",
            RejectionReason::UnparseableDate(_) => "unparseable_date",
            RejectionReason::DuplicateInBatch => "duplicate_in_batch",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::MissingField(field) => write!(f, "missing mandatory field {}", field),
            RejectionReason::NonNumericAmount(raw) => {
                write!(f, "non-numeric transaction_amount '{}'", raw)
            }
            RejectionReason::NonPositiveAmount(raw) => {
                write!(f, "non-positive transaction_amount '{}'", raw)
            }
            RejectionReason::UnparseableDate(raw) => {
                write!(f, "unparseable transaction_date '{}'", raw)
            }
            RejectionReason::DuplicateInBatch => {
                write!(f, "duplicate (customer_id, transaction_id, transaction_date) within batch")
            }
        }
    }
}

/// A fact row ready for insertion, with all dimension keys resolved.
#[derive(Debug, Clone)]
pub struct FactRecord {
    pub transaction_id: String,
    pub customer_key: i64,
    pub product_key: i64,
    pub time_key: i64,
    /// Branch is the one optional dimension; absent branch ids stay NULL.
    pub branch_key: Option<i64>,
    pub account_id: String,
    pub transaction_amount: f64,
    pub transaction_type: Option<String>,
    pub account_type: Option<String>,
    pub account_status: Option<String>,
    pub transaction_date: NaiveDate,
    pub data_quality_score: f64,
    pub batch_id: String,
}

/// Outcome severity of a quality check. Variant order defines severity,
/// so `max` of two statuses yields the stricter one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityStatus {
    Pass,
    Warning,
    Fail,
}

impl QualityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityStatus::Pass => "PASS",
            QualityStatus::Warning => "WARNING",
            QualityStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One computed quality check result, persisted append-only per
/// (batch, table, metric).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetric {
    pub table_name: String,
    pub metric_name: String,
    pub value: f64,
    pub percentage: Option<f64>,
    pub record_count: i64,
    pub status: QualityStatus,
    pub description: String,
}

/// Tables the quality assessor knows how to profile, with their mandatory
/// and optional column sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTable {
    Raw,
    Cleaned,
    Fact,
}

impl QualityTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            QualityTable::Raw => "staging_raw_records",
            QualityTable::Cleaned => "staging_cleaned_records",
            QualityTable::Fact => "fact_transactions",
        }
    }

    pub fn mandatory_columns(&self) -> &'static [&'static str] {
        match self {
            QualityTable::Raw | QualityTable::Cleaned => {
                &["customer_id", "transaction_id", "transaction_date", "transaction_amount"]
            }
            QualityTable::Fact => {
                &["transaction_id", "customer_key", "product_key", "time_key", "transaction_amount"]
            }
        }
    }

    pub fn optional_columns(&self) -> &'static [&'static str] {
        match self {
            QualityTable::Raw | QualityTable::Cleaned => &[
                "customer_name",
                "customer_email",
                "customer_phone",
                "customer_age",
                "branch_id",
                "branch_location",
            ],
            QualityTable::Fact => {
                &["branch_key", "transaction_type", "account_type", "account_status"]
            }
        }
    }

    pub fn duplicate_key_columns(&self) -> &'static [&'static str] {
        match self {
            QualityTable::Raw | QualityTable::Cleaned => {
                &["customer_id", "transaction_id", "transaction_date"]
            }
            QualityTable::Fact => &["transaction_id"],
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Some(QualityTable::Raw),
            "cleaned" => Some(QualityTable::Cleaned),
            "fact" => Some(QualityTable::Fact),
            _ => None,
        }
    }
}

/// Terminal and in-flight states recorded in the execution ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Running,
    Success,
    Warning,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Warning => "WARNING",
            ExecutionStatus::Failed => "FAILED",
        }
    }
}

/// Row counters reported to the execution ledger when a stage completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowCounts {
    pub rows_extracted: u64,
    pub rows_transformed: u64,
    pub rows_loaded: u64,
    pub rows_rejected: u64,
}
