use std::collections::BTreeMap;

use crate::common::error::Result;

pub mod csv_file;

/// The canonical operational columns a source adapter normalizes raw
/// headers into. Anything else the source carries is preserved only in the
/// verbatim payload.
pub const CANONICAL_COLUMNS: [&str; 15] = [
    "customer_id",
    "transaction_id",
    "transaction_date",
    "product_type",
    "transaction_amount",
    "transaction_type",
    "account_type",
    "account_status",
    "customer_name",
    "customer_email",
    "customer_phone",
    "customer_age",
    "customer_segment",
    "branch_id",
    "branch_location",
];

/// One untyped source row: column name -> raw text value.
pub type SourceRow = BTreeMap<String, String>;

/// A fetched source file with its provenance fields.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub file_name: String,
    pub file_hash: String,
    pub rows: Vec<SourceRow>,
}

/// Produces untyped raw records plus provenance for the extract stage.
/// File-format details stay behind this seam.
pub trait SourceAdapter {
    fn source_name(&self) -> &str;
    fn fetch(&self) -> Result<SourceBatch>;
}
