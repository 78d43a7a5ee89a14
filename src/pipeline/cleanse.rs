use std::collections::HashSet;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::common::error::Result;
use crate::config::Config;
use crate::domain::{CleanedRecord, CleanedRecordState, RawRecord, RejectionReason};
use crate::observability::metrics;
use crate::storage::Warehouse;
use crate::utils::title_case;

/// Strips currency symbols, separators, and other decoration before the
/// amount is parsed.
static AMOUNT_CLEANUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.\-]").unwrap());

/// Counts reported by the cleansing stage for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanseOutcome {
    pub rows_cleaned: u64,
    pub rows_rejected: u64,
}

/// Validates and types pending raw records, producing at most one cleaned
/// record per raw record. Rejections are counted and audited, never fatal
/// to the batch.
pub struct CleansingEngine {
    date_formats: Vec<String>,
    min_customer_age: i64,
    max_customer_age: i64,
    chunk_size: usize,
}

impl CleansingEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            date_formats: config.cleansing.date_formats.clone(),
            min_customer_age: config.cleansing.min_customer_age,
            max_customer_age: config.cleansing.max_customer_age,
            chunk_size: config.etl.batch_size,
        }
    }

    /// Processes every pending raw record in bounded sub-batches. Each
    /// sub-batch commits atomically together with its raw-state flips, so a
    /// crash mid-run neither reprocesses committed rows nor loses pending
    /// ones.
    pub fn cleanse_batch(
        &self,
        warehouse: &mut Warehouse,
        batch_id: &str,
    ) -> Result<CleanseOutcome> {
        let mut outcome = CleanseOutcome::default();
        // Duplicate key triple seen across the whole run, not just one chunk.
        let mut seen_keys: HashSet<(String, String, NaiveDate)> = HashSet::new();

        loop {
            let pending = warehouse.fetch_pending_raw(self.chunk_size)?;
            if pending.is_empty() {
                break;
            }

            let mut cleaned = Vec::new();
            let mut rejects = Vec::new();
            let mut processed_ids = Vec::with_capacity(pending.len());

            for raw in &pending {
                processed_ids.push(raw.id);
                match self.clean_record(raw, batch_id) {
                    Ok(record) => {
                        let key = (
                            record.customer_id.clone(),
                            record.transaction_id.clone(),
                            record.transaction_date,
                        );
                        if seen_keys.insert(key) {
                            metrics::cleanse::record_cleaned();
                            cleaned.push(record);
                        } else {
                            debug!(raw_id = raw.id, "rejecting in-batch duplicate");
                            metrics::cleanse::record_rejected(RejectionReason::DuplicateInBatch.label());
                            rejects.push((raw.id, RejectionReason::DuplicateInBatch));
                        }
                    }
                    Err(reason) => {
                        debug!(raw_id = raw.id, %reason, "rejecting raw record");
                        metrics::cleanse::record_rejected(reason.label());
                        rejects.push((raw.id, reason));
                    }
                }
            }

            outcome.rows_cleaned += cleaned.len() as u64;
            outcome.rows_rejected += rejects.len() as u64;
            warehouse.commit_cleanse_chunk(batch_id, &cleaned, &rejects, &processed_ids)?;
            metrics::cleanse::chunk_committed(processed_ids.len());
        }

        info!(
            batch_id,
            rows_cleaned = outcome.rows_cleaned,
            rows_rejected = outcome.rows_rejected,
            "cleansing stage complete"
        );
        Ok(outcome)
    }

    /// Applies the per-field rules to one raw record.
    fn clean_record(
        &self,
        raw: &RawRecord,
        batch_id: &str,
    ) -> std::result::Result<CleanedRecord, RejectionReason> {
        let transaction_id = non_empty(&raw.transaction_id)
            .ok_or(RejectionReason::MissingField("transaction_id"))?;
        let customer_id =
            non_empty(&raw.customer_id).ok_or(RejectionReason::MissingField("customer_id"))?;
        let amount_raw = non_empty(&raw.transaction_amount)
            .ok_or(RejectionReason::MissingField("transaction_amount"))?;
        let transaction_amount = self.clean_amount(&amount_raw)?;
        let date_raw = non_empty(&raw.transaction_date)
            .ok_or(RejectionReason::MissingField("transaction_date"))?;
        let transaction_date = self.clean_date(&date_raw)?;

        let customer_age = non_empty(&raw.customer_age).and_then(|s| self.clean_age(&s));

        Ok(CleanedRecord {
            id: None,
            source_row_id: raw.id,
            batch_id: batch_id.to_string(),
            customer_id,
            transaction_id,
            transaction_date,
            transaction_amount,
            product_type: non_empty(&raw.product_type)
                .map(|s| title_case(&s))
                .unwrap_or_else(|| "UNCLASSIFIED".to_string()),
            transaction_type: non_empty(&raw.transaction_type),
            account_type: non_empty(&raw.account_type),
            account_status: non_empty(&raw.account_status)
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            customer_name: non_empty(&raw.customer_name).map(|s| title_case(&s)),
            customer_email: non_empty(&raw.customer_email),
            customer_phone: non_empty(&raw.customer_phone),
            customer_age,
            customer_segment: non_empty(&raw.customer_segment)
                .unwrap_or_else(|| "GENERAL".to_string()),
            branch_id: non_empty(&raw.branch_id),
            branch_location: non_empty(&raw.branch_location).map(|s| title_case(&s)),
            state: CleanedRecordState::Pending,
        })
    }

    /// Parses an amount after character cleanup; anything non-numeric or
    /// not strictly positive is a rejection.
    fn clean_amount(&self, raw: &str) -> std::result::Result<f64, RejectionReason> {
        let stripped = AMOUNT_CLEANUP.replace_all(raw, "");
        let amount: f64 = stripped
            .parse()
            .map_err(|_| RejectionReason::NonNumericAmount(raw.to_string()))?;
        if !amount.is_finite() {
            return Err(RejectionReason::NonNumericAmount(raw.to_string()));
        }
        if amount <= 0.0 {
            return Err(RejectionReason::NonPositiveAmount(raw.to_string()));
        }
        // Monetary amounts are stored at cent precision.
        Ok((amount * 100.0).round() / 100.0)
    }

    /// Tries the accepted date formats in order.
    fn clean_date(&self, raw: &str) -> std::result::Result<NaiveDate, RejectionReason> {
        for format in &self.date_formats {
            if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                return Ok(date);
            }
        }
        Err(RejectionReason::UnparseableDate(raw.to_string()))
    }

    /// Ages are soft-cleaned: unparseable or implausible values become null
    /// rather than rejecting the record.
    fn clean_age(&self, raw: &str) -> Option<i64> {
        let age: i64 = raw.parse().ok()?;
        if age < self.min_customer_age || age > self.max_customer_age {
            return None;
        }
        Some(age)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawRecordState;
    use crate::source::{SourceBatch, SourceRow};
    use chrono::Utc;

    fn engine() -> CleansingEngine {
        CleansingEngine::new(&Config::default())
    }

    fn raw_record(fields: &[(&str, &str)]) -> RawRecord {
        let mut record = RawRecord {
            id: 1,
            batch_id: "b1".to_string(),
            source_file_name: "input.csv".to_string(),
            source_file_hash: "hash".to_string(),
            row_index: 0,
            payload: serde_json::json!({}),
            customer_id: None,
            transaction_id: None,
            transaction_date: None,
            product_type: None,
            transaction_amount: None,
            transaction_type: None,
            account_type: None,
            account_status: None,
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            customer_age: None,
            customer_segment: None,
            branch_id: None,
            branch_location: None,
            state: RawRecordState::Pending,
            processed_at: None,
            created_at: Utc::now(),
        };
        for (field, value) in fields {
            let value = Some(value.to_string());
            match *field {
                "customer_id" => record.customer_id = value,
                "transaction_id" => record.transaction_id = value,
                "transaction_date" => record.transaction_date = value,
                "transaction_amount" => record.transaction_amount = value,
                "customer_age" => record.customer_age = value,
                "customer_name" => record.customer_name = value,
                "product_type" => record.product_type = value,
                other => panic!("unexpected field {other}"),
            }
        }
        record
    }

    fn valid_fields() -> Vec<(&'static str, &'static str)> {
        vec![
            ("customer_id", "C001"),
            ("transaction_id", "T001"),
            ("transaction_date", "2024-03-01"),
            ("transaction_amount", "125.50"),
        ]
    }

    #[test]
    fn valid_record_is_cleaned_with_defaults_applied() {
        let record = engine().clean_record(&raw_record(&valid_fields()), "b1").unwrap();
        assert_eq!(record.transaction_amount, 125.50);
        assert_eq!(record.product_type, "UNCLASSIFIED");
        assert_eq!(record.account_status, "UNKNOWN");
        assert_eq!(record.customer_segment, "GENERAL");
        assert_eq!(record.source_row_id, 1);
    }

    #[test]
    fn missing_mandatory_fields_reject() {
        let mut fields = valid_fields();
        fields.retain(|(f, _)| *f != "customer_id");
        let err = engine().clean_record(&raw_record(&fields), "b1").unwrap_err();
        assert_eq!(err, RejectionReason::MissingField("customer_id"));

        // Whitespace-only counts as missing.
        let mut fields = valid_fields();
        fields.retain(|(f, _)| *f != "transaction_id");
        fields.push(("transaction_id", "   "));
        let err = engine().clean_record(&raw_record(&fields), "b1").unwrap_err();
        assert_eq!(err, RejectionReason::MissingField("transaction_id"));
    }

    #[test]
    fn negative_and_zero_amounts_reject() {
        let engine = engine();
        assert_eq!(
            engine.clean_amount("-50.00").unwrap_err(),
            RejectionReason::NonPositiveAmount("-50.00".to_string())
        );
        assert_eq!(
            engine.clean_amount("0").unwrap_err(),
            RejectionReason::NonPositiveAmount("0".to_string())
        );
        assert_eq!(
            engine.clean_amount("not-a-number").unwrap_err(),
            RejectionReason::NonNumericAmount("not-a-number".to_string())
        );
    }

    #[test]
    fn decorated_amounts_are_cleaned() {
        let engine = engine();
        assert_eq!(engine.clean_amount("$1,250.75").unwrap(), 1250.75);
        assert_eq!(engine.clean_amount(" 42 USD ").unwrap(), 42.0);
    }

    #[test]
    fn date_formats_are_tried_in_order() {
        let engine = engine();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(engine.clean_date("2024-03-01").unwrap(), expected);
        assert_eq!(engine.clean_date("03/01/2024").unwrap(), expected);
        assert!(matches!(
            engine.clean_date("March 1st"),
            Err(RejectionReason::UnparseableDate(_))
        ));
    }

    #[test]
    fn implausible_ages_are_soft_cleaned_to_null() {
        let engine = engine();
        assert_eq!(engine.clean_age("42"), Some(42));
        assert_eq!(engine.clean_age("-3"), None);
        assert_eq!(engine.clean_age("150"), None);
        assert_eq!(engine.clean_age("forty"), None);

        // Implausible age never rejects the record itself.
        let mut fields = valid_fields();
        fields.push(("customer_age", "200"));
        let record = engine.clean_record(&raw_record(&fields), "b1").unwrap();
        assert_eq!(record.customer_age, None);
    }

    #[test]
    fn names_and_locations_are_title_cased() {
        let mut fields = valid_fields();
        fields.push(("customer_name", "ada LOVELACE"));
        fields.push(("product_type", "savings account"));
        let record = engine().clean_record(&raw_record(&fields), "b1").unwrap();
        assert_eq!(record.customer_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(record.product_type, "Savings Account");
    }

    fn stage_rows(warehouse: &mut Warehouse, rows: Vec<Vec<(&str, &str)>>) {
        let rows = rows
            .into_iter()
            .map(|fields| {
                let mut row = SourceRow::new();
                for (field, value) in fields {
                    row.insert(field.to_string(), value.to_string());
                }
                row
            })
            .collect();
        let batch = SourceBatch {
            file_name: "input.csv".to_string(),
            file_hash: "hash-1".to_string(),
            rows,
        };
        warehouse.insert_raw_rows("b1", &batch).unwrap();
    }

    #[test]
    fn cleanse_batch_commits_and_flips_raw_state() {
        let mut warehouse = Warehouse::open_in_memory().unwrap();
        stage_rows(
            &mut warehouse,
            vec![
                vec![
                    ("customer_id", "C001"),
                    ("transaction_id", "T001"),
                    ("transaction_date", "2024-03-01"),
                    ("transaction_amount", "10.00"),
                ],
                // Rejected: negative amount.
                vec![
                    ("customer_id", "C002"),
                    ("transaction_id", "T002"),
                    ("transaction_date", "2024-03-01"),
                    ("transaction_amount", "-50.00"),
                ],
                // Rejected: duplicate of the first key triple.
                vec![
                    ("customer_id", "C001"),
                    ("transaction_id", "T001"),
                    ("transaction_date", "2024-03-01"),
                    ("transaction_amount", "10.00"),
                ],
            ],
        );

        let outcome = engine().cleanse_batch(&mut warehouse, "b1").unwrap();
        assert_eq!(outcome.rows_cleaned, 1);
        assert_eq!(outcome.rows_rejected, 2);
        assert_eq!(warehouse.cleaned_record_count().unwrap(), 1);
        assert_eq!(warehouse.rejected_record_count("b1").unwrap(), 2);

        // Everything was marked processed; a re-run touches nothing.
        assert!(warehouse.fetch_pending_raw(10).unwrap().is_empty());
        let rerun = engine().cleanse_batch(&mut warehouse, "b1").unwrap();
        assert_eq!(rerun.rows_cleaned, 0);
        assert_eq!(rerun.rows_rejected, 0);
    }

    #[test]
    fn duplicate_raw_row_index_is_distinct_per_file_hash() {
        // Same row content from a different file is a separate raw record
        // and gets caught as an in-batch duplicate instead.
        let mut warehouse = Warehouse::open_in_memory().unwrap();
        let fields = vec![
            ("customer_id", "C001"),
            ("transaction_id", "T001"),
            ("transaction_date", "2024-03-01"),
            ("transaction_amount", "10.00"),
        ];
        stage_rows(&mut warehouse, vec![fields.clone()]);
        let mut row = SourceRow::new();
        for (field, value) in &fields {
            row.insert(field.to_string(), value.to_string());
        }
        warehouse
            .insert_raw_rows(
                "b1",
                &SourceBatch {
                    file_name: "other.csv".to_string(),
                    file_hash: "hash-2".to_string(),
                    rows: vec![row],
                },
            )
            .unwrap();

        let outcome = engine().cleanse_batch(&mut warehouse, "b1").unwrap();
        assert_eq!(outcome.rows_cleaned, 1);
        assert_eq!(outcome.rows_rejected, 1);
    }
}
