use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::common::error::{EtlError, Result};
use crate::domain::{
    CleanedRecord, CleanedRecordState, FactRecord, QualityMetric, QualityTable, RawRecord,
    RawRecordState, RejectionReason, RowCounts,
};
use crate::source::SourceBatch;

mod schema;

/// Outcome of a fact upsert: either a fresh row or a detected duplicate
/// transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactLoadOutcome {
    Inserted,
    Duplicate,
}

/// The relational store behind all three namespaces (staging, warehouse,
/// audit). Owns every SQL statement in the crate; the SQLite file is the
/// authoritative state, in-memory caches are never trusted over it.
pub struct Warehouse {
    conn: Connection,
}

/// True when an error is a unique-constraint conflict, the signal the
/// dimension resolution protocol recovers from by re-fetching.
pub fn is_constraint_violation(err: &EtlError) -> bool {
    matches!(
        err,
        EtlError::Database(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn parse_utc(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, format!("bad timestamp '{}': {}", raw, e)))
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| conversion_err(idx, format!("bad date '{}': {}", raw, e)))
}

const RAW_COLUMNS: &str = "id, batch_id, source_file_name, source_file_hash, row_index, payload, \
     customer_id, transaction_id, transaction_date, product_type, transaction_amount, \
     transaction_type, account_type, account_status, customer_name, customer_email, \
     customer_phone, customer_age, customer_segment, branch_id, branch_location, \
     state, processed_at, created_at";

const CLEANED_COLUMNS: &str = "id, source_row_id, batch_id, customer_id, transaction_id, \
     transaction_date, transaction_amount, product_type, transaction_type, account_type, \
     account_status, customer_name, customer_email, customer_phone, customer_age, \
     customer_segment, branch_id, branch_location, state";

fn raw_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    let payload_text: String = row.get(5)?;
    let payload = serde_json::from_str(&payload_text)
        .map_err(|e| conversion_err(5, format!("bad payload JSON: {}", e)))?;
    let state_text: String = row.get(21)?;
    let state = RawRecordState::parse(&state_text)
        .ok_or_else(|| conversion_err(21, format!("unknown raw state '{}'", state_text)))?;
    let processed_at = row
        .get::<_, Option<String>>(22)?
        .map(|s| parse_utc(22, &s))
        .transpose()?;
    let created_at = parse_utc(23, &row.get::<_, String>(23)?)?;

    Ok(RawRecord {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        source_file_name: row.get(2)?,
        source_file_hash: row.get(3)?,
        row_index: row.get(4)?,
        payload,
        customer_id: row.get(6)?,
        transaction_id: row.get(7)?,
        transaction_date: row.get(8)?,
        product_type: row.get(9)?,
        transaction_amount: row.get(10)?,
        transaction_type: row.get(11)?,
        account_type: row.get(12)?,
        account_status: row.get(13)?,
        customer_name: row.get(14)?,
        customer_email: row.get(15)?,
        customer_phone: row.get(16)?,
        customer_age: row.get(17)?,
        customer_segment: row.get(18)?,
        branch_id: row.get(19)?,
        branch_location: row.get(20)?,
        state,
        processed_at,
        created_at,
    })
}

fn cleaned_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CleanedRecord> {
    let state_text: String = row.get(18)?;
    let state = CleanedRecordState::parse(&state_text)
        .ok_or_else(|| conversion_err(18, format!("unknown cleaned state '{}'", state_text)))?;

    Ok(CleanedRecord {
        id: Some(row.get(0)?),
        source_row_id: row.get(1)?,
        batch_id: row.get(2)?,
        customer_id: row.get(3)?,
        transaction_id: row.get(4)?,
        transaction_date: parse_date(5, &row.get::<_, String>(5)?)?,
        transaction_amount: row.get(6)?,
        product_type: row.get(7)?,
        transaction_type: row.get(8)?,
        account_type: row.get(9)?,
        account_status: row.get(10)?,
        customer_name: row.get(11)?,
        customer_email: row.get(12)?,
        customer_phone: row.get(13)?,
        customer_age: row.get(14)?,
        customer_segment: row.get(15)?,
        branch_id: row.get(16)?,
        branch_location: row.get(17)?,
        state,
    })
}

fn insert_cleaned(conn: &Connection, rec: &CleanedRecord, now: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO staging_cleaned_records
         (source_row_id, batch_id, customer_id, transaction_id, transaction_date,
          transaction_amount, product_type, transaction_type, account_type, account_status,
          customer_name, customer_email, customer_phone, customer_age, customer_segment,
          branch_id, branch_location, state, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            rec.source_row_id,
            rec.batch_id,
            rec.customer_id,
            rec.transaction_id,
            rec.transaction_date.format("%Y-%m-%d").to_string(),
            rec.transaction_amount,
            rec.product_type,
            rec.transaction_type,
            rec.account_type,
            rec.account_status,
            rec.customer_name,
            rec.customer_email,
            rec.customer_phone,
            rec.customer_age,
            rec.customer_segment,
            rec.branch_id,
            rec.branch_location,
            rec.state.as_str(),
            now,
        ],
    )
}

impl Warehouse {
    /// Opens (creating if needed) the warehouse database at `path` and
    /// applies the idempotent DDL plus sentinel seeding.
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout_ms: u64) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        Self::initialize(conn, busy_timeout_ms)
    }

    /// In-memory warehouse, used by tests and ad-hoc assessments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, 1_000)
    }

    fn initialize(conn: Connection, busy_timeout_ms: u64) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        conn.execute_batch(schema::SCHEMA_DDL)?;
        conn.execute_batch(schema::SENTINEL_DDL)?;
        Ok(Self { conn })
    }

    // ------------------------------------------------------------------
    // Calendar dimension
    // ------------------------------------------------------------------

    /// Pre-populates the calendar dimension for the configured year range.
    /// Re-running is a no-op for dates already present.
    pub fn populate_calendar(&mut self, start_year: i32, end_year: i32) -> Result<usize> {
        let first = NaiveDate::from_ymd_opt(start_year, 1, 1)
            .ok_or_else(|| EtlError::Config(format!("invalid calendar start year {start_year}")))?;
        let last = NaiveDate::from_ymd_opt(end_year, 12, 31)
            .ok_or_else(|| EtlError::Config(format!("invalid calendar end year {end_year}")))?;

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        let mut date = first;
        while date <= last {
            let weekday = date.weekday().number_from_monday();
            inserted += tx.execute(
                "INSERT OR IGNORE INTO dim_time
                 (date, year, quarter, month, day, day_of_week, day_name, month_name,
                  week_of_year, is_weekend)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    date.format("%Y-%m-%d").to_string(),
                    date.year(),
                    (date.month0() / 3) + 1,
                    date.month(),
                    date.day(),
                    weekday,
                    date.format("%A").to_string(),
                    date.format("%B").to_string(),
                    date.iso_week().week(),
                    (weekday >= 6) as i64,
                ],
            )?;
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        tx.commit()?;
        if inserted > 0 {
            info!(inserted, start_year, end_year, "calendar dimension populated");
        }
        Ok(inserted)
    }

    // ------------------------------------------------------------------
    // Raw staging
    // ------------------------------------------------------------------

    /// Stages a fetched source batch verbatim. Rows already staged from the
    /// same file content are ignored, so re-extracting is safe.
    pub fn insert_raw_rows(&mut self, batch_id: &str, batch: &SourceBatch) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let col = |row: &crate::source::SourceRow, name: &str| -> Option<String> {
            row.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let tx = self.conn.transaction()?;
        let mut staged = 0u64;
        for (row_index, row) in batch.rows.iter().enumerate() {
            let payload = serde_json::to_string(row)?;
            staged += tx.execute(
                "INSERT OR IGNORE INTO staging_raw_records
                 (batch_id, source_file_name, source_file_hash, row_index, payload,
                  customer_id, transaction_id, transaction_date, product_type,
                  transaction_amount, transaction_type, account_type, account_status,
                  customer_name, customer_email, customer_phone, customer_age,
                  customer_segment, branch_id, branch_location, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                         ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                params![
                    batch_id,
                    batch.file_name,
                    batch.file_hash,
                    row_index as i64,
                    payload,
                    col(row, "customer_id"),
                    col(row, "transaction_id"),
                    col(row, "transaction_date"),
                    col(row, "product_type"),
                    col(row, "transaction_amount"),
                    col(row, "transaction_type"),
                    col(row, "account_type"),
                    col(row, "account_status"),
                    col(row, "customer_name"),
                    col(row, "customer_email"),
                    col(row, "customer_phone"),
                    col(row, "customer_age"),
                    col(row, "customer_segment"),
                    col(row, "branch_id"),
                    col(row, "branch_location"),
                    RawRecordState::Pending.as_str(),
                    now,
                ],
            )? as u64;
        }
        tx.commit()?;
        Ok(staged)
    }

    /// Raw records still awaiting cleansing, oldest first, bounded by `limit`.
    pub fn fetch_pending_raw(&self, limit: usize) -> Result<Vec<RawRecord>> {
        let sql = format!(
            "SELECT {RAW_COLUMNS} FROM staging_raw_records
             WHERE state = 'pending' ORDER BY id LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], raw_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Commits one cleansing sub-batch atomically: cleaned inserts, the
    /// rejection audit trail, and the raw-state flips land together or not
    /// at all.
    pub fn commit_cleanse_chunk(
        &mut self,
        batch_id: &str,
        cleaned: &[CleanedRecord],
        rejects: &[(i64, RejectionReason)],
        processed_ids: &[i64],
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        for rec in cleaned {
            insert_cleaned(&tx, rec, &now)?;
        }
        for (source_row_id, reason) in rejects {
            tx.execute(
                "INSERT INTO audit_rejected_records (batch_id, source_row_id, rejection_reason)
                 VALUES (?1, ?2, ?3)",
                params![batch_id, source_row_id, reason.to_string()],
            )?;
        }
        for id in processed_ids {
            tx.execute(
                "UPDATE staging_raw_records
                 SET state = 'processed', processed_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
        }
        tx.commit()?;
        debug!(
            cleaned = cleaned.len(),
            rejected = rejects.len(),
            "cleansing sub-batch committed"
        );
        Ok(())
    }

    /// Inserts a single cleaned record outside the cleansing flow (backfills
    /// and tests). `INSERT OR IGNORE` on source_row_id, like the batch path.
    pub fn insert_cleaned_record(&self, rec: &CleanedRecord) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        insert_cleaned(&self.conn, rec, &now)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Cleaned records not yet loaded into the fact table, oldest first.
    pub fn fetch_unloaded_cleaned(&self) -> Result<Vec<CleanedRecord>> {
        let sql = format!(
            "SELECT {CLEANED_COLUMNS} FROM staging_cleaned_records
             WHERE state = 'pending' ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], cleaned_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Dimensions
    // ------------------------------------------------------------------

    pub fn customer_dimension_keys(&self) -> Result<Vec<(String, i64)>> {
        self.natural_key_pairs("SELECT customer_id, customer_key FROM dim_customer")
    }

    pub fn product_dimension_keys(&self) -> Result<Vec<(String, i64)>> {
        self.natural_key_pairs("SELECT product_type, product_key FROM dim_product")
    }

    pub fn branch_dimension_keys(&self) -> Result<Vec<(String, i64)>> {
        self.natural_key_pairs("SELECT branch_id, branch_key FROM dim_branch")
    }

    fn natural_key_pairs(&self, sql: &str) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Calendar keys by date. The sentinel row carries a placeholder date
    /// and is skipped here.
    pub fn time_dimension_keys(&self) -> Result<Vec<(NaiveDate, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, time_key FROM dim_time WHERE time_key <> 1")?;
        let rows = stmt
            .query_map([], |row| {
                let date = parse_date(0, &row.get::<_, String>(0)?)?;
                Ok((date, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Plain insert of a new customer dimension row. A unique-constraint
    /// conflict propagates to the caller, which re-fetches the winner's key.
    pub fn insert_customer_dimension(&self, rec: &CleanedRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO dim_customer
             (customer_id, customer_name, customer_email, customer_phone, customer_age,
              customer_segment, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
            params![
                rec.customer_id,
                rec.customer_name,
                rec.customer_email,
                rec.customer_phone,
                rec.customer_age,
                rec.customer_segment,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_customer_key(&self, customer_id: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT customer_key FROM dim_customer WHERE customer_id = ?1",
                params![customer_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn insert_product_dimension(&self, product_type: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO dim_product (product_type, product_name, product_category, is_active)
             VALUES (?1, ?1, 'BANKING', 1)",
            params![product_type],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_product_key(&self, product_type: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT product_key FROM dim_product WHERE product_type = ?1",
                params![product_type],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn insert_branch_dimension(
        &self,
        branch_id: &str,
        branch_location: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO dim_branch (branch_id, branch_name, branch_location, is_active)
             VALUES (?1, ?1, ?2, 1)",
            params![branch_id, branch_location],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_branch_key(&self, branch_id: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT branch_key FROM dim_branch WHERE branch_id = ?1",
                params![branch_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    // ------------------------------------------------------------------
    // Facts
    // ------------------------------------------------------------------

    /// Upserts one fact row and flips its cleaned record to loaded in the
    /// same transaction. An existing transaction id is never inserted twice;
    /// the surviving row is optionally flagged as a duplicate.
    pub fn upsert_fact(
        &mut self,
        fact: &FactRecord,
        cleaned_row_id: i64,
        mark_duplicates: bool,
    ) -> Result<FactLoadOutcome> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT fact_key FROM fact_transactions WHERE transaction_id = ?1",
                params![fact.transaction_id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(fact_key) => {
                if mark_duplicates {
                    tx.execute(
                        "UPDATE fact_transactions SET is_duplicate = 1 WHERE fact_key = ?1",
                        params![fact_key],
                    )?;
                }
                FactLoadOutcome::Duplicate
            }
            None => {
                tx.execute(
                    "INSERT INTO fact_transactions
                     (transaction_id, customer_key, product_key, time_key, branch_key,
                      account_id, transaction_amount, transaction_type, account_type,
                      account_status, transaction_date, is_duplicate, data_quality_score,
                      batch_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?13)",
                    params![
                        fact.transaction_id,
                        fact.customer_key,
                        fact.product_key,
                        fact.time_key,
                        fact.branch_key,
                        fact.account_id,
                        fact.transaction_amount,
                        fact.transaction_type,
                        fact.account_type,
                        fact.account_status,
                        fact.transaction_date.format("%Y-%m-%d").to_string(),
                        fact.data_quality_score,
                        fact.batch_id,
                    ],
                )?;
                FactLoadOutcome::Inserted
            }
        };

        tx.execute(
            "UPDATE staging_cleaned_records SET state = 'loaded', loaded_at = ?1 WHERE id = ?2",
            params![now, cleaned_row_id],
        )?;
        tx.commit()?;
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Quality aggregates (static identifiers only in the built SQL)
    // ------------------------------------------------------------------

    pub fn quality_row_count(&self, table: QualityTable, batch_id: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE batch_id = ?1",
            table.table_name()
        );
        Ok(self.conn.query_row(&sql, params![batch_id], |row| row.get(0))?)
    }

    /// Rows in the batch whose mandatory columns are all present.
    pub fn complete_row_count(&self, table: QualityTable, batch_id: &str) -> Result<i64> {
        let predicate = table
            .mandatory_columns()
            .iter()
            .map(|c| format!("{c} IS NOT NULL AND TRIM({c}) <> ''"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE batch_id = ?1 AND {}",
            table.table_name(),
            predicate
        );
        Ok(self.conn.query_row(&sql, params![batch_id], |row| row.get(0))?)
    }

    /// Null (or blank) counts per optional column for the batch.
    pub fn null_column_counts(
        &self,
        table: QualityTable,
        batch_id: &str,
    ) -> Result<Vec<(String, i64)>> {
        let columns = table.optional_columns();
        let select_list = columns
            .iter()
            .map(|c| format!("SUM(CASE WHEN {c} IS NULL OR TRIM({c}) = '' THEN 1 ELSE 0 END)"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE batch_id = ?1",
            select_list,
            table.table_name()
        );
        let counts = self.conn.query_row(&sql, params![batch_id], |row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, c)| Ok((c.to_string(), row.get::<_, Option<i64>>(i)?.unwrap_or(0))))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;
        Ok(counts)
    }

    /// Rows belonging to a duplicate group on the table's duplicate key.
    pub fn duplicate_row_count(&self, table: QualityTable, batch_id: &str) -> Result<i64> {
        let key = table.duplicate_key_columns().join(", ");
        let sql = format!(
            "SELECT COALESCE(SUM(n), 0) FROM (
                SELECT COUNT(*) AS n FROM {} WHERE batch_id = ?1
                GROUP BY {} HAVING COUNT(*) > 1
             )",
            table.table_name(),
            key
        );
        Ok(self.conn.query_row(&sql, params![batch_id], |row| row.get(0))?)
    }

    /// Fact rows in the batch that fell back to a sentinel dimension key.
    pub fn sentinel_fact_count(&self, batch_id: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM fact_transactions
             WHERE batch_id = ?1
               AND (customer_key = 1 OR product_key = 1 OR time_key = 1
                    OR IFNULL(branch_key, 0) = 1)",
            params![batch_id],
            |row| row.get(0),
        )?)
    }

    /// Appends one quality metric row; metric history is never mutated.
    pub fn insert_quality_metric(&self, batch_id: &str, metric: &QualityMetric) -> Result<()> {
        self.conn.execute(
            "INSERT INTO audit_quality_metrics
             (batch_id, table_name, metric_name, metric_value, metric_percentage,
              record_count, quality_status, metric_description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                batch_id,
                metric.table_name,
                metric.metric_name,
                metric.value,
                metric.percentage,
                metric.record_count,
                metric.status.as_str(),
                metric.description,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution ledger
    // ------------------------------------------------------------------

    /// Opens (or resets, on scheduler retry) the ledger row for a stage.
    pub fn ledger_start(
        &self,
        batch_id: &str,
        pipeline_name: &str,
        task_name: &str,
        started_at: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO audit_execution_log
             (batch_id, pipeline_name, task_name, execution_start, execution_status)
             VALUES (?1, ?2, ?3, ?4, 'RUNNING')
             ON CONFLICT(batch_id, task_name) DO UPDATE SET
                 execution_start = excluded.execution_start,
                 execution_end = NULL,
                 execution_status = 'RUNNING',
                 error_message = NULL",
            params![batch_id, pipeline_name, task_name, started_at],
        )?;
        Ok(self.conn.query_row(
            "SELECT id FROM audit_execution_log WHERE batch_id = ?1 AND task_name = ?2",
            params![batch_id, task_name],
            |row| row.get(0),
        )?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ledger_complete(
        &self,
        row_id: i64,
        counts: RowCounts,
        status: &str,
        ended_at: &str,
        duration_seconds: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE audit_execution_log SET
                 execution_end = ?1,
                 execution_status = ?2,
                 rows_extracted = ?3,
                 rows_transformed = ?4,
                 rows_loaded = ?5,
                 rows_rejected = ?6,
                 duration_seconds = ?7,
                 error_message = ?8
             WHERE id = ?9",
            params![
                ended_at,
                status,
                counts.rows_extracted as i64,
                counts.rows_transformed as i64,
                counts.rows_loaded as i64,
                counts.rows_rejected as i64,
                duration_seconds,
                error_message,
                row_id,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Operator queries (also exercised by the integration tests)
    // ------------------------------------------------------------------

    pub fn raw_record_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM staging_raw_records", [], |r| r.get(0))?)
    }

    pub fn cleaned_record_count(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM staging_cleaned_records",
            [],
            |r| r.get(0),
        )?)
    }

    pub fn fact_record_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM fact_transactions", [], |r| r.get(0))?)
    }

    pub fn quality_metric_count(&self, batch_id: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM audit_quality_metrics WHERE batch_id = ?1",
            params![batch_id],
            |r| r.get(0),
        )?)
    }

    pub fn rejected_record_count(&self, batch_id: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM audit_rejected_records WHERE batch_id = ?1",
            params![batch_id],
            |r| r.get(0),
        )?)
    }

    pub fn fact_customer_key(&self, transaction_id: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT customer_key FROM fact_transactions WHERE transaction_id = ?1",
                params![transaction_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn fact_time_key(&self, transaction_id: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT time_key FROM fact_transactions WHERE transaction_id = ?1",
                params![transaction_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn fact_is_duplicate(&self, transaction_id: &str) -> Result<Option<bool>> {
        Ok(self
            .conn
            .query_row(
                "SELECT is_duplicate FROM fact_transactions WHERE transaction_id = ?1",
                params![transaction_id],
                |row| row.get::<_, i64>(0).map(|v| v != 0),
            )
            .optional()?)
    }

    /// Status and error message of a ledger row, for operator health checks.
    pub fn execution_log_status(
        &self,
        batch_id: &str,
        task_name: &str,
    ) -> Result<Option<(String, Option<String>)>> {
        Ok(self
            .conn
            .query_row(
                "SELECT execution_status, error_message FROM audit_execution_log
                 WHERE batch_id = ?1 AND task_name = ?2",
                params![batch_id, task_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?)
    }
}
