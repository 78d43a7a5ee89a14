//! Execution ledger: one audited row per (batch, task), mutated in place as
//! the stage progresses. Operators query `audit_execution_log` for pipeline
//! health instead of parsing logs.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::common::error::Result;
use crate::domain::{ExecutionStatus, RowCounts};
use crate::storage::Warehouse;

pub const PIPELINE_NAME: &str = "banking_etl_pipeline";

/// Handle returned by [`start`]; carries what [`complete`] needs to close
/// the same ledger row.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionHandle {
    row_id: i64,
    started_at: DateTime<Utc>,
}

/// Opens the ledger row for a stage run. A scheduler retry of the same
/// (batch, task) resets the existing row instead of inserting a second one.
pub fn start(
    warehouse: &Warehouse,
    batch_id: &str,
    pipeline_name: &str,
    task_name: &str,
) -> Result<ExecutionHandle> {
    let started_at = Utc::now();
    let row_id =
        warehouse.ledger_start(batch_id, pipeline_name, task_name, &started_at.to_rfc3339())?;
    info!(batch_id, task = task_name, "execution ledger entry opened");
    Ok(ExecutionHandle { row_id, started_at })
}

/// Closes a ledger row with final counts and status. Once the end timestamp
/// is written the row is terminal for this attempt.
pub fn complete(
    warehouse: &Warehouse,
    handle: ExecutionHandle,
    counts: RowCounts,
    status: ExecutionStatus,
    error_message: Option<&str>,
) -> Result<()> {
    let ended_at = Utc::now();
    let duration_seconds = (ended_at - handle.started_at).num_seconds();
    warehouse.ledger_complete(
        handle.row_id,
        counts,
        status.as_str(),
        &ended_at.to_rfc3339(),
        duration_seconds,
        error_message,
    )?;
    info!(
        task_handle = handle.row_id,
        status = status.as_str(),
        duration_seconds,
        "execution ledger entry closed"
    );
    Ok(())
}
