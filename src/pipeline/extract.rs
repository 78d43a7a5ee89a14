use tracing::info;

use crate::common::error::Result;
use crate::observability::metrics;
use crate::source::SourceAdapter;
use crate::storage::Warehouse;

/// Counts reported by the extract stage: rows read from the source and rows
/// newly staged (rows already staged from identical file content are
/// deduplicated away by the raw store).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOutcome {
    pub rows_extracted: u64,
    pub rows_staged: u64,
}

/// Fetches the source batch and persists it verbatim into the raw store,
/// tagged with provenance. Re-running against the same file content stages
/// nothing new.
pub fn extract_and_stage(
    warehouse: &mut Warehouse,
    source: &dyn SourceAdapter,
    batch_id: &str,
) -> Result<ExtractOutcome> {
    let batch = source.fetch()?;
    let rows_extracted = batch.rows.len() as u64;
    metrics::extract::rows_extracted(rows_extracted);

    let rows_staged = warehouse.insert_raw_rows(batch_id, &batch)?;
    metrics::extract::rows_staged(rows_staged);

    info!(
        batch_id,
        source = %batch.file_name,
        hash = %batch.file_hash,
        rows_extracted,
        rows_staged,
        "extract stage complete"
    );

    Ok(ExtractOutcome {
        rows_extracted,
        rows_staged,
    })
}
