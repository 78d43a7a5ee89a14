//! Metrics for the ETL pipeline stages.
//!
//! Thin wrappers over the `metrics` facade using Prometheus naming
//! conventions, one module per stage so call sites stay free of magic
//! strings.

// ============================================================================
// Extract Metrics
// ============================================================================

pub mod extract {
    /// Record rows read from a source file
    pub fn rows_extracted(count: u64) {
        ::metrics::counter!("etl_extract_rows_extracted_total").increment(count);
    }

    /// Record rows newly staged (re-staged rows are deduplicated away)
    pub fn rows_staged(count: u64) {
        ::metrics::counter!("etl_extract_rows_staged_total").increment(count);
    }

    /// Record source payload size
    pub fn payload_bytes(bytes: usize) {
        ::metrics::histogram!("etl_extract_payload_bytes").record(bytes as f64);
    }
}

// ============================================================================
// Cleansing Metrics
// ============================================================================

pub mod cleanse {
    /// Record an accepted record
    pub fn record_cleaned() {
        ::metrics::counter!("etl_cleanse_records_cleaned_total").increment(1);
    }

    /// Record a rejected record, labelled by rejection reason
    pub fn record_rejected(reason: &str) {
        ::metrics::counter!("etl_cleanse_records_rejected_total", "reason" => reason.to_string())
            .increment(1);
    }

    /// Record a committed cleansing sub-batch
    pub fn chunk_committed(size: usize) {
        ::metrics::histogram!("etl_cleanse_chunk_size").record(size as f64);
        ::metrics::counter!("etl_cleanse_chunks_committed_total").increment(1);
    }
}

// ============================================================================
// Dimensional Load Metrics
// ============================================================================

pub mod load {
    /// Record an inserted fact row
    pub fn fact_inserted() {
        ::metrics::counter!("etl_load_facts_inserted_total").increment(1);
    }

    /// Record a duplicate transaction id skipped by the upsert
    pub fn duplicate_detected() {
        ::metrics::counter!("etl_load_duplicates_total").increment(1);
    }

    /// Record a sentinel-key fallback, labelled by dimension
    pub fn sentinel_fallback(dimension: &str) {
        ::metrics::counter!("etl_load_sentinel_fallbacks_total", "dimension" => dimension.to_string())
            .increment(1);
    }

    /// Record a new dimension row created during resolution
    pub fn dimension_created(dimension: &str) {
        ::metrics::counter!("etl_load_dimensions_created_total", "dimension" => dimension.to_string())
            .increment(1);
    }

    /// Record the quality score assigned to a fact row
    pub fn quality_score_recorded(score: f64) {
        ::metrics::histogram!("etl_load_quality_score").record(score);
    }
}

// ============================================================================
// Quality Assessor Metrics
// ============================================================================

pub mod quality {
    /// Record a persisted quality check, labelled by metric name and status
    pub fn check_recorded(metric: &str, status: &str) {
        ::metrics::counter!("etl_quality_checks_total",
            "metric" => metric.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
    }

    /// Record an assessed batch/table pair
    pub fn batch_assessed(table: &str) {
        ::metrics::counter!("etl_quality_batches_assessed_total", "table" => table.to_string())
            .increment(1);
    }
}
