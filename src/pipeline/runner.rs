use anyhow::Result;
use tracing::{error, info};

use crate::config::Config;
use crate::domain::{ExecutionStatus, QualityTable, RowCounts};
use crate::pipeline::cleanse::{CleanseOutcome, CleansingEngine};
use crate::pipeline::extract::{extract_and_stage, ExtractOutcome};
use crate::pipeline::ledger::{self, PIPELINE_NAME};
use crate::pipeline::load::{DimensionKeyCache, DimensionalLoader, LoadOutcome, LoadPolicy};
use crate::pipeline::quality::{QualityAssessor, QualityReport, QualityThresholds};
use crate::source::csv_file::CsvFileSource;
use crate::source::SourceAdapter;
use crate::storage::Warehouse;

/// Aggregate counts for one full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub batch_id: String,
    pub rows_extracted: u64,
    pub rows_transformed: u64,
    pub rows_loaded: u64,
    pub rows_rejected: u64,
    pub duplicates: u64,
    pub quality_pass: bool,
}

/// Drives the pipeline stages for a batch. Each stage is independently
/// invokable (the scheduler's four retryable entry points) and is wrapped
/// in an execution-ledger entry; a failed stage leaves a FAILED row and
/// propagates the error to the caller.
pub struct PipelineRunner {
    config: Config,
}

impl PipelineRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Opens the warehouse and applies the idempotent bootstrap (DDL,
    /// sentinel rows, calendar range).
    pub fn open_warehouse(&self) -> crate::common::error::Result<Warehouse> {
        let mut warehouse = Warehouse::open(
            &self.config.database.path,
            self.config.database.busy_timeout_ms,
        )?;
        warehouse.populate_calendar(
            self.config.etl.calendar_start_year,
            self.config.etl.calendar_end_year,
        )?;
        Ok(warehouse)
    }

    pub fn run_extract(&self, batch_id: &str) -> Result<ExtractOutcome> {
        let mut warehouse = self.open_warehouse()?;
        let source = CsvFileSource::new(&self.config.etl.input_path);
        self.extract_stage(&mut warehouse, &source, batch_id)
    }

    pub fn run_transform(&self, batch_id: &str) -> Result<CleanseOutcome> {
        let mut warehouse = self.open_warehouse()?;
        self.transform_stage(&mut warehouse, batch_id)
    }

    pub fn run_load(&self, batch_id: &str) -> Result<LoadOutcome> {
        let mut warehouse = self.open_warehouse()?;
        self.load_stage(&mut warehouse, batch_id)
    }

    pub fn run_quality(&self, batch_id: &str, table: QualityTable) -> Result<QualityReport> {
        let warehouse = self.open_warehouse()?;
        let mut reports = self.quality_stage(&warehouse, batch_id, &[table])?;
        reports
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no quality report produced for {}", table.table_name()))
    }

    /// Runs extract, transform, load, and quality checks for one batch, then
    /// records the aggregate `full_pipeline` ledger row the way the daily
    /// scheduler's logging task does.
    pub fn run(&self, batch_id: &str) -> Result<PipelineSummary> {
        let mut warehouse = self.open_warehouse()?;
        let source = CsvFileSource::new(&self.config.etl.input_path);

        let extract = self.extract_stage(&mut warehouse, &source, batch_id)?;
        let cleanse = self.transform_stage(&mut warehouse, batch_id)?;
        let load = self.load_stage(&mut warehouse, batch_id)?;
        let reports = self.quality_stage(
            &warehouse,
            batch_id,
            &[QualityTable::Raw, QualityTable::Cleaned, QualityTable::Fact],
        )?;
        let quality_pass = reports.iter().all(|r| r.pass);

        let counts = RowCounts {
            rows_extracted: extract.rows_extracted,
            rows_transformed: cleanse.rows_cleaned,
            rows_loaded: load.rows_loaded,
            rows_rejected: cleanse.rows_rejected,
        };
        let status = if quality_pass {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Warning
        };
        let handle = ledger::start(&warehouse, batch_id, PIPELINE_NAME, "full_pipeline")?;
        ledger::complete(&warehouse, handle, counts, status, None)?;

        info!(batch_id, status = status.as_str(), "pipeline run complete");
        Ok(PipelineSummary {
            batch_id: batch_id.to_string(),
            rows_extracted: extract.rows_extracted,
            rows_transformed: cleanse.rows_cleaned,
            rows_loaded: load.rows_loaded,
            rows_rejected: cleanse.rows_rejected,
            duplicates: load.duplicates,
            quality_pass,
        })
    }

    fn extract_stage(
        &self,
        warehouse: &mut Warehouse,
        source: &dyn SourceAdapter,
        batch_id: &str,
    ) -> Result<ExtractOutcome> {
        let handle = ledger::start(warehouse, batch_id, PIPELINE_NAME, "extract")?;
        match extract_and_stage(warehouse, source, batch_id) {
            Ok(outcome) => {
                let counts = RowCounts {
                    rows_extracted: outcome.rows_extracted,
                    ..RowCounts::default()
                };
                ledger::complete(warehouse, handle, counts, ExecutionStatus::Success, None)?;
                Ok(outcome)
            }
            Err(e) => {
                error!(batch_id, error = %e, "extract stage failed");
                ledger::complete(
                    warehouse,
                    handle,
                    RowCounts::default(),
                    ExecutionStatus::Failed,
                    Some(&e.to_string()),
                )?;
                Err(e.into())
            }
        }
    }

    fn transform_stage(&self, warehouse: &mut Warehouse, batch_id: &str) -> Result<CleanseOutcome> {
        let handle = ledger::start(warehouse, batch_id, PIPELINE_NAME, "transform")?;
        let engine = CleansingEngine::new(&self.config);
        match engine.cleanse_batch(warehouse, batch_id) {
            Ok(outcome) => {
                let counts = RowCounts {
                    rows_transformed: outcome.rows_cleaned,
                    rows_rejected: outcome.rows_rejected,
                    ..RowCounts::default()
                };
                ledger::complete(warehouse, handle, counts, ExecutionStatus::Success, None)?;
                Ok(outcome)
            }
            Err(e) => {
                error!(batch_id, error = %e, "transform stage failed");
                ledger::complete(
                    warehouse,
                    handle,
                    RowCounts::default(),
                    ExecutionStatus::Failed,
                    Some(&e.to_string()),
                )?;
                Err(e.into())
            }
        }
    }

    fn load_stage(&self, warehouse: &mut Warehouse, batch_id: &str) -> Result<LoadOutcome> {
        let handle = ledger::start(warehouse, batch_id, PIPELINE_NAME, "load")?;
        let cache = match DimensionKeyCache::from_warehouse(warehouse) {
            Ok(cache) => cache,
            Err(e) => {
                error!(batch_id, error = %e, "dimension cache priming failed");
                ledger::complete(
                    warehouse,
                    handle,
                    RowCounts::default(),
                    ExecutionStatus::Failed,
                    Some(&e.to_string()),
                )?;
                return Err(e.into());
            }
        };
        let mut loader = DimensionalLoader::new(cache, LoadPolicy::from(&self.config.load));
        match loader.load_batch(warehouse, batch_id) {
            Ok(outcome) => {
                let counts = RowCounts {
                    rows_loaded: outcome.rows_loaded,
                    ..RowCounts::default()
                };
                ledger::complete(warehouse, handle, counts, ExecutionStatus::Success, None)?;
                Ok(outcome)
            }
            Err(e) => {
                error!(batch_id, error = %e, "load stage failed");
                ledger::complete(
                    warehouse,
                    handle,
                    RowCounts::default(),
                    ExecutionStatus::Failed,
                    Some(&e.to_string()),
                )?;
                Err(e.into())
            }
        }
    }

    /// Assesses each table and persists the metrics. The stage itself
    /// succeeds even when checks fail; failing checks surface through the
    /// metric rows and the final pipeline status, never by blocking.
    fn quality_stage(
        &self,
        warehouse: &Warehouse,
        batch_id: &str,
        tables: &[QualityTable],
    ) -> Result<Vec<QualityReport>> {
        let handle = ledger::start(warehouse, batch_id, PIPELINE_NAME, "quality_check")?;
        let assessor = QualityAssessor::new(QualityThresholds::from(&self.config.quality));
        let mut reports = Vec::with_capacity(tables.len());
        for table in tables {
            match assessor.run(warehouse, batch_id, *table) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(batch_id, error = %e, "quality stage failed");
                    ledger::complete(
                        warehouse,
                        handle,
                        RowCounts::default(),
                        ExecutionStatus::Failed,
                        Some(&e.to_string()),
                    )?;
                    return Err(e.into());
                }
            }
        }
        ledger::complete(
            warehouse,
            handle,
            RowCounts::default(),
            ExecutionStatus::Success,
            None,
        )?;
        Ok(reports)
    }
}
