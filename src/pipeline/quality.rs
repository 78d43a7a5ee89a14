use tracing::info;

use crate::common::error::Result;
use crate::config::QualityConfig;
use crate::domain::{QualityMetric, QualityStatus, QualityTable};
use crate::observability::metrics;
use crate::storage::Warehouse;

/// Thresholds the assessor judges against, sourced from `[quality]`
/// configuration.
#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    pub min_completeness_pct: f64,
    pub max_null_pct: f64,
    pub duplicate_check_enabled: bool,
}

impl From<&QualityConfig> for QualityThresholds {
    fn from(config: &QualityConfig) -> Self {
        Self {
            min_completeness_pct: config.min_completeness_pct,
            max_null_pct: config.max_null_pct,
            duplicate_check_enabled: config.duplicate_check_enabled,
        }
    }
}

/// Result of assessing one (batch, table) pair. `pass` is true only when
/// every check passed outright; a failing check never blocks the load that
/// already happened, it surfaces for operational review.
#[derive(Debug, Clone)]
pub struct QualityReport {
    pub pass: bool,
    pub overall: QualityStatus,
    pub metrics: Vec<QualityMetric>,
}

/// Computes and persists data-quality metrics over a loaded batch. Each
/// check is independent; results are appended to the metric history, never
/// updated.
pub struct QualityAssessor {
    thresholds: QualityThresholds,
}

impl QualityAssessor {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn run(
        &self,
        warehouse: &Warehouse,
        batch_id: &str,
        table: QualityTable,
    ) -> Result<QualityReport> {
        let mut checks = vec![
            self.check_completeness(warehouse, batch_id, table)?,
            self.check_null_rate(warehouse, batch_id, table)?,
        ];
        if self.thresholds.duplicate_check_enabled {
            checks.push(self.check_duplicates(warehouse, batch_id, table)?);
        }
        if table == QualityTable::Fact {
            checks.push(self.check_referential_integrity(warehouse, batch_id)?);
        }

        for metric in &checks {
            warehouse.insert_quality_metric(batch_id, metric)?;
            metrics::quality::check_recorded(&metric.metric_name, metric.status.as_str());
        }
        metrics::quality::batch_assessed(table.table_name());

        let overall = checks
            .iter()
            .map(|m| m.status)
            .max()
            .unwrap_or(QualityStatus::Pass);
        info!(
            batch_id,
            table = table.table_name(),
            overall = %overall,
            checks = checks.len(),
            "quality assessment complete"
        );

        Ok(QualityReport {
            pass: overall == QualityStatus::Pass,
            overall,
            metrics: checks,
        })
    }

    /// Share of records with every mandatory field present.
    fn check_completeness(
        &self,
        warehouse: &Warehouse,
        batch_id: &str,
        table: QualityTable,
    ) -> Result<QualityMetric> {
        let total = warehouse.quality_row_count(table, batch_id)?;
        let complete = warehouse.complete_row_count(table, batch_id)?;
        let pct = if total > 0 {
            complete as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let status = if pct >= self.thresholds.min_completeness_pct {
            QualityStatus::Pass
        } else {
            QualityStatus::Fail
        };

        Ok(QualityMetric {
            table_name: table.table_name().to_string(),
            metric_name: "COMPLETENESS_PCT".to_string(),
            value: complete as f64,
            percentage: Some(round2(pct)),
            record_count: total,
            status,
            description: format!(
                "{complete} of {total} records have all mandatory fields (threshold {}%)",
                self.thresholds.min_completeness_pct
            ),
        })
    }

    /// Average null share across the table's optional columns.
    fn check_null_rate(
        &self,
        warehouse: &Warehouse,
        batch_id: &str,
        table: QualityTable,
    ) -> Result<QualityMetric> {
        let total = warehouse.quality_row_count(table, batch_id)?;
        let null_counts = warehouse.null_column_counts(table, batch_id)?;
        let avg_pct = if total > 0 && !null_counts.is_empty() {
            null_counts
                .iter()
                .map(|(_, nulls)| *nulls as f64 / total as f64 * 100.0)
                .sum::<f64>()
                / null_counts.len() as f64
        } else if total == 0 {
            100.0
        } else {
            0.0
        };
        let status = if avg_pct <= self.thresholds.max_null_pct {
            QualityStatus::Pass
        } else {
            QualityStatus::Fail
        };

        Ok(QualityMetric {
            table_name: table.table_name().to_string(),
            metric_name: "NULL_PERCENTAGE".to_string(),
            value: round2(avg_pct),
            percentage: Some(round2(avg_pct)),
            record_count: total,
            status,
            description: format!(
                "average null share across {} optional columns (max {}%)",
                null_counts.len(),
                self.thresholds.max_null_pct
            ),
        })
    }

    /// Share of records whose duplicate key is claimed by more than one
    /// record in the batch. Duplicates warn rather than fail: the loader's
    /// upsert already keeps them out of the fact table.
    fn check_duplicates(
        &self,
        warehouse: &Warehouse,
        batch_id: &str,
        table: QualityTable,
    ) -> Result<QualityMetric> {
        let total = warehouse.quality_row_count(table, batch_id)?;
        let duplicates = warehouse.duplicate_row_count(table, batch_id)?;
        let pct = if total > 0 {
            duplicates as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let status = if duplicates == 0 {
            QualityStatus::Pass
        } else {
            QualityStatus::Warning
        };

        Ok(QualityMetric {
            table_name: table.table_name().to_string(),
            metric_name: "DUPLICATES".to_string(),
            value: duplicates as f64,
            percentage: Some(round2(pct)),
            record_count: total,
            status,
            description: format!(
                "records sharing ({}) with another record",
                table.duplicate_key_columns().join(", ")
            ),
        })
    }

    /// Share of fact rows that fell back to a sentinel dimension key, the
    /// proxy for unresolved references.
    fn check_referential_integrity(
        &self,
        warehouse: &Warehouse,
        batch_id: &str,
    ) -> Result<QualityMetric> {
        let table = QualityTable::Fact;
        let total = warehouse.quality_row_count(table, batch_id)?;
        let unresolved = warehouse.sentinel_fact_count(batch_id)?;
        let pct = if total > 0 {
            unresolved as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let status = if unresolved == 0 {
            QualityStatus::Pass
        } else {
            QualityStatus::Warning
        };

        Ok(QualityMetric {
            table_name: table.table_name().to_string(),
            metric_name: "REFERENTIAL_INTEGRITY".to_string(),
            value: unresolved as f64,
            percentage: Some(round2(pct)),
            record_count: total,
            status,
            description: "fact rows referencing a sentinel dimension key".to_string(),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceBatch, SourceRow};

    fn assessor() -> QualityAssessor {
        QualityAssessor::new(QualityThresholds {
            min_completeness_pct: 95.0,
            max_null_pct: 5.0,
            duplicate_check_enabled: true,
        })
    }

    fn stage_raw_rows(warehouse: &mut Warehouse, rows: Vec<Vec<(&str, String)>>) {
        let rows = rows
            .into_iter()
            .map(|fields| {
                let mut row = SourceRow::new();
                for (field, value) in fields {
                    row.insert(field.to_string(), value);
                }
                row
            })
            .collect();
        warehouse
            .insert_raw_rows(
                "b1",
                &SourceBatch {
                    file_name: "input.csv".to_string(),
                    file_hash: "hash-1".to_string(),
                    rows,
                },
            )
            .unwrap();
    }

    fn full_row(i: usize) -> Vec<(&'static str, String)> {
        vec![
            ("customer_id", format!("C{i:03}")),
            ("transaction_id", format!("T{i:03}")),
            ("transaction_date", "2024-03-01".to_string()),
            ("transaction_amount", "10.00".to_string()),
            ("customer_name", "Ada Lovelace".to_string()),
            ("customer_email", "ada@example.com".to_string()),
            ("customer_phone", "555-0100".to_string()),
            ("customer_age", "36".to_string()),
            ("branch_id", "BR1".to_string()),
            ("branch_location", "Seattle".to_string()),
        ]
    }

    fn stage_complete_rows(warehouse: &mut Warehouse, n: usize, missing_customer_id: usize) {
        let rows = (0..n)
            .map(|i| {
                let mut fields = full_row(i);
                if i < missing_customer_id {
                    fields.retain(|(f, _)| *f != "customer_id");
                }
                fields
            })
            .collect();
        stage_raw_rows(warehouse, rows);
    }

    #[test]
    fn one_missing_mandatory_field_in_ten_fails_completeness() {
        let mut warehouse = Warehouse::open_in_memory().unwrap();
        stage_complete_rows(&mut warehouse, 10, 1);

        let report = assessor().run(&warehouse, "b1", QualityTable::Raw).unwrap();
        let completeness = report
            .metrics
            .iter()
            .find(|m| m.metric_name == "COMPLETENESS_PCT")
            .unwrap();
        assert_eq!(completeness.percentage, Some(90.0));
        assert_eq!(completeness.status, QualityStatus::Fail);
        assert!(!report.pass);
        assert_eq!(report.overall, QualityStatus::Fail);
    }

    #[test]
    fn fully_complete_batch_passes() {
        let mut warehouse = Warehouse::open_in_memory().unwrap();
        stage_complete_rows(&mut warehouse, 10, 0);

        let report = assessor().run(&warehouse, "b1", QualityTable::Raw).unwrap();
        assert!(report.pass);
        assert_eq!(report.overall, QualityStatus::Pass);
    }

    #[test]
    fn sparse_optional_columns_fail_null_rate() {
        let mut warehouse = Warehouse::open_in_memory().unwrap();
        // Mandatory fields only: every optional column is 100% null.
        let rows = (0..5)
            .map(|i| {
                let mut fields = full_row(i);
                fields.truncate(4);
                fields
            })
            .collect();
        stage_raw_rows(&mut warehouse, rows);

        let report = assessor().run(&warehouse, "b1", QualityTable::Raw).unwrap();
        let null_rate = report
            .metrics
            .iter()
            .find(|m| m.metric_name == "NULL_PERCENTAGE")
            .unwrap();
        assert_eq!(null_rate.value, 100.0);
        assert_eq!(null_rate.status, QualityStatus::Fail);
    }

    #[test]
    fn duplicates_warn_but_do_not_fail() {
        let mut warehouse = Warehouse::open_in_memory().unwrap();
        let mut dup = full_row(0);
        // Same (customer_id, transaction_id, transaction_date) as row 0.
        let mut second = full_row(1);
        second[0] = ("customer_id", "C000".to_string());
        second[1] = ("transaction_id", "T000".to_string());
        let other = full_row(2);
        dup[4] = ("customer_name", "Someone Else".to_string());
        stage_raw_rows(&mut warehouse, vec![dup, second, other]);

        let report = assessor().run(&warehouse, "b1", QualityTable::Raw).unwrap();
        let duplicates = report
            .metrics
            .iter()
            .find(|m| m.metric_name == "DUPLICATES")
            .unwrap();
        assert_eq!(duplicates.value, 2.0);
        assert_eq!(duplicates.status, QualityStatus::Warning);
        assert_eq!(report.overall, QualityStatus::Warning);
        assert!(!report.pass);
    }

    #[test]
    fn metric_history_is_append_only() {
        let mut warehouse = Warehouse::open_in_memory().unwrap();
        stage_complete_rows(&mut warehouse, 3, 0);

        let first = assessor().run(&warehouse, "b1", QualityTable::Raw).unwrap();
        let second = assessor().run(&warehouse, "b1", QualityTable::Raw).unwrap();
        assert_eq!(first.metrics.len(), second.metrics.len());
        assert_eq!(
            warehouse.quality_metric_count("b1").unwrap() as usize,
            first.metrics.len() + second.metrics.len()
        );
    }
}
