use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::common::error::{EtlError, Result};
use crate::domain::{CleanedRecord, FactRecord, UNKNOWN_KEY};
use crate::observability::metrics;
use crate::storage::{is_constraint_violation, FactLoadOutcome, Warehouse};

/// In-memory natural-key -> surrogate-key cache, owned by one loader
/// instance per run. Read-through and write-back only; the warehouse
/// remains authoritative.
#[derive(Debug, Default)]
pub struct DimensionKeyCache {
    customers: HashMap<String, i64>,
    products: HashMap<String, i64>,
    branches: HashMap<String, i64>,
    calendar: HashMap<NaiveDate, i64>,
}

impl DimensionKeyCache {
    /// Primes the cache from the dimension tables.
    pub fn from_warehouse(warehouse: &Warehouse) -> Result<Self> {
        Ok(Self {
            customers: warehouse.customer_dimension_keys()?.into_iter().collect(),
            products: warehouse.product_dimension_keys()?.into_iter().collect(),
            branches: warehouse.branch_dimension_keys()?.into_iter().collect(),
            calendar: warehouse.time_dimension_keys()?.into_iter().collect(),
        })
    }
}

/// Loader behavior toggles, sourced from `[load]` configuration.
#[derive(Debug, Clone, Copy)]
pub struct LoadPolicy {
    /// Flag the surviving fact row when a duplicate transaction id arrives.
    pub mark_duplicates: bool,
    /// Fail the record instead of substituting the sentinel key.
    pub strict_resolution: bool,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            mark_duplicates: true,
            strict_resolution: false,
        }
    }
}

impl From<&crate::config::LoadConfig> for LoadPolicy {
    fn from(config: &crate::config::LoadConfig) -> Self {
        Self {
            mark_duplicates: config.mark_duplicates,
            strict_resolution: config.strict_resolution,
        }
    }
}

/// Counts reported by the load stage for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOutcome {
    pub rows_loaded: u64,
    pub rows_failed: u64,
    pub duplicates: u64,
}

#[derive(Debug, Clone, Copy)]
struct KeyResolution {
    customer_key: i64,
    product_key: i64,
    time_key: i64,
    branch_key: Option<i64>,
    fallbacks: u32,
}

/// Resolves dimension keys and inserts fact rows for cleaned records not
/// yet loaded, marking each record loaded in the same commit as its fact
/// insert.
pub struct DimensionalLoader {
    cache: DimensionKeyCache,
    policy: LoadPolicy,
}

impl DimensionalLoader {
    pub fn new(cache: DimensionKeyCache, policy: LoadPolicy) -> Self {
        Self { cache, policy }
    }

    pub fn load_batch(&mut self, warehouse: &mut Warehouse, batch_id: &str) -> Result<LoadOutcome> {
        let pending = warehouse.fetch_unloaded_cleaned()?;
        let mut outcome = LoadOutcome::default();

        for record in pending {
            let cleaned_id = record
                .id
                .ok_or_else(|| EtlError::MissingField("cleaned record id".to_string()))?;

            let resolution = self.resolve_keys(warehouse, &record)?;
            if self.policy.strict_resolution && resolution.fallbacks > 0 {
                warn!(
                    transaction_id = %record.transaction_id,
                    fallbacks = resolution.fallbacks,
                    "strict resolution enabled, record not loaded"
                );
                outcome.rows_failed += 1;
                continue;
            }

            let score = quality_score(&record, &resolution);
            metrics::load::quality_score_recorded(score);

            let fact = FactRecord {
                transaction_id: record.transaction_id.clone(),
                customer_key: resolution.customer_key,
                product_key: resolution.product_key,
                time_key: resolution.time_key,
                branch_key: resolution.branch_key,
                account_id: record.customer_id.clone(),
                transaction_amount: record.transaction_amount,
                transaction_type: record.transaction_type.clone(),
                account_type: record.account_type.clone(),
                account_status: Some(record.account_status.clone()),
                transaction_date: record.transaction_date,
                data_quality_score: score,
                batch_id: batch_id.to_string(),
            };

            match warehouse.upsert_fact(&fact, cleaned_id, self.policy.mark_duplicates)? {
                FactLoadOutcome::Inserted => {
                    metrics::load::fact_inserted();
                    outcome.rows_loaded += 1;
                }
                FactLoadOutcome::Duplicate => {
                    metrics::load::duplicate_detected();
                    outcome.duplicates += 1;
                }
            }
        }

        info!(
            batch_id,
            rows_loaded = outcome.rows_loaded,
            rows_failed = outcome.rows_failed,
            duplicates = outcome.duplicates,
            "load stage complete"
        );
        Ok(outcome)
    }

    fn resolve_keys(
        &mut self,
        warehouse: &Warehouse,
        record: &CleanedRecord,
    ) -> Result<KeyResolution> {
        let customer_key = self.resolve_customer(warehouse, record)?;
        let product_key = self.resolve_product(warehouse, &record.product_type)?;
        let time_key = self.resolve_time(&record.transaction_date);
        // Branch is optional: absent stays NULL, present-but-unresolvable
        // falls back like the mandatory dimensions.
        let branch_key = match record.branch_id.as_deref() {
            Some(branch_id) => Some(self.resolve_branch(
                warehouse,
                branch_id,
                record.branch_location.as_deref(),
            )?),
            None => None,
        };

        let mut fallbacks = [customer_key, product_key, time_key]
            .iter()
            .filter(|key| **key == UNKNOWN_KEY)
            .count() as u32;
        if branch_key == Some(UNKNOWN_KEY) {
            fallbacks += 1;
        }

        Ok(KeyResolution {
            customer_key,
            product_key,
            time_key,
            branch_key,
            fallbacks,
        })
    }

    fn resolve_customer(&mut self, warehouse: &Warehouse, record: &CleanedRecord) -> Result<i64> {
        let natural_key = record.customer_id.trim();
        if natural_key.is_empty() {
            metrics::load::sentinel_fallback("customer");
            return Ok(UNKNOWN_KEY);
        }
        if let Some(key) = self.cache.customers.get(natural_key) {
            return Ok(*key);
        }

        let key = match warehouse.insert_customer_dimension(record) {
            Ok(key) => {
                metrics::load::dimension_created("customer");
                key
            }
            Err(err) if is_constraint_violation(&err) => {
                // Lost the insert race to a concurrent loader; adopt the
                // winner's key.
                match warehouse.find_customer_key(natural_key)? {
                    Some(key) => key,
                    None => {
                        warn!(customer_id = natural_key, "customer key unresolvable");
                        metrics::load::sentinel_fallback("customer");
                        return Ok(UNKNOWN_KEY);
                    }
                }
            }
            Err(err) => return Err(err),
        };
        self.cache.customers.insert(natural_key.to_string(), key);
        Ok(key)
    }

    fn resolve_product(&mut self, warehouse: &Warehouse, product_type: &str) -> Result<i64> {
        let natural_key = product_type.trim();
        if natural_key.is_empty() {
            metrics::load::sentinel_fallback("product");
            return Ok(UNKNOWN_KEY);
        }
        if let Some(key) = self.cache.products.get(natural_key) {
            return Ok(*key);
        }

        let key = match warehouse.insert_product_dimension(natural_key) {
            Ok(key) => {
                metrics::load::dimension_created("product");
                key
            }
            Err(err) if is_constraint_violation(&err) => {
                match warehouse.find_product_key(natural_key)? {
                    Some(key) => key,
                    None => {
                        warn!(product_type = natural_key, "product key unresolvable");
                        metrics::load::sentinel_fallback("product");
                        return Ok(UNKNOWN_KEY);
                    }
                }
            }
            Err(err) => return Err(err),
        };
        self.cache.products.insert(natural_key.to_string(), key);
        Ok(key)
    }

    fn resolve_branch(
        &mut self,
        warehouse: &Warehouse,
        branch_id: &str,
        branch_location: Option<&str>,
    ) -> Result<i64> {
        let natural_key = branch_id.trim();
        if natural_key.is_empty() {
            metrics::load::sentinel_fallback("branch");
            return Ok(UNKNOWN_KEY);
        }
        if let Some(key) = self.cache.branches.get(natural_key) {
            return Ok(*key);
        }

        let key = match warehouse.insert_branch_dimension(natural_key, branch_location) {
            Ok(key) => {
                metrics::load::dimension_created("branch");
                key
            }
            Err(err) if is_constraint_violation(&err) => {
                match warehouse.find_branch_key(natural_key)? {
                    Some(key) => key,
                    None => {
                        warn!(branch_id = natural_key, "branch key unresolvable");
                        metrics::load::sentinel_fallback("branch");
                        return Ok(UNKNOWN_KEY);
                    }
                }
            }
            Err(err) => return Err(err),
        };
        self.cache.branches.insert(natural_key.to_string(), key);
        Ok(key)
    }

    /// The calendar is pre-populated and lookup-only: no dynamic creation,
    /// out-of-range dates fall back to the sentinel.
    fn resolve_time(&self, date: &NaiveDate) -> i64 {
        match self.cache.calendar.get(date) {
            Some(key) => *key,
            None => {
                warn!(%date, "transaction date outside calendar range");
                metrics::load::sentinel_fallback("time");
                UNKNOWN_KEY
            }
        }
    }
}

/// Per-record quality score: starts at 1.0, deducts for every sentinel
/// fallback and every missing optional attribute.
fn quality_score(record: &CleanedRecord, resolution: &KeyResolution) -> f64 {
    let mut score = 1.0 - 0.15 * f64::from(resolution.fallbacks);
    let missing_optional = [
        record.customer_name.is_none(),
        record.customer_email.is_none(),
        record.customer_phone.is_none(),
        record.customer_age.is_none(),
        record.branch_id.is_none(),
    ]
    .into_iter()
    .filter(|missing| *missing)
    .count();
    score -= 0.02 * missing_optional as f64;
    (score.max(0.0) * 100.0).round() / 100.0
}
