use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::error::{EtlError, Result};

/// Runtime configuration for the pipeline, loaded from a TOML file with
/// environment overrides. A missing file falls back to the documented
/// defaults; a malformed file is a fatal configuration error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub etl: EtlConfig,
    pub cleansing: CleansingConfig,
    pub load: LoadConfig,
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite warehouse database file.
    pub path: PathBuf,
    /// Bound on how long a single database interaction may block.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/banking_warehouse.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Source file consumed by the extract stage.
    pub input_path: PathBuf,
    /// Rows per cleansing sub-batch; each sub-batch commits atomically.
    pub batch_size: usize,
    /// First year pre-populated in the calendar dimension.
    pub calendar_start_year: i32,
    /// Last year pre-populated in the calendar dimension (inclusive).
    pub calendar_end_year: i32,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("data/banking_transactions.csv"),
            batch_size: 5_000,
            calendar_start_year: 2015,
            calendar_end_year: 2035,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleansingConfig {
    /// Accepted transaction-date formats, tried in order.
    pub date_formats: Vec<String>,
    /// Ages outside [min, max] are soft-cleaned to null, never rejected.
    pub min_customer_age: i64,
    pub max_customer_age: i64,
}

impl Default for CleansingConfig {
    fn default() -> Self {
        Self {
            date_formats: vec![
                "%Y-%m-%d".to_string(),
                "%m/%d/%Y".to_string(),
                "%d/%m/%Y".to_string(),
            ],
            min_customer_age: 0,
            max_customer_age: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Flag the surviving fact row when a duplicate transaction id arrives.
    pub mark_duplicates: bool,
    /// When true, a record whose dimension keys cannot be resolved fails
    /// instead of falling back to the sentinel key.
    pub strict_resolution: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            mark_duplicates: true,
            strict_resolution: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum share of records with all mandatory fields present (percent).
    pub min_completeness_pct: f64,
    /// Maximum average null share across optional columns (percent).
    pub max_null_pct: f64,
    pub duplicate_check_enabled: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_completeness_pct: 95.0,
            max_null_pct: 5.0,
            duplicate_check_enabled: true,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, the `BANKING_ETL_CONFIG` env var, or
    /// `config.toml`, in that order of preference.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => env::var("BANKING_ETL_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.toml")),
        };

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(|e| {
                EtlError::Config(format!(
                    "Failed to read config file '{}': {}",
                    config_path.display(),
                    e
                ))
            })?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        if let Ok(db_path) = env::var("BANKING_ETL_DB") {
            config.database.path = PathBuf::from(db_path);
        }
        if let Ok(input) = env::var("DATA_INPUT_PATH") {
            config.etl.input_path = PathBuf::from(input);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.etl.batch_size == 0 {
            return Err(EtlError::Config("etl.batch_size must be positive".to_string()));
        }
        if self.cleansing.date_formats.is_empty() {
            return Err(EtlError::Config(
                "cleansing.date_formats must list at least one format".to_string(),
            ));
        }
        if self.etl.calendar_start_year > self.etl.calendar_end_year {
            return Err(EtlError::Config(
                "etl.calendar_start_year must not exceed calendar_end_year".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.quality.min_completeness_pct) {
            return Err(EtlError::Config(
                "quality.min_completeness_pct must be within [0, 100]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = Config::default();
        assert_eq!(config.quality.min_completeness_pct, 95.0);
        assert_eq!(config.quality.max_null_pct, 5.0);
        assert_eq!(config.cleansing.date_formats.len(), 3);
        assert!(config.load.mark_duplicates);
        assert!(!config.load.strict_resolution);
    }

    #[test]
    fn toml_overrides_are_applied() {
        let config: Config = toml::from_str(
            r#"
            [quality]
            min_completeness_pct = 99.5

            [cleansing]
            date_formats = ["%d.%m.%Y"]
            "#,
        )
        .unwrap();
        assert_eq!(config.quality.min_completeness_pct, 99.5);
        assert_eq!(config.cleansing.date_formats, vec!["%d.%m.%Y"]);
        // Untouched sections keep their defaults.
        assert_eq!(config.etl.batch_size, 5_000);
    }

    #[test]
    fn invalid_batch_size_is_rejected() {
        let mut config = Config::default();
        config.etl.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
