//! DDL for the three table namespaces: staging, warehouse (star schema),
//! and audit. Safe to run repeatedly; everything is IF NOT EXISTS.

pub(crate) const SCHEMA_DDL: &str = r#"
PRAGMA journal_mode=WAL;

CREATE TABLE IF NOT EXISTS staging_raw_records (
    id                 INTEGER PRIMARY KEY,
    batch_id           TEXT NOT NULL,
    source_file_name   TEXT NOT NULL,
    source_file_hash   TEXT NOT NULL,
    row_index          INTEGER NOT NULL,
    payload            TEXT NOT NULL,
    customer_id        TEXT,
    transaction_id     TEXT,
    transaction_date   TEXT,
    product_type       TEXT,
    transaction_amount TEXT,
    transaction_type   TEXT,
    account_type       TEXT,
    account_status     TEXT,
    customer_name      TEXT,
    customer_email     TEXT,
    customer_phone     TEXT,
    customer_age       TEXT,
    customer_segment   TEXT,
    branch_id          TEXT,
    branch_location    TEXT,
    state              TEXT NOT NULL DEFAULT 'pending'
                       CHECK (state IN ('pending', 'processed')),
    processed_at       TEXT,
    created_at         TEXT NOT NULL,
    UNIQUE (source_file_hash, row_index)
);

CREATE TABLE IF NOT EXISTS staging_cleaned_records (
    id                 INTEGER PRIMARY KEY,
    source_row_id      INTEGER NOT NULL UNIQUE REFERENCES staging_raw_records(id),
    batch_id           TEXT NOT NULL,
    customer_id        TEXT NOT NULL,
    transaction_id     TEXT NOT NULL,
    transaction_date   TEXT NOT NULL,
    transaction_amount REAL NOT NULL,
    product_type       TEXT NOT NULL,
    transaction_type   TEXT,
    account_type       TEXT,
    account_status     TEXT NOT NULL,
    customer_name      TEXT,
    customer_email     TEXT,
    customer_phone     TEXT,
    customer_age       INTEGER,
    customer_segment   TEXT NOT NULL,
    branch_id          TEXT,
    branch_location    TEXT,
    state              TEXT NOT NULL DEFAULT 'pending'
                       CHECK (state IN ('pending', 'loaded')),
    loaded_at          TEXT,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_customer (
    customer_key     INTEGER PRIMARY KEY,
    customer_id      TEXT NOT NULL UNIQUE,
    customer_name    TEXT,
    customer_email   TEXT,
    customer_phone   TEXT,
    customer_age     INTEGER,
    customer_segment TEXT,
    is_active        INTEGER NOT NULL DEFAULT 1,
    created_at       TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at       TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS dim_product (
    product_key      INTEGER PRIMARY KEY,
    product_type     TEXT NOT NULL UNIQUE,
    product_name     TEXT,
    product_category TEXT,
    is_active        INTEGER NOT NULL DEFAULT 1,
    created_at       TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at       TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS dim_branch (
    branch_key      INTEGER PRIMARY KEY,
    branch_id       TEXT NOT NULL UNIQUE,
    branch_name     TEXT,
    branch_location TEXT,
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS dim_time (
    time_key     INTEGER PRIMARY KEY,
    date         TEXT NOT NULL UNIQUE,
    year         INTEGER NOT NULL,
    quarter      INTEGER NOT NULL,
    month        INTEGER NOT NULL,
    day          INTEGER NOT NULL,
    day_of_week  INTEGER NOT NULL,
    day_name     TEXT NOT NULL,
    month_name   TEXT NOT NULL,
    week_of_year INTEGER NOT NULL,
    is_weekend   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS fact_transactions (
    fact_key           INTEGER PRIMARY KEY,
    transaction_id     TEXT NOT NULL UNIQUE,
    customer_key       INTEGER NOT NULL REFERENCES dim_customer(customer_key),
    product_key        INTEGER NOT NULL REFERENCES dim_product(product_key),
    time_key           INTEGER NOT NULL REFERENCES dim_time(time_key),
    branch_key         INTEGER REFERENCES dim_branch(branch_key),
    account_id         TEXT,
    transaction_amount REAL NOT NULL,
    transaction_type   TEXT,
    account_type       TEXT,
    account_status     TEXT,
    transaction_date   TEXT NOT NULL,
    is_duplicate       INTEGER NOT NULL DEFAULT 0,
    data_quality_score REAL NOT NULL,
    batch_id           TEXT NOT NULL,
    created_at         TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS audit_quality_metrics (
    id                 INTEGER PRIMARY KEY,
    batch_id           TEXT NOT NULL,
    table_name         TEXT NOT NULL,
    metric_name        TEXT NOT NULL,
    metric_value       REAL,
    metric_percentage  REAL,
    record_count       INTEGER NOT NULL,
    quality_status     TEXT NOT NULL,
    metric_description TEXT,
    created_at         TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS audit_execution_log (
    id               INTEGER PRIMARY KEY,
    batch_id         TEXT NOT NULL,
    pipeline_name    TEXT NOT NULL,
    task_name        TEXT NOT NULL,
    execution_start  TEXT NOT NULL,
    execution_end    TEXT,
    execution_status TEXT NOT NULL,
    rows_extracted   INTEGER NOT NULL DEFAULT 0,
    rows_transformed INTEGER NOT NULL DEFAULT 0,
    rows_loaded      INTEGER NOT NULL DEFAULT 0,
    rows_rejected    INTEGER NOT NULL DEFAULT 0,
    duration_seconds INTEGER,
    error_message    TEXT,
    UNIQUE (batch_id, task_name)
);

CREATE TABLE IF NOT EXISTS audit_rejected_records (
    id               INTEGER PRIMARY KEY,
    batch_id         TEXT NOT NULL,
    source_row_id    INTEGER NOT NULL,
    rejection_reason TEXT NOT NULL,
    rejected_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_raw_records_state ON staging_raw_records(state);
CREATE INDEX IF NOT EXISTS idx_cleaned_records_state ON staging_cleaned_records(state);
CREATE INDEX IF NOT EXISTS idx_fact_batch ON fact_transactions(batch_id);
CREATE INDEX IF NOT EXISTS idx_quality_metrics_batch ON audit_quality_metrics(batch_id);
"#;

/// The sentinel "UNKNOWN" rows, one per dimension, all at surrogate key 1.
pub(crate) const SENTINEL_DDL: &str = r#"
INSERT OR IGNORE INTO dim_customer
    (customer_key, customer_id, customer_name, customer_segment, is_active)
    VALUES (1, 'UNKNOWN', 'Unknown Customer', 'UNKNOWN', 1);
INSERT OR IGNORE INTO dim_product
    (product_key, product_type, product_name, product_category, is_active)
    VALUES (1, 'UNKNOWN', 'Unknown Product', 'UNCLASSIFIED', 1);
INSERT OR IGNORE INTO dim_branch
    (branch_key, branch_id, branch_name, is_active)
    VALUES (1, 'UNKNOWN', 'Unknown Branch', 1);
INSERT OR IGNORE INTO dim_time
    (time_key, date, year, quarter, month, day, day_of_week, day_name,
     month_name, week_of_year, is_weekend)
    VALUES (1, '0001-01-01', 0, 0, 0, 0, 0, 'Unknown', 'Unknown', 0, 0);
"#;
