//! Database schema and queries for the PostgreSQL sink.

/// Creates the results table when it does not exist yet.
pub const CREATE_BENCHMARKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "Benchmarks" (
    id SERIAL PRIMARY KEY,
    task_id VARCHAR(255) NOT NULL,
    task_name TEXT NOT NULL,
    benchmark_id UUID NOT NULL,
    input TEXT NOT NULL,
    labels JSONB NOT NULL,
    passed BOOLEAN NOT NULL,
    retries INTEGER NOT NULL DEFAULT 0,
    duration_ms BIGINT NOT NULL,
    pre_process_model TEXT,
    model_pair JSONB,
    accuracy DOUBLE PRECISION NOT NULL,
    run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    benchmark_file TEXT,
    error_message TEXT,
    test JSONB
)
"#;

/// Adds columns missing from tables created before they existed.
pub const UPGRADE_BENCHMARKS_TABLE: &str = r#"
ALTER TABLE "Benchmarks"
    ADD COLUMN IF NOT EXISTS retries INTEGER NOT NULL DEFAULT 0,
    ADD COLUMN IF NOT EXISTS pre_process_model TEXT,
    ADD COLUMN IF NOT EXISTS test JSONB
"#;

pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_benchmarks_benchmark_id ON "Benchmarks"(benchmark_id);
CREATE INDEX IF NOT EXISTS idx_benchmarks_task_id ON "Benchmarks"(task_id)
"#;

pub const INSERT_RECORD: &str = r#"
INSERT INTO "Benchmarks" (
    task_id, task_name, benchmark_id, input, labels, passed, retries,
    duration_ms, pre_process_model, model_pair, accuracy, run_at,
    benchmark_file, error_message, test
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
"#;

/// All schema statements in execution order.
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut statements = vec![CREATE_BENCHMARKS_TABLE, UPGRADE_BENCHMARKS_TABLE];
    statements.extend(CREATE_INDEXES.split(';').filter(|s| !s.trim().is_empty()));
    statements
}
