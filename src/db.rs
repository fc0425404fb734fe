//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create tables if not exist (raw_sql: the script is multi-statement)
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Threat records (one row per analysis, append-only except status fields)
CREATE TABLE IF NOT EXISTS threats (
    id UUID PRIMARY KEY,
    input_value VARCHAR(2048) NOT NULL,
    input_type VARCHAR(10) NOT NULL,
    risk_score INT NOT NULL,
    confidence_score INT NOT NULL,
    threat_type VARCHAR(100) NOT NULL,
    severity VARCHAR(20) NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'active',
    country VARCHAR(100),
    city VARCHAR(100),
    latitude DOUBLE PRECISION,
    longitude DOUBLE PRECISION,
    analysis_detail JSONB NOT NULL,
    device_fingerprint JSONB,
    session_data JSONB,
    user_agent TEXT,
    processing_time_ms BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    resolved_at TIMESTAMPTZ,
    resolved_by VARCHAR(255)
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_threats_severity ON threats(severity);
CREATE INDEX IF NOT EXISTS idx_threats_status ON threats(status);
CREATE INDEX IF NOT EXISTS idx_threats_input_type ON threats(input_type);
CREATE INDEX IF NOT EXISTS idx_threats_created ON threats(created_at);
CREATE INDEX IF NOT EXISTS idx_threats_country ON threats(country);
"#;
