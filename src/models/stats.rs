//! Aggregate statistics over threat records

use serde::Serialize;
use sqlx::{PgPool, Row};

#[derive(Debug, Serialize)]
pub struct SeverityBreakdown {
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusBreakdown {
    pub active: i64,
    pub investigating: i64,
    pub resolved: i64,
}

#[derive(Debug, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct ThreatStats {
    pub total_threats: i64,
    pub by_severity: SeverityBreakdown,
    pub by_status: StatusBreakdown,
    pub last_24h: i64,
    pub last_7d: i64,
    pub avg_risk_score: f64,
    pub avg_processing_time_ms: f64,
    pub top_threat_types: Vec<LabelCount>,
    pub top_countries: Vec<LabelCount>,
}

impl ThreatStats {
    /// Read-side aggregation, no fusion logic involved
    pub async fn compute(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE severity = 'critical') AS critical,
                COUNT(*) FILTER (WHERE severity = 'high') AS high,
                COUNT(*) FILTER (WHERE severity = 'medium') AS medium,
                COUNT(*) FILTER (WHERE severity = 'low') AS low,
                COUNT(*) FILTER (WHERE status = 'active') AS active,
                COUNT(*) FILTER (WHERE status = 'investigating') AS investigating,
                COUNT(*) FILTER (WHERE status = 'resolved') AS resolved,
                COUNT(*) FILTER (WHERE created_at > NOW() - INTERVAL '24 hours') AS last_24h,
                COUNT(*) FILTER (WHERE created_at > NOW() - INTERVAL '7 days') AS last_7d,
                COALESCE(AVG(risk_score), 0)::DOUBLE PRECISION AS avg_risk,
                COALESCE(AVG(processing_time_ms), 0)::DOUBLE PRECISION AS avg_processing
            FROM threats
            "#,
        )
        .fetch_one(pool)
        .await?;

        let top_threat_types = top_counts(
            pool,
            r#"
            SELECT threat_type AS label, COUNT(*) AS count
            FROM threats
            WHERE created_at > NOW() - INTERVAL '30 days'
            GROUP BY threat_type
            ORDER BY count DESC
            LIMIT 5
            "#,
        )
        .await?;

        let top_countries = top_counts(
            pool,
            r#"
            SELECT country AS label, COUNT(*) AS count
            FROM threats
            WHERE country IS NOT NULL
              AND created_at > NOW() - INTERVAL '30 days'
            GROUP BY country
            ORDER BY count DESC
            LIMIT 5
            "#,
        )
        .await?;

        Ok(ThreatStats {
            total_threats: row.get("total"),
            by_severity: SeverityBreakdown {
                critical: row.get("critical"),
                high: row.get("high"),
                medium: row.get("medium"),
                low: row.get("low"),
            },
            by_status: StatusBreakdown {
                active: row.get("active"),
                investigating: row.get("investigating"),
                resolved: row.get("resolved"),
            },
            last_24h: row.get("last_24h"),
            last_7d: row.get("last_7d"),
            avg_risk_score: row.get("avg_risk"),
            avg_processing_time_ms: row.get("avg_processing"),
            top_threat_types,
            top_countries,
        })
    }
}

async fn top_counts(pool: &PgPool, sql: &str) -> Result<Vec<LabelCount>, sqlx::Error> {
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|r| LabelCount {
            label: r.get("label"),
            count: r.get("count"),
        })
        .collect())
}
