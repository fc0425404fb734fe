//! Threat record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Server-enforced maximum page size for listing
pub const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 20;

/// Lifecycle state of a threat record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatStatus {
    Active,
    Investigating,
    Resolved,
}

impl ThreatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatStatus::Active => "active",
            ThreatStatus::Investigating => "investigating",
            ThreatStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ThreatStatus::Active),
            "investigating" => Some(ThreatStatus::Investigating),
            "resolved" => Some(ThreatStatus::Resolved),
            _ => None,
        }
    }
}

/// Resolved geolocation, flattened into the threats table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ThreatRecord {
    pub id: Uuid,
    pub input_value: String,
    pub input_type: String,
    pub risk_score: i32,
    pub confidence_score: i32,
    pub threat_type: String,
    pub severity: String,
    pub status: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub analysis_detail: serde_json::Value,
    pub device_fingerprint: Option<serde_json::Value>,
    pub session_data: Option<serde_json::Value>,
    pub user_agent: Option<String>,
    pub processing_time_ms: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

/// Insert payload for a freshly fused analysis
#[derive(Debug)]
pub struct NewThreat {
    pub id: Uuid,
    pub input_value: String,
    pub input_type: String,
    pub risk_score: i32,
    pub confidence_score: i32,
    pub threat_type: String,
    pub severity: String,
    pub status: String,
    pub location: GeoLocation,
    pub analysis_detail: serde_json::Value,
    pub device_fingerprint: Option<serde_json::Value>,
    pub session_data: Option<serde_json::Value>,
    pub user_agent: Option<String>,
    pub processing_time_ms: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct ThreatFilter {
    pub severity: Option<String>,
    pub status: Option<String>,
    pub input_type: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Pagination envelope for listing
#[derive(Debug, Serialize)]
pub struct ThreatPage {
    pub threats: Vec<ThreatRecord>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateThreatStatus {
    pub status: String,
    pub resolved_by: Option<String>,
}

impl ThreatRecord {
    pub async fn create(pool: &PgPool, data: NewThreat) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ThreatRecord>(
            r#"
            INSERT INTO threats (
                id, input_value, input_type, risk_score, confidence_score,
                threat_type, severity, status, country, city, latitude, longitude,
                analysis_detail, device_fingerprint, session_data, user_agent,
                processing_time_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(data.id)
        .bind(&data.input_value)
        .bind(&data.input_type)
        .bind(data.risk_score)
        .bind(data.confidence_score)
        .bind(&data.threat_type)
        .bind(&data.severity)
        .bind(&data.status)
        .bind(&data.location.country)
        .bind(&data.location.city)
        .bind(data.location.latitude)
        .bind(data.location.longitude)
        .bind(&data.analysis_detail)
        .bind(&data.device_fingerprint)
        .bind(&data.session_data)
        .bind(&data.user_agent)
        .bind(data.processing_time_ms)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ThreatRecord>("SELECT * FROM threats WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Filtered, paginated listing ordered most recent first.
    /// Filters compose conjunctively; page is 1-based.
    pub async fn list(pool: &PgPool, filter: ThreatFilter) -> Result<ThreatPage, sqlx::Error> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = filter.page.unwrap_or(1).max(1);
        let offset = (page - 1) * limit;

        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM threats");
        push_filters(&mut count_qb, &filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM threats");
        push_filters(&mut qb, &filter);
        qb.push(" ORDER BY created_at DESC LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let threats = qb
            .build_query_as::<ThreatRecord>()
            .fetch_all(pool)
            .await?;

        let pages = if total == 0 { 0 } else { (total + limit - 1) / limit };

        Ok(ThreatPage {
            threats,
            total,
            page,
            pages,
        })
    }

    /// Partial update restricted to status fields. Stamps resolved_at
    /// server-side when transitioning to resolved, clears it otherwise.
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: ThreatStatus,
        resolved_by: Option<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ThreatRecord>(
            r#"
            UPDATE threats
            SET status = $2,
                resolved_at = CASE WHEN $2 = 'resolved' THEN NOW() ELSE NULL END,
                resolved_by = CASE WHEN $2 = 'resolved' THEN $3 ELSE NULL END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(resolved_by)
        .fetch_optional(pool)
        .await
    }
}

fn push_filters(qb: &mut QueryBuilder<Postgres>, filter: &ThreatFilter) {
    qb.push(" WHERE 1=1");
    if let Some(severity) = &filter.severity {
        qb.push(" AND severity = ");
        qb.push_bind(severity.clone());
    }
    if let Some(status) = &filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.clone());
    }
    if let Some(input_type) = &filter.input_type {
        qb.push(" AND input_type = ");
        qb.push_bind(input_type.clone());
    }
    if let Some(from) = filter.from_date {
        qb.push(" AND created_at >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filter.to_date {
        qb.push(" AND created_at <= ");
        qb.push_bind(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in ["active", "investigating", "resolved"] {
            assert_eq!(ThreatStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(ThreatStatus::parse("open").is_none());
        assert!(ThreatStatus::parse("").is_none());
    }

    #[test]
    fn list_filter_builds_conjunctive_sql() {
        let filter = ThreatFilter {
            severity: Some("critical".to_string()),
            status: Some("active".to_string()),
            input_type: Some("ip".to_string()),
            from_date: Some(Utc::now()),
            to_date: None,
            page: None,
            limit: None,
        };
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM threats");
        push_filters(&mut qb, &filter);
        let sql = qb.sql();
        assert!(sql.contains("severity = $1"));
        assert!(sql.contains("AND status = $2"));
        assert!(sql.contains("AND input_type = $3"));
        assert!(sql.contains("AND created_at >= $4"));
        assert!(!sql.contains("created_at <="));
    }
}
