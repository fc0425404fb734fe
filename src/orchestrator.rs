//! Analysis orchestrator
//!
//! Drives one analysis end to end: validate the observable, fan out to the
//! ML scorer and every applicable signal connector concurrently, wait for
//! all of them to settle, fuse, persist, cache, return. Total wall time is
//! bounded by the slowest individual call, not their sum. Batch mode runs up
//! to 100 independent analyses with per-item outcome isolation.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::connectors::{self, ConnectorOutcome};
use crate::error::{AppError, AppResult};
use crate::fusion::{self, Signal};
use crate::models::{
    NewThreat, Observable, ObservableKind, ThreatRecord, ThreatStatus, UpdateThreatStatus,
};
use crate::AppState;

/// Hard cap on batch analysis size
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeRequest {
    #[validate(length(min = 1, max = 2048, message = "value must be 1-2048 characters"))]
    pub value: String,
    pub input_type: String,
    pub context: Option<Value>,
    pub user_agent: Option<String>,
    pub device_fingerprint: Option<Value>,
    pub session_data: Option<Value>,
}

/// Per-item outcome of a batch analysis, tagged with its input position
#[derive(Debug, Serialize)]
pub struct BatchItemOutcome {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat: Option<ThreatRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validate the request and freeze the observable for analysis
fn validate_request(request: &AnalyzeRequest) -> AppResult<Observable> {
    request
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    // The observable is frozen from the trimmed value, so the trimmed value
    // is what must be non-empty
    let value = request.value.trim();
    if value.is_empty() {
        return Err(AppError::ValidationError(
            "value must not be blank".to_string(),
        ));
    }

    let kind = ObservableKind::parse(&request.input_type).ok_or_else(|| {
        AppError::ValidationError(format!(
            "invalid input_type '{}': expected one of ip, url, email, domain, hash",
            request.input_type
        ))
    })?;

    Ok(Observable::new(value, kind))
}

/// Run one analysis end to end.
///
/// Only structurally invalid input or a persistence failure is fatal; every
/// external-source failure degrades into the record instead.
pub async fn analyze(state: &AppState, request: AnalyzeRequest) -> AppResult<ThreatRecord> {
    let observable = validate_request(&request)?;

    // Identifier generated up front so it stays stable even if later steps degrade
    let id = Uuid::now_v7();
    let started = Instant::now();

    let budget = Duration::from_secs(state.config.connector_timeout_secs);
    let applicable: Vec<_> = state
        .connectors
        .iter()
        .filter(|c| c.supports(&observable))
        .cloned()
        .collect();

    // Fan-out/fan-in barrier: scorer and all connectors settle before fusion
    let scorer_fut = state.scorer.score(
        &observable,
        request.context.as_ref(),
        request.user_agent.as_deref(),
        request.device_fingerprint.as_ref(),
        request.session_data.as_ref(),
    );
    let connector_futs = applicable
        .into_iter()
        .map(|c| connectors::settle(c, &observable, budget));
    let (scorer_outcome, connector_outcomes) = tokio::join!(scorer_fut, join_all(connector_futs));

    let signals: Vec<Signal> = connector_outcomes
        .iter()
        .filter_map(|(_, outcome)| match outcome {
            ConnectorOutcome::Success { signal, .. } => signal.clone(),
            _ => None,
        })
        .collect();

    let fused = fusion::fuse(&scorer_outcome.baseline, &signals);

    let location = connector_outcomes
        .iter()
        .find_map(|(name, outcome)| match outcome {
            ConnectorOutcome::Success { raw, .. } if *name == "geoip" => {
                Some(connectors::geoip::location_from_raw(raw))
            }
            _ => None,
        })
        .unwrap_or_default();

    let analysis_detail = build_analysis_detail(&scorer_outcome.raw, &connector_outcomes);

    // A degraded baseline still produces a record, flagged for follow-up
    let status = if scorer_outcome.degraded {
        ThreatStatus::Investigating
    } else {
        ThreatStatus::Active
    };

    let record = ThreatRecord::create(
        &state.pool,
        NewThreat {
            id,
            input_value: observable.value.clone(),
            input_type: observable.kind.as_str().to_string(),
            risk_score: fused.risk_score,
            confidence_score: fused.confidence_score,
            threat_type: fused.threat_type,
            severity: fused.severity.as_str().to_string(),
            status: status.as_str().to_string(),
            location,
            analysis_detail,
            device_fingerprint: request.device_fingerprint,
            session_data: request.session_data,
            user_agent: request.user_agent,
            processing_time_ms: started.elapsed().as_millis() as i64,
        },
    )
    .await?;

    state.cache.put(&record).await;

    info!(
        id = %record.id,
        value = %record.input_value,
        risk = record.risk_score,
        severity = %record.severity,
        elapsed_ms = record.processing_time_ms,
        "Analysis complete"
    );

    Ok(record)
}

/// Run up to MAX_BATCH_SIZE analyses concurrently with isolated outcomes
pub async fn analyze_batch(
    state: &AppState,
    requests: Vec<AnalyzeRequest>,
) -> AppResult<Vec<BatchItemOutcome>> {
    ensure_batch_size(requests.len())?;

    let analyses = requests
        .into_iter()
        .enumerate()
        .map(|(index, request)| async move { (index, analyze(state, request).await) });

    let outcomes = join_all(analyses)
        .await
        .into_iter()
        .map(|(index, result)| match result {
            Ok(record) => BatchItemOutcome {
                index,
                success: true,
                threat: Some(record),
                error: None,
            },
            Err(e) => BatchItemOutcome {
                index,
                success: false,
                threat: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(outcomes)
}

fn ensure_batch_size(len: usize) -> AppResult<()> {
    if len > MAX_BATCH_SIZE {
        return Err(AppError::ValidationError(format!(
            "batch size {} exceeds maximum of {}",
            len, MAX_BATCH_SIZE
        )));
    }
    Ok(())
}

/// Cache-first point lookup; populates the cache on a database hit
pub async fn get_by_id(state: &AppState, id: Uuid) -> AppResult<ThreatRecord> {
    if let Some(record) = state.cache.get(id).await {
        return Ok(record);
    }

    let record = ThreatRecord::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Threat record not found".to_string()))?;

    state.cache.put(&record).await;
    Ok(record)
}

/// Status transition; the cached entry is invalidated synchronously so the
/// next read re-fetches authoritative state
pub async fn set_status(
    state: &AppState,
    id: Uuid,
    update: UpdateThreatStatus,
) -> AppResult<ThreatRecord> {
    let status = ThreatStatus::parse(&update.status).ok_or_else(|| {
        AppError::InvalidStatus(format!(
            "invalid status '{}': expected one of active, investigating, resolved",
            update.status
        ))
    })?;

    let record = ThreatRecord::update_status(&state.pool, id, status, update.resolved_by)
        .await?
        .ok_or_else(|| AppError::NotFound("Threat record not found".to_string()))?;

    state.cache.invalidate(id).await;
    Ok(record)
}

/// Audit payload: the ML raw output plus every connector's raw response (or
/// its absence/timeout tag) under the connector's name
fn build_analysis_detail(
    ml_raw: &Value,
    connector_outcomes: &[(&'static str, ConnectorOutcome)],
) -> Value {
    let mut intel = serde_json::Map::new();
    for (name, outcome) in connector_outcomes {
        let entry = match outcome {
            ConnectorOutcome::Success { raw, .. } => raw.clone(),
            ConnectorOutcome::Absent => json!({ "status": "absent" }),
            ConnectorOutcome::TimedOut => json!({ "status": "timed_out" }),
        };
        intel.insert((*name).to_string(), entry);
    }

    json!({
        "ml": ml_raw,
        "threat_intelligence": Value::Object(intel),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(value: &str, input_type: &str) -> AnalyzeRequest {
        AnalyzeRequest {
            value: value.to_string(),
            input_type: input_type.to_string(),
            context: None,
            user_agent: None,
            device_fingerprint: None,
            session_data: None,
        }
    }

    #[test]
    fn valid_request_freezes_observable() {
        let obs = validate_request(&request("1.2.3.4", "ip")).unwrap();
        assert_eq!(obs.value, "1.2.3.4");
        assert_eq!(obs.kind, ObservableKind::Ip);
    }

    #[test]
    fn invalid_kind_is_a_validation_error() {
        let err = validate_request(&request("1.2.3.4", "ipv4")).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn empty_value_is_a_validation_error() {
        let err = validate_request(&request("", "ip")).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn whitespace_only_value_is_a_validation_error() {
        let err = validate_request(&request("   ", "ip")).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn oversized_value_is_a_validation_error() {
        let err = validate_request(&request(&"a".repeat(3000), "url")).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn value_is_trimmed() {
        let obs = validate_request(&request("  example.com  ", "domain")).unwrap();
        assert_eq!(obs.value, "example.com");
    }

    #[test]
    fn analysis_detail_tags_every_connector() {
        let outcomes: Vec<(&'static str, ConnectorOutcome)> = vec![
            (
                "abuse",
                ConnectorOutcome::Success {
                    raw: json!({"data": {"abuseConfidenceScore": 90}}),
                    signal: Some(Signal::AbuseConfidence { percentage: 90.0 }),
                },
            ),
            ("dns", ConnectorOutcome::Absent),
            ("exposure", ConnectorOutcome::TimedOut),
        ];
        let detail = build_analysis_detail(&json!({"riskScore": 50}), &outcomes);

        assert_eq!(detail["ml"]["riskScore"], 50);
        let intel = &detail["threat_intelligence"];
        assert_eq!(intel["abuse"]["data"]["abuseConfidenceScore"], 90);
        assert_eq!(intel["dns"]["status"], "absent");
        assert_eq!(intel["exposure"]["status"], "timed_out");
    }

    #[test]
    fn batch_size_is_bounded() {
        assert!(ensure_batch_size(0).is_ok());
        assert!(ensure_batch_size(MAX_BATCH_SIZE).is_ok());
        let err = ensure_batch_size(MAX_BATCH_SIZE + 1).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn record_ids_sort_by_creation_time() {
        let a = Uuid::now_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Uuid::now_v7();
        assert!(a < b);
    }
}
