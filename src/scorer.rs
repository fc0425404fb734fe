//! ML scorer client
//!
//! Invokes the external model-scoring backend. Any failure (connect error,
//! timeout, non-2xx, malformed body) degrades to a fixed conservative
//! baseline instead of propagating; the fusion pipeline never aborts because
//! the scorer is unreachable.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use crate::fusion::MlBaseline;
use crate::models::Observable;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreRequest<'a> {
    pub value: &'a str,
    pub input_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_data: Option<&'a Value>,
}

/// Fields this core actually consumes from the scorer's response; the full
/// raw body (explanation, recommendations, model predictions) is preserved
/// verbatim for the audit payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreResponse {
    risk_score: f64,
    confidence_score: f64,
    threat_type: String,
}

/// Scorer outcome: the fusion baseline plus the raw body kept for audit
#[derive(Debug, Clone)]
pub struct ScorerOutcome {
    pub baseline: MlBaseline,
    pub raw: Value,
    pub degraded: bool,
}

#[derive(Clone)]
pub struct MlScorerClient {
    http: reqwest::Client,
    base_url: String,
}

impl MlScorerClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        // Constructed once at startup; a client without its timeout must not
        // slip through silently
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to build scorer HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn score(
        &self,
        observable: &Observable,
        context: Option<&Value>,
        user_agent: Option<&str>,
        device_fingerprint: Option<&Value>,
        session_data: Option<&Value>,
    ) -> ScorerOutcome {
        let request = ScoreRequest {
            value: &observable.value,
            input_type: observable.kind.as_str(),
            context,
            user_agent,
            device_fingerprint,
            session_data,
        };

        match self.request(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(value = %observable.value, error = %e, "ML scorer unavailable, using degraded baseline");
                Self::degraded_outcome(&e.to_string())
            }
        }
    }

    async fn request(&self, request: &ScoreRequest<'_>) -> anyhow::Result<ScorerOutcome> {
        let response = self
            .http
            .post(format!("{}/score", self.base_url))
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        let raw: Value = response.json().await?;
        let parsed: ScoreResponse = serde_json::from_value(raw.clone())?;

        Ok(ScorerOutcome {
            baseline: MlBaseline {
                risk_score: parsed.risk_score,
                confidence_score: parsed.confidence_score,
                threat_type: parsed.threat_type,
            },
            raw,
            degraded: false,
        })
    }

    fn degraded_outcome(reason: &str) -> ScorerOutcome {
        ScorerOutcome {
            baseline: MlBaseline::degraded(),
            raw: json!({
                "degraded": true,
                "severity": "unknown",
                "error": reason,
            }),
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_scorer_body() {
        let raw = json!({
            "riskScore": 72.5,
            "confidenceScore": 81,
            "threatType": "phishing_url",
            "severity": "high",
            "explanation": "matched 3 heuristics",
            "recommendations": ["block"],
            "modelPredictions": {"xgb": 0.74},
            "processingTimeMs": 12
        });
        let parsed: ScoreResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.risk_score, 72.5);
        assert_eq!(parsed.confidence_score, 81.0);
        assert_eq!(parsed.threat_type, "phishing_url");
    }

    #[test]
    fn degraded_outcome_uses_fixed_baseline() {
        let outcome = MlScorerClient::degraded_outcome("timeout");
        assert!(outcome.degraded);
        assert_eq!(outcome.baseline.risk_score, 50.0);
        assert_eq!(outcome.baseline.confidence_score, 0.0);
        assert_eq!(outcome.baseline.threat_type, "ml_service_error");
        assert_eq!(outcome.raw["severity"], "unknown");
    }
}
