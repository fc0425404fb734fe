//! Abuse-report registry connector
//!
//! Checks an IP against a community abuse-report registry and extracts the
//! abuse confidence percentage as a scoring signal. The registry only
//! understands IPs, so url/domain observables participate only when their
//! host is an IP literal.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::fusion::Signal;
use crate::models::Observable;

use super::{ConnectorOutcome, SignalConnector};

const BASE_URL: &str = "https://api.abuseipdb.com/api/v2";

pub struct AbuseConnector {
    http: reqwest::Client,
    api_key: String,
}

impl AbuseConnector {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }

    async fn fetch(&self, ip: &str) -> anyhow::Result<Value> {
        let raw = self
            .http
            .get(format!("{}/check", BASE_URL))
            .header("Key", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("ipAddress", ip), ("maxAgeInDays", "90")])
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        Ok(raw)
    }
}

fn extract_confidence(raw: &Value) -> Option<Signal> {
    let percentage = raw
        .get("data")?
        .get("abuseConfidenceScore")?
        .as_f64()?;
    Some(Signal::AbuseConfidence { percentage })
}

#[async_trait]
impl SignalConnector for AbuseConnector {
    fn name(&self) -> &'static str {
        "abuse"
    }

    fn supports(&self, observable: &Observable) -> bool {
        observable.as_ip().is_some()
    }

    async fn query(&self, observable: &Observable) -> ConnectorOutcome {
        let Some(ip) = observable.as_ip() else {
            return ConnectorOutcome::Absent;
        };

        match self.fetch(&ip.to_string()).await {
            Ok(raw) => {
                let signal = extract_confidence(&raw);
                ConnectorOutcome::Success { raw, signal }
            }
            Err(e) => {
                debug!(value = %observable.value, error = %e, "Abuse-registry lookup absent");
                ConnectorOutcome::Absent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObservableKind;
    use serde_json::json;

    #[test]
    fn extracts_abuse_confidence() {
        let raw = json!({
            "data": {
                "ipAddress": "1.2.3.4",
                "abuseConfidenceScore": 90,
                "totalReports": 124
            }
        });
        assert_eq!(
            extract_confidence(&raw),
            Some(Signal::AbuseConfidence { percentage: 90.0 })
        );
    }

    #[test]
    fn malformed_payload_is_no_signal() {
        assert_eq!(extract_confidence(&json!({"data": {}})), None);
        assert_eq!(extract_confidence(&json!({})), None);
    }

    #[test]
    fn supports_ip_literals_only() {
        let connector = AbuseConnector::new(reqwest::Client::new(), "k".into());
        assert!(connector.supports(&Observable::new("1.2.3.4", ObservableKind::Ip)));
        assert!(connector.supports(&Observable::new("http://1.2.3.4/x", ObservableKind::Url)));
        assert!(!connector.supports(&Observable::new("example.com", ObservableKind::Domain)));
        assert!(!connector.supports(&Observable::new("a@b.com", ObservableKind::Email)));
    }
}
