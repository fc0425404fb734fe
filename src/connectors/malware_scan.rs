//! Malware-scan aggregator connector
//!
//! Queries a multi-engine scan report service and extracts the detection
//! ratio (positives out of total engines) as a scoring signal. Reports for
//! ip/domain observables often carry no ratio; those still contribute their
//! raw payload for audit.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::fusion::Signal;
use crate::models::{Observable, ObservableKind};

use super::{ConnectorOutcome, SignalConnector};

const BASE_URL: &str = "https://www.virustotal.com/vtapi/v2";

pub struct MalwareScanConnector {
    http: reqwest::Client,
    api_key: String,
}

impl MalwareScanConnector {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }

    async fn fetch(&self, observable: &Observable) -> anyhow::Result<Value> {
        let (path, param) = match observable.kind {
            ObservableKind::Hash => ("file/report", "resource"),
            ObservableKind::Url => ("url/report", "resource"),
            ObservableKind::Ip => ("ip-address/report", "ip"),
            ObservableKind::Domain => ("domain/report", "domain"),
            ObservableKind::Email => anyhow::bail!("unsupported observable kind"),
        };

        let raw = self
            .http
            .get(format!("{}/{}", BASE_URL, path))
            .query(&[("apikey", self.api_key.as_str()), (param, &observable.value)])
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        Ok(raw)
    }
}

/// Pull `positives`/`total` out of a scan report, if the report carries them
fn extract_ratio(raw: &Value) -> Option<Signal> {
    let positives = raw.get("positives")?.as_u64()?;
    let total = raw.get("total")?.as_u64()?;
    if total == 0 {
        return None;
    }
    Some(Signal::DetectionRatio {
        positives: positives as u32,
        total: total as u32,
    })
}

#[async_trait]
impl SignalConnector for MalwareScanConnector {
    fn name(&self) -> &'static str {
        "malware_scan"
    }

    fn supports(&self, observable: &Observable) -> bool {
        matches!(
            observable.kind,
            ObservableKind::Ip | ObservableKind::Url | ObservableKind::Domain | ObservableKind::Hash
        )
    }

    async fn query(&self, observable: &Observable) -> ConnectorOutcome {
        match self.fetch(observable).await {
            Ok(raw) => {
                let signal = extract_ratio(&raw);
                ConnectorOutcome::Success { raw, signal }
            }
            Err(e) => {
                debug!(value = %observable.value, error = %e, "Malware-scan lookup absent");
                ConnectorOutcome::Absent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_detection_ratio() {
        let raw = json!({"response_code": 1, "positives": 43, "total": 70, "scans": {}});
        assert_eq!(
            extract_ratio(&raw),
            Some(Signal::DetectionRatio {
                positives: 43,
                total: 70
            })
        );
    }

    #[test]
    fn report_without_ratio_contributes_no_signal() {
        let raw = json!({"response_code": 1, "detected_urls": []});
        assert_eq!(extract_ratio(&raw), None);
    }

    #[test]
    fn zero_total_is_no_signal() {
        let raw = json!({"positives": 0, "total": 0});
        assert_eq!(extract_ratio(&raw), None);
    }
}
