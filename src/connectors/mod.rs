//! Signal connectors
//!
//! One client per external reputation or auxiliary source. Every connector
//! resolves to a total outcome: a hit with its raw payload (and optionally a
//! scoring signal), an explicit absence, or a timeout. Connectors never
//! return errors upward; a source being down degrades that one signal, not
//! the analysis.

pub mod abuse;
pub mod dns;
pub mod exposure;
pub mod geoip;
pub mod malware_scan;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::Config;
use crate::fusion::Signal;
use crate::models::Observable;

pub use dns::DohClient;

/// Total outcome of one connector query
#[derive(Debug, Clone)]
pub enum ConnectorOutcome {
    /// The source answered; raw payload kept verbatim for audit, plus the
    /// scoring signal extracted from it (not every source contributes one)
    Success {
        raw: Value,
        signal: Option<Signal>,
    },
    /// No opinion: source disabled, errored, or had nothing to say
    Absent,
    /// The source did not settle within its timeout budget
    TimedOut,
}

#[async_trait]
pub trait SignalConnector: Send + Sync {
    /// Name the raw payload is stored under in the audit detail
    fn name(&self) -> &'static str;

    /// Whether this connector applies to the given observable
    fn supports(&self, observable: &Observable) -> bool;

    async fn query(&self, observable: &Observable) -> ConnectorOutcome;
}

/// Run one connector under its timeout budget; a slow source settles as
/// `TimedOut` rather than holding up the fan-in barrier.
pub async fn settle(
    connector: Arc<dyn SignalConnector>,
    observable: &Observable,
    budget: Duration,
) -> (&'static str, ConnectorOutcome) {
    let name = connector.name();
    match tokio::time::timeout(budget, connector.query(observable)).await {
        Ok(outcome) => (name, outcome),
        Err(_) => {
            warn!(connector = name, value = %observable.value, "Connector timed out");
            (name, ConnectorOutcome::TimedOut)
        }
    }
}

/// Build the connector registry from configuration. Connectors whose API key
/// is not configured are left out entirely (no opinion contributed).
pub fn build_registry(config: &Config, http: &reqwest::Client) -> Vec<Arc<dyn SignalConnector>> {
    let doh = DohClient::new(http.clone());
    let mut registry: Vec<Arc<dyn SignalConnector>> = Vec::new();

    if let Some(key) = &config.malware_scan_api_key {
        registry.push(Arc::new(malware_scan::MalwareScanConnector::new(
            http.clone(),
            key.clone(),
        )));
    } else {
        tracing::info!("Malware-scan connector disabled (no API key)");
    }

    if let Some(key) = &config.abuse_api_key {
        registry.push(Arc::new(abuse::AbuseConnector::new(http.clone(), key.clone())));
    } else {
        tracing::info!("Abuse-registry connector disabled (no API key)");
    }

    if let Some(key) = &config.exposure_api_key {
        registry.push(Arc::new(exposure::ExposureConnector::new(
            http.clone(),
            key.clone(),
        )));
    } else {
        tracing::info!("Exposure-scanner connector disabled (no API key)");
    }

    // DNS and geolocation need no credentials
    registry.push(Arc::new(dns::DnsConnector::new(doh.clone())));
    registry.push(Arc::new(geoip::GeoIpConnector::new(http.clone(), doh)));

    registry
}
