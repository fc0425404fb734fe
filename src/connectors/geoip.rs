//! IP geolocation connector
//!
//! Geolocates ip observables directly; domain/url observables are first
//! reduced to their hostname and resolved to their first A record. Failure
//! at any step means no location, never an error.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::models::{GeoLocation, Observable, ObservableKind};

use super::{ConnectorOutcome, DohClient, SignalConnector};

const BASE_URL: &str = "http://ip-api.com/json";

pub struct GeoIpConnector {
    http: reqwest::Client,
    doh: DohClient,
}

impl GeoIpConnector {
    pub fn new(http: reqwest::Client, doh: DohClient) -> Self {
        Self { http, doh }
    }

    async fn fetch(&self, ip: &str) -> anyhow::Result<Value> {
        let raw = self
            .http
            .get(format!("{}/{}", BASE_URL, ip))
            .query(&[("fields", "status,country,city,lat,lon,isp,org,query")])
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        if raw.get("status").and_then(Value::as_str) != Some("success") {
            anyhow::bail!("geolocation lookup unsuccessful");
        }
        Ok(raw)
    }

    /// IP to geolocate: the observable itself, or its first A record
    async fn target_ip(&self, observable: &Observable) -> Option<String> {
        if let Some(ip) = observable.as_ip() {
            return Some(ip.to_string());
        }
        let host = observable.hostname()?;
        self.doh.first_a(host).await
    }
}

/// Location fields out of a stored geolocation payload
pub fn location_from_raw(raw: &Value) -> GeoLocation {
    GeoLocation {
        country: raw
            .get("country")
            .and_then(Value::as_str)
            .map(String::from),
        city: raw.get("city").and_then(Value::as_str).map(String::from),
        latitude: raw.get("lat").and_then(Value::as_f64),
        longitude: raw.get("lon").and_then(Value::as_f64),
    }
}

#[async_trait]
impl SignalConnector for GeoIpConnector {
    fn name(&self) -> &'static str {
        "geoip"
    }

    fn supports(&self, observable: &Observable) -> bool {
        matches!(
            observable.kind,
            ObservableKind::Ip | ObservableKind::Domain | ObservableKind::Url
        )
    }

    async fn query(&self, observable: &Observable) -> ConnectorOutcome {
        let Some(ip) = self.target_ip(observable).await else {
            debug!(value = %observable.value, "No IP to geolocate");
            return ConnectorOutcome::Absent;
        };

        match self.fetch(&ip).await {
            Ok(raw) => ConnectorOutcome::Success { raw, signal: None },
            Err(e) => {
                debug!(value = %observable.value, error = %e, "Geolocation lookup absent");
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
    fn location_fields_extracted() {
        let raw = json!({
            "status": "success",
            "country": "Netherlands",
            "city": "Amsterdam",
            "lat": 52.37,
            "lon": 4.89,
            "query": "1.2.3.4"
        });
        let loc = location_from_raw(&raw);
        assert_eq!(loc.country.as_deref(), Some("Netherlands"));
        assert_eq!(loc.city.as_deref(), Some("Amsterdam"));
        assert_eq!(loc.latitude, Some(52.37));
        assert_eq!(loc.longitude, Some(4.89));
    }

    #[test]
    fn partial_payload_leaves_fields_absent() {
        let loc = location_from_raw(&json!({"country": "France"}));
        assert_eq!(loc.country.as_deref(), Some("France"));
        assert!(loc.city.is_none());
        assert!(loc.latitude.is_none());
        assert!(loc.longitude.is_none());
    }
}
