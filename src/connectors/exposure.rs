//! Device/service exposure scanner connector
//!
//! Looks up exposed services for an IP (open ports, banners, org metadata).
//! Contributes raw audit context only; exposure data carries no scoring
//! signal of its own.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::models::Observable;

use super::{ConnectorOutcome, SignalConnector};

const BASE_URL: &str = "https://api.shodan.io/shodan/host";

pub struct ExposureConnector {
    http: reqwest::Client,
    api_key: String,
}

impl ExposureConnector {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl SignalConnector for ExposureConnector {
    fn name(&self) -> &'static str {
        "exposure"
    }

    fn supports(&self, observable: &Observable) -> bool {
        observable.as_ip().is_some()
    }

    async fn query(&self, observable: &Observable) -> ConnectorOutcome {
        let Some(ip) = observable.as_ip() else {
            return ConnectorOutcome::Absent;
        };

        let result = async {
            self.http
                .get(format!("{}/{}", BASE_URL, ip))
                .query(&[("key", self.api_key.as_str())])
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(anyhow::Error::from)
        }
        .await;

        match result {
            Ok(raw) => ConnectorOutcome::Success { raw, signal: None },
            Err(e) => {
                debug!(value = %observable.value, error = %e, "Exposure lookup absent");
                ConnectorOutcome::Absent
            }
        }
    }
}
