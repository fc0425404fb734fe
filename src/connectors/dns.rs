//! DNS connector
//!
//! Resolves forward A records plus MX and TXT independently (absence of
//! either is not an error), then attempts a reverse PTR lookup for every
//! resolved address, tolerating individual reverse failures. Lookups go
//! through a DNS-over-HTTPS JSON endpoint so DNS is just one more bounded
//! network call like every other connector.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use std::net::IpAddr;
use tracing::debug;

use crate::models::{Observable, ObservableKind};

use super::{ConnectorOutcome, SignalConnector};

const DOH_URL: &str = "https://dns.google/resolve";

/// Shared DNS-over-HTTPS JSON client
#[derive(Clone)]
pub struct DohClient {
    http: reqwest::Client,
}

impl DohClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Resolve `name` for one record type, returning the answer data strings
    pub async fn resolve(&self, name: &str, rtype: &str) -> anyhow::Result<Vec<String>> {
        let raw: Value = self
            .http
            .get(DOH_URL)
            .query(&[("name", name), ("type", rtype)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_answers(&raw, rtype))
    }

    /// First A record for a hostname, used for indirect geolocation
    pub async fn first_a(&self, host: &str) -> Option<String> {
        self.resolve(host, "A")
            .await
            .ok()
            .and_then(|records| records.into_iter().next())
    }
}

fn record_type_code(rtype: &str) -> u64 {
    match rtype {
        "A" => 1,
        "PTR" => 12,
        "MX" => 15,
        "TXT" => 16,
        _ => 0,
    }
}

/// Pull matching answer data out of a DoH JSON response
fn parse_answers(raw: &Value, rtype: &str) -> Vec<String> {
    let code = record_type_code(rtype);
    raw.get("Answer")
        .and_then(Value::as_array)
        .map(|answers| {
            answers
                .iter()
                .filter(|a| a.get("type").and_then(Value::as_u64) == Some(code))
                .filter_map(|a| a.get("data").and_then(Value::as_str))
                .map(|d| d.trim_end_matches('.').to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// PTR query name for an address (`in-addr.arpa` / `ip6.arpa`)
fn reverse_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa", d, c, b, a)
        }
        IpAddr::V6(v6) => {
            let nibbles: Vec<String> = v6
                .octets()
                .iter()
                .rev()
                .flat_map(|o| [format!("{:x}", o & 0xf), format!("{:x}", o >> 4)])
                .collect();
            format!("{}.ip6.arpa", nibbles.join("."))
        }
    }
}

pub struct DnsConnector {
    doh: DohClient,
}

impl DnsConnector {
    pub fn new(doh: DohClient) -> Self {
        Self { doh }
    }

    /// Reverse pairs for a set of addresses; a failed individual lookup
    /// yields an empty hostname list rather than failing the batch.
    async fn reverse_pairs(&self, addresses: &[String]) -> Vec<Value> {
        let lookups = addresses.iter().map(|addr| async move {
            let hostnames = match addr.parse::<IpAddr>() {
                Ok(ip) => self
                    .doh
                    .resolve(&reverse_name(ip), "PTR")
                    .await
                    .unwrap_or_default(),
                Err(_) => Vec::new(),
            };
            json!({ "ip": addr, "hostnames": hostnames })
        });
        join_all(lookups).await
    }
}

#[async_trait]
impl SignalConnector for DnsConnector {
    fn name(&self) -> &'static str {
        "dns"
    }

    fn supports(&self, observable: &Observable) -> bool {
        matches!(
            observable.kind,
            ObservableKind::Ip | ObservableKind::Domain | ObservableKind::Url
        )
    }

    async fn query(&self, observable: &Observable) -> ConnectorOutcome {
        let Some(host) = observable.hostname() else {
            return ConnectorOutcome::Absent;
        };

        // IP observables have no forward records; reverse-resolve directly
        if let Ok(ip) = host.parse::<IpAddr>() {
            let reverse = self.reverse_pairs(&[ip.to_string()]).await;
            let has_hostnames = reverse
                .iter()
                .any(|p| p["hostnames"].as_array().is_some_and(|h| !h.is_empty()));
            if !has_hostnames {
                debug!(value = %observable.value, "No reverse DNS records");
                return ConnectorOutcome::Absent;
            }
            return ConnectorOutcome::Success {
                raw: json!({ "reverse": reverse }),
                signal: None,
            };
        }

        let (a, mx, txt) = tokio::join!(
            self.doh.resolve(host, "A"),
            self.doh.resolve(host, "MX"),
            self.doh.resolve(host, "TXT"),
        );

        let a = a.unwrap_or_default();
        let mx = mx.unwrap_or_default();
        let txt = txt.unwrap_or_default();

        if a.is_empty() && mx.is_empty() && txt.is_empty() {
            debug!(value = %observable.value, "No DNS records resolved");
            return ConnectorOutcome::Absent;
        }

        let reverse = self.reverse_pairs(&a).await;

        ConnectorOutcome::Success {
            raw: json!({
                "a": a,
                "mx": mx,
                "txt": txt,
                "reverse": reverse,
            }),
            signal: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_matching_answers_only() {
        let raw = json!({
            "Status": 0,
            "Answer": [
                {"name": "example.com.", "type": 1, "data": "93.184.216.34"},
                {"name": "example.com.", "type": 46, "data": "a 13 2 3600 ..."},
            ]
        });
        assert_eq!(parse_answers(&raw, "A"), vec!["93.184.216.34"]);
        assert!(parse_answers(&raw, "MX").is_empty());
    }

    #[test]
    fn missing_answer_section_is_empty() {
        let raw = json!({"Status": 3});
        assert!(parse_answers(&raw, "A").is_empty());
    }

    #[test]
    fn strips_trailing_dots() {
        let raw = json!({
            "Answer": [{"type": 12, "data": "mail.example.com."}]
        });
        assert_eq!(parse_answers(&raw, "PTR"), vec!["mail.example.com"]);
    }

    #[test]
    fn v4_reverse_name() {
        assert_eq!(
            reverse_name("1.2.3.4".parse().unwrap()),
            "4.3.2.1.in-addr.arpa"
        );
    }

    #[test]
    fn v6_reverse_name_ends_with_arpa_zone() {
        let name = reverse_name("2001:db8::1".parse().unwrap());
        assert!(name.ends_with(".ip6.arpa"));
        assert!(name.starts_with("1.0.0.0."));
    }
}
