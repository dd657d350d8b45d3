//! HTTP enrichment clients
//!
//! Thin reqwest clients for the enrichment collaborators. Each service
//! exposes a bulk lookup endpoint:
//!
//! `POST {base_url}/v1/lookup/{asn|geo|threat}` with `{"ips": [...]}`,
//! answering `{"results": {"<ip>": {...}}}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use super::types::{AsnInfo, GeoInfo, ThreatIntel, ToolData, ToolError, ToolKind};
use super::{LookupFuture, ToolLookup};

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    ips: &'a [IpAddr],
}

#[derive(Debug, Deserialize)]
struct LookupResponse<T> {
    results: BTreeMap<IpAddr, T>,
}

/// Bulk-lookup client for one enrichment service.
pub struct HttpToolClient {
    kind: ToolKind,
    base_url: String,
    http: reqwest::Client,
}

impl HttpToolClient {
    pub fn new(kind: ToolKind, base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn endpoint(&self) -> String {
        let path = match self.kind {
            ToolKind::Asn => "asn",
            ToolKind::Geolocation => "geo",
            ToolKind::ThreatIntel => "threat",
        };
        format!("{}/v1/lookup/{}", self.base_url, path)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        indicators: &[IpAddr],
    ) -> Result<BTreeMap<IpAddr, T>, ToolError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&LookupRequest { ips: indicators })
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Failed(format!(
                "{} returned HTTP {}",
                self.kind, status
            )));
        }

        let parsed: LookupResponse<T> = response
            .json()
            .await
            .map_err(|e| ToolError::Parse(e.to_string()))?;
        Ok(parsed.results)
    }
}

impl ToolLookup for HttpToolClient {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn lookup(&self, indicators: Vec<IpAddr>) -> LookupFuture<'_> {
        Box::pin(async move {
            match self.kind {
                ToolKind::Asn => self
                    .fetch::<AsnInfo>(&indicators)
                    .await
                    .map(ToolData::Asn),
                ToolKind::Geolocation => self
                    .fetch::<GeoInfo>(&indicators)
                    .await
                    .map(ToolData::Geolocation),
                ToolKind::ThreatIntel => self
                    .fetch::<ThreatIntel>(&indicators)
                    .await
                    .map(ToolData::ThreatIntel),
            }
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ToolError {
    if err.is_timeout() {
        ToolError::Timeout(Duration::ZERO)
    } else if err.is_connect() || err.is_request() {
        ToolError::Network(err.to_string())
    } else {
        ToolError::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        let client = HttpToolClient::new(
            ToolKind::Asn,
            "http://intel.local:9000/",
            Duration::from_secs(10),
        );
        assert_eq!(client.endpoint(), "http://intel.local:9000/v1/lookup/asn");

        let client = HttpToolClient::new(
            ToolKind::ThreatIntel,
            "http://intel.local:9000",
            Duration::from_secs(10),
        );
        assert_eq!(client.endpoint(), "http://intel.local:9000/v1/lookup/threat");
    }

    #[test]
    fn test_lookup_response_shape() {
        let body = r#"{"results":{"198.51.100.10":{"asn":64500,"owner":"EXAMPLE-NET","prefix":"198.51.100.0/24"}}}"#;
        let parsed: LookupResponse<AsnInfo> = serde_json::from_str(body).unwrap();
        let info = parsed
            .results
            .get(&"198.51.100.10".parse::<IpAddr>().unwrap())
            .unwrap();
        assert_eq!(info.asn, 64500);
    }
}
