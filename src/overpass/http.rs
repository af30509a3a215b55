//! Blocking Overpass API client.

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{GeodataClient, QueryResult, RawNode, RawWay};
use crate::error::GeodataError;
use crate::features::Tags;
use crate::geomath::LatLon;

pub const DEFAULT_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

pub struct OverpassClient {
    client: Client,
    endpoint: String,
}

impl OverpassClient {
    pub fn new(endpoint: &str) -> Result<Self, GeodataError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GeodataError::Other(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl GeodataClient for OverpassClient {
    fn query(&self, query: &str, timeout: Duration) -> Result<QueryResult, GeodataError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .form(&[("data", query)])
            .send()
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        // A stalled or truncated body is a transport failure; only a body
        // that arrived whole but does not parse is malformed.
        let bytes = response.bytes().map_err(classify_transport_error)?;
        let body: Response = serde_json::from_slice(&bytes)
            .map_err(|e| GeodataError::Other(format!("invalid response body: {e}")))?;
        body.into_result()
    }
}

fn classify_transport_error(err: reqwest::Error) -> GeodataError {
    if err.is_timeout()
        || err.is_connect()
        || err.is_request()
        || err.is_body()
        || err.is_decode()
    {
        GeodataError::RetriesExhausted(err.to_string())
    } else {
        GeodataError::Other(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> GeodataError {
    let detail = format!("HTTP {}: {}", status.as_u16(), snippet(body));
    match status {
        StatusCode::GATEWAY_TIMEOUT => GeodataError::GatewayTimeout(detail),
        StatusCode::TOO_MANY_REQUESTS => GeodataError::RateLimited(detail),
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => {
            GeodataError::MalformedRequest(detail)
        }
        _ => GeodataError::Other(detail),
    }
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(idx, _)| idx)
        .unwrap_or(body.len());
    body[..end].trim()
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    elements: Vec<Element>,
    #[serde(default)]
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Element {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: Tags,
    },
    Way {
        id: i64,
        #[serde(default)]
        tags: Tags,
        #[serde(default)]
        center: Option<LatLon>,
        #[serde(default)]
        geometry: Option<Vec<Option<LatLon>>>,
    },
    #[serde(other)]
    Other,
}

impl Response {
    fn into_result(self) -> Result<QueryResult, GeodataError> {
        if let Some(remark) = &self.remark {
            let lower = remark.to_ascii_lowercase();
            if lower.contains("runtime error") && lower.contains("timed out") {
                return Err(GeodataError::GatewayTimeout(remark.clone()));
            }
            if lower.contains("out of memory") {
                return Err(GeodataError::MalformedRequest(remark.clone()));
            }
            tracing::debug!("Overpass: remark: {}", remark);
        }

        let mut result = QueryResult::default();
        for element in self.elements {
            match element {
                Element::Node { id, lat, lon, tags } => {
                    result.nodes.push(RawNode { id, lat, lon, tags })
                }
                Element::Way {
                    id,
                    tags,
                    center,
                    geometry,
                } => result.ways.push(RawWay {
                    id,
                    tags,
                    center,
                    geometry,
                }),
                Element::Other => {}
            }
        }
        Ok(result)
    }
}
