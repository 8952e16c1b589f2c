//! Best-effort geographic labeling
//!
//! A single short-timeout lookup against an external geolocation
//! service labels the node with country and network organization.
//! Every failure mode collapses to a fixed sentinel label; nothing
//! here ever propagates an error.

use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Label used when the lookup fails in any way
pub const UNKNOWN_LABEL: &str = "UN_NET";

/// Default lookup endpoint
pub const DEFAULT_ENDPOINT: &str = "https://ipapi.co/json/";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct GeoResponse {
    country_code: Option<String>,
    org: Option<String>,
}

/// Labels the node with a coarse location/network identity
#[derive(Debug, Clone)]
pub struct GeoTagger {
    endpoint: String,
}

impl GeoTagger {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Use a non-default lookup endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Look up the node's geo label.
    ///
    /// Returns `{country_code}_{org}` on success and the sentinel on
    /// timeout, non-success status, malformed body, or missing fields.
    pub async fn lookup(&self) -> String {
        match self.try_lookup().await {
            Some(label) => label,
            None => {
                debug!("Geo lookup failed, using sentinel label");
                UNKNOWN_LABEL.to_string()
            }
        }
    }

    async fn try_lookup(&self) -> Option<String> {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .ok()?;

        let response = client.get(&self.endpoint).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }

        let body: GeoResponse = response.json().await.ok()?;
        Some(format!("{}_{}", body.country_code?, body.org?))
    }
}

impl Default for GeoTagger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_sentinel() {
        // Nothing listens on the discard port
        let tagger = GeoTagger::with_endpoint("http://127.0.0.1:9/json/");
        assert_eq!(tagger.lookup().await, UNKNOWN_LABEL);
    }

    #[tokio::test]
    async fn test_malformed_body_yields_sentinel() {
        let tagger = GeoTagger::with_endpoint(serve_once("HTTP/1.1 200 OK\r\ncontent-length: 8\r\n\r\nnot json").await);
        assert_eq!(tagger.lookup().await, UNKNOWN_LABEL);
    }

    #[tokio::test]
    async fn test_non_success_status_yields_sentinel() {
        let tagger = GeoTagger::with_endpoint(serve_once("HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\n\r\n").await);
        assert_eq!(tagger.lookup().await, UNKNOWN_LABEL);
    }

    #[tokio::test]
    async fn test_missing_fields_yield_sentinel() {
        let body = r#"{"country_code":"DE"}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let tagger = GeoTagger::with_endpoint(serve_once(&response).await);
        assert_eq!(tagger.lookup().await, UNKNOWN_LABEL);
    }

    #[tokio::test]
    async fn test_successful_lookup_builds_label() {
        let body = r#"{"country_code":"DE","org":"EXAMPLE-NET"}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let tagger = GeoTagger::with_endpoint(serve_once(&response).await);
        assert_eq!(tagger.lookup().await, "DE_EXAMPLE-NET");
    }

    /// Serve one canned HTTP response on an ephemeral port
    async fn serve_once(response: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = response.to_string();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                use tokio::io::AsyncReadExt;
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        format!("http://{}/json/", addr)
    }
}
