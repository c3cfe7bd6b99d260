//! Relaying proxied requests to the backend.
//!
//! The [`Forwarder`] performs the actual HTTP exchange against the backend
//! address after the gate has run. Requests are re-issued through a shared
//! reqwest client; hop-by-hop headers are stripped in both directions and
//! the response is relayed otherwise unmodified.

use crate::error::{Error, Result};
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response, StatusCode};
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;

/// Headers that describe the connection, not the message; never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Request bodies are buffered before re-issuing; a dev backend has no
/// business receiving more than this.
const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Global shared HTTP client for backend exchanges.
///
/// One pooled client across all requests prevents file descriptor exhaustion
/// and reuses connections to the backend. No overall timeout: a dev backend
/// may legitimately sit in a debugger for minutes.
static SHARED_CLIENT: OnceLock<Client> = OnceLock::new();

fn shared_client() -> &'static Client {
    SHARED_CLIENT.get_or_init(|| {
        Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .expect("failed to create shared HTTP client")
    })
}

/// Re-issues inbound requests against the backend base URL.
pub struct Forwarder {
    client: Client,
    base: String,
}

impl Forwarder {
    /// Create a forwarder targeting `base` (e.g. `http://127.0.0.1:8081`).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the base is not a valid http/https URL.
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let base = base.into();
        let parsed = url::Url::parse(&base)
            .map_err(|e| Error::Config(format!("invalid backend address '{}': {}", base, e)))?;
        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(Error::Config(format!(
                "invalid backend address '{}': scheme must be http or https, got '{}'",
                base, scheme
            )));
        }
        Ok(Self {
            client: shared_client().clone(),
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Perform the exchange: rewrite the destination to the backend address,
    /// send, and relay the response.
    pub async fn forward(&self, req: Request<Body>) -> Result<Response<Body>> {
        let (parts, body) = req.into_parts();

        let mut url = format!("{}{}", self.base, parts.uri.path());
        if let Some(query) = parts.uri.query() {
            url.push('?');
            url.push_str(query);
        }

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .map_err(|e| Error::Upstream(format!("invalid method: {}", e)))?;

        let body_bytes = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| Error::Upstream(format!("failed to read request body: {}", e)))?;

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in parts.headers.iter() {
            let lower = name.as_str().to_ascii_lowercase();
            // Host is rewritten to the backend; length is recomputed.
            if lower == "host" || lower == "content-length" || HOP_BY_HOP.contains(&lower.as_str())
            {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
                reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }

        let upstream = self
            .client
            .request(method, &url)
            .headers(headers)
            .body(body_bytes.to_vec())
            .send()
            .await?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .map_err(|e| Error::Upstream(format!("invalid upstream status: {}", e)))?;

        let mut builder = Response::builder().status(status);
        for (name, value) in upstream.headers().iter() {
            let lower = name.as_str().to_ascii_lowercase();
            if lower == "content-length" || HOP_BY_HOP.contains(&lower.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        let body = upstream.bytes().await?;
        builder
            .body(Body::from(body))
            .map_err(|e| Error::Upstream(format!("failed to build response: {}", e)))
    }
}
