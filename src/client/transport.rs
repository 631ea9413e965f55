//! Transport layer for the API client
//!
//! Abstracts the HTTP connection for testability. Provides:
//! - Transport trait: interface the client issues requests through
//! - HttpTransport: real HTTPS connection for production
//! - MockTransport: in-process mock cluster for unit tests

use std::io;
use std::time::Duration;

use crate::mock::MockCluster;

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Write methods must carry the CSRF prevention token when the client
    /// authenticates with a session ticket.
    pub fn is_write(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One request against the management API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API root, e.g. `/cluster/status`. May carry a query
    /// string.
    pub path: String,
    /// JSON body for write methods.
    pub body: Option<serde_json::Value>,
    /// Auth and protocol headers attached by the client.
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }

    /// Query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, q)| q)
    }
}

/// Raw response before envelope decoding. Non-2xx responses are carried
/// here too; `TransportError` is reserved for requests that never
/// produced a response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Decoded JSON body; `Null` when the body was empty.
    pub body: serde_json::Value,
}

impl RawResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport errors: the request did not produce an HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Errors a polling loop may retry: the request vanished without a
    /// verdict from the server. Protocol errors are excluded; a server
    /// that answers garbage will keep answering garbage.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed(_) | TransportError::Timeout | TransportError::Io(_)
        )
    }
}

/// Transport trait for API communication.
pub trait Transport: Send + Sync {
    /// Execute one API request and return the raw status and JSON body.
    fn execute(&self, request: &ApiRequest) -> Result<RawResponse, TransportError>;
}

/// Mock transport for testing - connects directly to a MockCluster
/// in-process.
pub struct MockTransport {
    cluster: MockCluster,
}

impl MockTransport {
    /// Create a new mock transport with a fresh mock cluster.
    pub fn new() -> Self {
        Self {
            cluster: MockCluster::new(),
        }
    }

    /// Create a mock transport with a pre-configured cluster.
    pub fn with_cluster(cluster: MockCluster) -> Self {
        Self { cluster }
    }

    /// The underlying mock cluster, for test configuration.
    pub fn cluster(&self) -> &MockCluster {
        &self.cluster
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.cluster.handle_request(request)
    }
}

/// Connection configuration for `HttpTransport`.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// API root, e.g. `https://cluster.example:8006/api2/json`.
    pub base_url: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout, including the body read.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("virtlink/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTPS transport for production use.
pub struct HttpTransport {
    agent: ureq::Agent,
    config: HttpConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: HttpConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build();
        Self { agent, config }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn decode(response: ureq::Response) -> Result<RawResponse, TransportError> {
        let status = response.status();
        let text = response.into_string()?;
        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| TransportError::Protocol(format!("invalid JSON body: {e}")))?
        };
        Ok(RawResponse { status, body })
    }

    fn map_transport(error: ureq::Transport) -> TransportError {
        match error.kind() {
            ureq::ErrorKind::Dns
            | ureq::ErrorKind::ConnectionFailed
            | ureq::ErrorKind::ProxyConnect => TransportError::ConnectionFailed(error.to_string()),
            // ureq reports socket timeouts as I/O errors
            ureq::ErrorKind::Io => {
                TransportError::Io(io::Error::new(io::ErrorKind::Other, error.to_string()))
            }
            _ => TransportError::Protocol(error.to_string()),
        }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let mut http_request = self
            .agent
            .request(request.method.as_str(), &self.url_for(&request.path));
        for (name, value) in &request.headers {
            http_request = http_request.set(name, value);
        }

        let result = match &request.body {
            Some(body) => http_request.send_json(body.clone()),
            None => http_request.call(),
        };

        match result {
            Ok(response) => Self::decode(response),
            // non-2xx still carries a response body worth decoding
            Err(ureq::Error::Status(status, response)) => {
                let body = response
                    .into_string()
                    .ok()
                    .and_then(|text| serde_json::from_str(&text).ok())
                    .unwrap_or(serde_json::Value::Null);
                Ok(RawResponse { status, body })
            }
            Err(ureq::Error::Transport(t)) => Err(Self::map_transport(t)),
        }
    }
}
