//! API client
//!
//! Typed request/response layer over a [`Transport`]. Unwraps the
//! `{"data": ...}` envelope, attaches auth material, and classifies
//! failures (authorization vs everything else) so best-effort readers
//! and the task poller can react differently.

pub mod transport;

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use virtlink_api::access::Session;
use virtlink_api::envelope::{ApiErrorBody, DataEnvelope};

use transport::{ApiRequest, Method, Transport, TransportError};

/// Auth material attached to outgoing requests.
#[derive(Debug, Clone, Default)]
enum Auth {
    #[default]
    None,
    /// Static API token, sent as `Authorization: VLAPIToken=<token>`.
    Token(String),
    /// Session ticket from `/access/ticket`: cookie on every request,
    /// CSRF token on write methods.
    Session { ticket: String, csrf_token: String },
}

/// Errors surfaced by the API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The principal may not access the addressed resource (HTTP 401/403).
    #[error("not authorized ({status}): {message}")]
    NotAuthorized { status: u16, message: String },

    /// Any other non-2xx response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never produced a response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A 2xx response whose body did not decode into the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),
}

impl ApiError {
    /// True when the error means "this principal may not read that
    /// resource" rather than a hard failure. Best-effort readers continue
    /// past it; the task poller treats it as fatal (no status read means
    /// no completion verdict).
    pub fn is_not_authorized(&self) -> bool {
        matches!(self, ApiError::NotAuthorized { .. })
    }

    /// True for errors where re-issuing the request may succeed: the
    /// request vanished at the transport level without a server verdict.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(t) if t.is_transient())
    }
}

/// Predicate form of [`ApiError::is_not_authorized`] for call sites
/// holding a reference.
pub fn is_not_authorized(error: &ApiError) -> bool {
    error.is_not_authorized()
}

/// Client for the cluster management API.
///
/// Shared, not owned: wrap it in an [`Arc`] and hand clones to every
/// [`crate::Task`], [`crate::Cluster`] and [`crate::Node`]. The client
/// never mutates transport configuration.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    auth: Mutex<Auth>,
}

impl ApiClient {
    /// Create an unauthenticated client over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            auth: Mutex::new(Auth::None),
        }
    }

    /// Create a client that authenticates with a static API token.
    pub fn with_token(transport: Arc<dyn Transport>, token: impl Into<String>) -> Self {
        let client = Self::new(transport);
        client.set_token(token);
        client
    }

    /// Install a static API token for subsequent requests.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.auth.lock().unwrap() = Auth::Token(token.into());
    }

    /// Install a session ticket (done by `ticket` after login).
    pub fn set_session(&self, session: &Session) {
        *self.auth.lock().unwrap() = Auth::Session {
            ticket: session.ticket.clone(),
            csrf_token: session.csrf_token.clone(),
        };
    }

    /// GET `path` and decode the envelope's `data`.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::Get, path, None)
    }

    /// POST `body` to `path` and decode the envelope's `data`.
    pub fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::Post, path, Some(self.encode(body)?))
    }

    /// PUT `body` to `path` and decode the envelope's `data`.
    pub fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::Put, path, Some(self.encode(body)?))
    }

    /// DELETE `path` and decode the envelope's `data`.
    pub fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::Delete, path, None)
    }

    fn encode<B: Serialize>(&self, body: &B) -> Result<serde_json::Value, ApiError> {
        serde_json::to_value(body).map_err(|e| ApiError::Decode(format!("request encode: {e}")))
    }

    fn headers_for(&self, method: Method) -> Vec<(String, String)> {
        match &*self.auth.lock().unwrap() {
            Auth::None => Vec::new(),
            Auth::Token(token) => vec![(
                "Authorization".to_string(),
                format!("VLAPIToken={token}"),
            )],
            Auth::Session { ticket, csrf_token } => {
                let mut headers = vec![(
                    "Cookie".to_string(),
                    format!("VLAuthCookie={ticket}"),
                )];
                if method.is_write() {
                    headers.push(("CSRFPreventionToken".to_string(), csrf_token.clone()));
                }
                headers
            }
        }
    }

    /// Execute the request and return the envelope's `data`, `Null` when
    /// the endpoint acknowledged without a payload.
    fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ApiError> {
        let mut request = ApiRequest::new(method, path);
        request.body = body;
        request.headers = self.headers_for(method);

        let response = self.transport.execute(&request)?;

        if !response.is_success() {
            let parsed: ApiErrorBody =
                serde_json::from_value(response.body.clone()).unwrap_or_default();
            let message = parsed
                .message
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            return Err(match response.status {
                401 | 403 => ApiError::NotAuthorized {
                    status: response.status,
                    message,
                },
                status => ApiError::Api { status, message },
            });
        }

        let envelope: DataEnvelope<serde_json::Value> = serde_json::from_value(response.body)
            .map_err(|e| ApiError::Decode(format!("{method} {path}: {e}")))?;
        Ok(envelope.data.unwrap_or(serde_json::Value::Null))
    }

    fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let data = self.dispatch(method, path, body)?;
        if data.is_null() {
            return Err(ApiError::Decode(format!(
                "{method} {path}: response has no data"
            )));
        }
        serde_json::from_value(data).map_err(|e| ApiError::Decode(format!("{method} {path}: {e}")))
    }

    /// Like `request` but tolerates a `null`/absent `data` field, for
    /// write endpoints that acknowledge without a payload.
    pub(crate) fn request_optional<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Option<T>, ApiError> {
        let data = self.dispatch(method, path, body)?;
        if data.is_null() {
            return Ok(None);
        }
        serde_json::from_value(data)
            .map(Some)
            .map_err(|e| ApiError::Decode(format!("{method} {path}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::transport::MockTransport;
    use super::*;
    use virtlink_api::cluster::ClusterStatusEntry;

    fn create_client() -> (Arc<MockTransport>, Arc<ApiClient>) {
        let transport = Arc::new(MockTransport::new());
        let client = Arc::new(ApiClient::new(transport.clone() as Arc<dyn Transport>));
        (transport, client)
    }

    #[test]
    fn test_get_decodes_envelope() {
        let (_, client) = create_client();
        let rows: Vec<ClusterStatusEntry> = client.get("/cluster/status").unwrap();
        assert!(rows.iter().any(|r| r.kind == "cluster"));
    }

    #[test]
    fn test_not_authorized_classification() {
        let (transport, client) = create_client();
        transport.cluster().inject_failure(
            "/cluster/status",
            crate::mock::FailureConfig::not_authorized(),
        );

        let result: Result<Vec<ClusterStatusEntry>, _> = client.get("/cluster/status");
        let error = result.unwrap_err();
        assert!(error.is_not_authorized());
        assert!(is_not_authorized(&error));
        assert!(!error.is_transient());
    }

    #[test]
    fn test_other_status_is_api_error() {
        let (transport, client) = create_client();
        transport.cluster().inject_failure(
            "/cluster/status",
            crate::mock::FailureConfig::http(500, "internal error"),
        );

        let result: Result<Vec<ClusterStatusEntry>, _> = client.get("/cluster/status");
        match result.unwrap_err() {
            ApiError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "internal error");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_transport_error_is_transient() {
        let (transport, client) = create_client();
        transport
            .cluster()
            .inject_failure("/cluster/status", crate::mock::FailureConfig::transient(1));

        let result: Result<Vec<ClusterStatusEntry>, _> = client.get("/cluster/status");
        assert!(result.unwrap_err().is_transient());

        // injection exhausted, next read succeeds
        let rows: Vec<ClusterStatusEntry> = client.get("/cluster/status").unwrap();
        assert!(!rows.is_empty());
    }

    #[test]
    fn test_token_auth_header() {
        let (transport, client) = create_client();
        client.set_token("svc@token!ci=secret");

        let _: Vec<ClusterStatusEntry> = client.get("/cluster/status").unwrap();
        let headers = transport.cluster().last_request_headers();
        assert!(headers
            .iter()
            .any(|(name, value)| name == "Authorization" && value == "VLAPIToken=svc@token!ci=secret"));
    }

    #[test]
    fn test_csrf_header_only_on_writes() {
        let (transport, client) = create_client();
        client.set_session(&Session {
            username: "root@pam".to_string(),
            ticket: "VL:root@pam:65D4B1C3::sig".to_string(),
            csrf_token: "65D4B1C3:token".to_string(),
            cluster_name: None,
        });

        let _: Vec<ClusterStatusEntry> = client.get("/cluster/status").unwrap();
        let read_headers = transport.cluster().last_request_headers();
        assert!(read_headers.iter().any(|(name, _)| name == "Cookie"));
        assert!(!read_headers.iter().any(|(name, _)| name == "CSRFPreventionToken"));

        let _: Option<serde_json::Value> = client
            .request_optional(
                Method::Put,
                "/access/password",
                Some(serde_json::json!({"userid": "u@pam", "password": "p"})),
            )
            .unwrap();
        let write_headers = transport.cluster().last_request_headers();
        assert!(write_headers.iter().any(|(name, _)| name == "CSRFPreventionToken"));
    }
}
