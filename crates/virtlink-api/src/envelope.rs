//! Response envelope
//!
//! Every API response wraps its payload as `{"data": ...}`. Non-2xx
//! responses carry a human-readable `message` and, for validation
//! failures, a per-parameter `errors` object.

use serde::{Deserialize, Serialize};

/// The `{"data": ...}` wrapper around every successful response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> DataEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self { data: Some(data) }
    }
}

/// Body of a non-2xx response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Single-line description, e.g. `permission denied`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Per-parameter validation errors, shape varies by endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl ApiErrorBody {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            errors: None,
        }
    }
}
