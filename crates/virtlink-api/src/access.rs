//! Access endpoint records
//!
//! Wire shapes for ticket login, permission listing and realm queries.

use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Body of `POST /access/ticket`.
#[derive(Debug, Clone, Serialize)]
pub struct TicketRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    /// One-time password for second-factor realms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

impl TicketRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            realm: None,
            otp: None,
        }
    }
}

/// Response of `POST /access/ticket`: the session ticket plus the token
/// that must accompany every write request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_token: String,
    #[serde(default, rename = "clustername", skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
}

/// Query options for `GET /access/permissions`.
#[derive(Debug, Clone, Default)]
pub struct PermissionsOptions {
    /// Restrict the listing to one ACL path.
    pub path: Option<String>,
    /// List permissions of another user (requires user-modify privileges).
    pub user_id: Option<String>,
}

/// Effective permissions: ACL path → privilege name → granted.
pub type Permissions = HashMap<String, HashMap<String, IntOrBool>>;

/// API booleans appear as `0`/`1` on older endpoints and `true`/`false`
/// on newer ones; both decode into this wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntOrBool(pub bool);

impl From<bool> for IntOrBool {
    fn from(value: bool) -> Self {
        IntOrBool(value)
    }
}

impl<'de> Deserialize<'de> for IntOrBool {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Bool(b) => Ok(IntOrBool(b)),
            serde_json::Value::Number(n) => Ok(IntOrBool(n.as_i64().unwrap_or(0) != 0)),
            other => Err(D::Error::custom(format!(
                "expected bool or integer, got {other}"
            ))),
        }
    }
}

impl Serialize for IntOrBool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0 as u8)
    }
}

/// An authentication realm, one row of `GET /access/domains`.
///
/// The per-realm endpoint returns the configuration without the realm
/// name; the client fills `realm` back in from the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    #[serde(default)]
    pub realm: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autocreate: Option<IntOrBool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<IntOrBool>,
}

/// Body of `PUT /access/password`.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordRequest {
    pub userid: String,
    pub password: String,
}
