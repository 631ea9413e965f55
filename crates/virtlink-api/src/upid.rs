//! UPID parsing and re-encoding
//!
//! A UPID names exactly one asynchronous execution on the cluster:
//!
//! ```text
//! UPID:<node>:<pid>:<pstart>:<starttime>:<type>:<id>:<user>:
//! ```
//!
//! `pid`, `pstart` and `starttime` are zero-padded uppercase hex. The
//! grammar is owned by the remote system; this module parses it and
//! reproduces it byte-for-byte, because the token doubles as an API path
//! segment.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn upid_regex() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(
            r"^UPID:([a-zA-Z0-9](?:[a-zA-Z0-9\-]*[a-zA-Z0-9])?):([0-9A-F]{8}):([0-9A-F]{8,9}):([0-9A-F]{8}):([^:\s]+):([^:\s]*):([^:\s]+):$",
        )
        .expect("UPID grammar regex is well-formed")
    })
}

/// Errors from parsing a UPID token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpidParseError {
    /// The token does not match the delimited UPID structure.
    #[error("malformed task identifier: {0:?}")]
    Malformed(String),

    /// A required field did not decode as hex.
    #[error("task identifier field {field} is not valid hex: {value:?}")]
    BadHexField { field: &'static str, value: String },
}

/// A parsed job identifier.
///
/// Immutable once issued by the remote system; uniquely identifies one
/// remote execution. `Display` re-encodes the fields into the original
/// token, so `parse` → `to_string` is identity for any valid token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Upid {
    /// Node that owns the task.
    pub node: String,
    /// Worker process id on the node.
    pub pid: u32,
    /// Process start offset, disambiguates pid reuse across boots.
    pub pstart: u64,
    /// Task start time, unix seconds.
    pub starttime: i64,
    /// Task type tag, e.g. `vmcreate` or `vzdump`.
    pub task_type: String,
    /// Target object id; empty for cluster-wide tasks.
    pub task_id: String,
    /// User that issued the task, `name@realm` form.
    pub user: String,
}

impl Upid {
    /// Parse a UPID token into its fields.
    pub fn parse(token: &str) -> Result<Self, UpidParseError> {
        let captures = upid_regex()
            .captures(token)
            .ok_or_else(|| UpidParseError::Malformed(token.to_string()))?;

        let group = |index: usize| {
            captures
                .get(index)
                .map(|m| m.as_str())
                .unwrap_or_default()
        };
        let hex_u64 = |index: usize, field: &'static str| {
            let value = group(index);
            u64::from_str_radix(value, 16).map_err(|_| UpidParseError::BadHexField {
                field,
                value: value.to_string(),
            })
        };

        Ok(Self {
            node: group(1).to_string(),
            pid: hex_u64(2, "pid")? as u32,
            pstart: hex_u64(3, "pstart")?,
            starttime: hex_u64(4, "starttime")? as i64,
            task_type: group(5).to_string(),
            task_id: group(6).to_string(),
            user: group(7).to_string(),
        })
    }

    /// Task start time as a timestamp.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.starttime, 0)
    }
}

impl FromStr for Upid {
    type Err = UpidParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::parse(token)
    }
}

impl fmt::Display for Upid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UPID:{}:{:08X}:{:08X}:{:08X}:{}:{}:{}:",
            self.node, self.pid, self.pstart, self.starttime, self.task_type, self.task_id, self.user
        )
    }
}

impl Serialize for Upid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Upid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Upid::parse(&token).map_err(D::Error::custom)
    }
}
