//! Failure injection for the mock cluster
//!
//! Supports configurable failure injection for testing error paths.

use std::collections::HashMap;

use crate::client::transport::TransportError;

/// Failure configuration for a path prefix.
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// HTTP status to return (API-level failure).
    pub status: Option<u16>,
    /// Error message for the response body.
    pub message: Option<String>,
    /// Fail at the transport level instead: the request produces no
    /// response at all.
    pub transport: bool,
    /// Number of times to fail before the injection clears
    /// (None = keep failing).
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Fail with an HTTP status and message.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: Some(message.into()),
            transport: false,
            fail_count: None,
        }
    }

    /// Fail with 403 permission denied.
    pub fn not_authorized() -> Self {
        Self::http(403, "permission denied")
    }

    /// Fail `count` times at the transport level, then succeed.
    pub fn transient(count: u32) -> Self {
        Self {
            status: None,
            message: None,
            transport: true,
            fail_count: Some(count),
        }
    }

    /// Cap how many times this injection fires.
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Outcome of a fired injection.
#[derive(Debug)]
pub enum FailureOutcome {
    /// Return this transport error.
    Transport(TransportError),
    /// Return this HTTP status and message body.
    Http { status: u16, message: String },
}

/// Holds pending injections keyed by path prefix.
#[derive(Debug, Default)]
pub struct FailureInjector {
    by_prefix: HashMap<String, FailureConfig>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for requests whose path starts with `prefix`.
    /// Replaces any previous injection for the same prefix.
    pub fn inject(&mut self, prefix: impl Into<String>, config: FailureConfig) {
        self.by_prefix.insert(prefix.into(), config);
    }

    /// Clear all injections.
    pub fn clear(&mut self) {
        self.by_prefix.clear();
    }

    /// Fire the injection matching `path`, if any, decrementing its
    /// remaining count.
    pub fn take(&mut self, path: &str) -> Option<FailureOutcome> {
        let prefix = self
            .by_prefix
            .keys()
            .find(|prefix| path.starts_with(prefix.as_str()))?
            .clone();

        let mut config = self.by_prefix.remove(&prefix)?;
        match config.fail_count {
            Some(0) => None,
            // last firing; the injection stays removed
            Some(1) => Some(Self::outcome(&config)),
            Some(remaining) => {
                config.fail_count = Some(remaining - 1);
                let outcome = Self::outcome(&config);
                self.by_prefix.insert(prefix, config);
                Some(outcome)
            }
            None => {
                let outcome = Self::outcome(&config);
                self.by_prefix.insert(prefix, config);
                Some(outcome)
            }
        }
    }

    fn outcome(config: &FailureConfig) -> FailureOutcome {
        if config.transport {
            FailureOutcome::Transport(TransportError::ConnectionFailed(
                "injected transport failure".to_string(),
            ))
        } else {
            FailureOutcome::Http {
                status: config.status.unwrap_or(500),
                message: config
                    .message
                    .clone()
                    .unwrap_or_else(|| "injected failure".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injection_matches_prefix() {
        let mut injector = FailureInjector::new();
        injector.inject("/cluster", FailureConfig::http(500, "boom"));

        assert!(injector.take("/cluster/status").is_some());
        assert!(injector.take("/nodes/node1/tasks").is_none());
    }

    #[test]
    fn test_unbounded_injection_keeps_firing() {
        let mut injector = FailureInjector::new();
        injector.inject("/cluster/status", FailureConfig::not_authorized());

        for _ in 0..5 {
            match injector.take("/cluster/status") {
                Some(FailureOutcome::Http { status, .. }) => assert_eq!(status, 403),
                other => panic!("expected HTTP outcome, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_counted_injection_exhausts() {
        let mut injector = FailureInjector::new();
        injector.inject("/nodes", FailureConfig::transient(2));

        assert!(matches!(
            injector.take("/nodes/node1/tasks/x/status"),
            Some(FailureOutcome::Transport(_))
        ));
        assert!(matches!(
            injector.take("/nodes/node1/tasks/x/status"),
            Some(FailureOutcome::Transport(_))
        ));
        assert!(injector.take("/nodes/node1/tasks/x/status").is_none());
    }

    #[test]
    fn test_clear() {
        let mut injector = FailureInjector::new();
        injector.inject("/cluster", FailureConfig::http(500, "boom"));
        injector.clear();

        assert!(injector.take("/cluster/status").is_none());
    }
}
