//! In-process mock cluster
//!
//! Implements a configurable fake of the cluster management API for
//! tests: scripted task status progressions, canned listings, and failure
//! injection for both API-level errors (4xx/5xx bodies) and
//! transport-level outages (no response at all).
//!
//! # Usage
//!
//! Configure a [`MockCluster`] through a
//! [`MockTransport`](crate::client::transport::MockTransport), then drive
//! an [`ApiClient`](crate::client::ApiClient) against it:
//!
//! - `add_task` / `add_running_then_ok` / `add_failed_task`: script the
//!   status records a task reports poll by poll (the last one repeats)
//! - `set_task_log`: canned log lines for the log endpoint
//! - `inject_failure`: fail requests whose path starts with a prefix
//! - `poll_count` / `was_stopped` / `last_request_headers`: observations
//!   for assertions

mod cluster;
mod failure;

pub use cluster::{MockCluster, MockTask};
pub use failure::{FailureConfig, FailureInjector, FailureOutcome};
