//! Virtlink API wire types
//!
//! Defines the JSON shapes exchanged with the cluster management API: the
//! `{"data": ...}` response envelope, the UPID task-identifier grammar, and
//! the records returned by the task, cluster and access endpoints.
//!
//! These types are shared between the client proper and the in-process
//! mock cluster used by the test suites.

pub mod access;
pub mod cluster;
pub mod envelope;
pub mod task;
pub mod upid;

pub use envelope::{ApiErrorBody, DataEnvelope};
pub use task::{TaskListEntry, TaskLogLine, TaskStatusRecord};
pub use upid::{Upid, UpidParseError};

/// Exit status the scheduler records for a cleanly finished task. Any
/// other non-empty exit status means the task failed.
pub const EXIT_STATUS_OK: &str = "OK";
