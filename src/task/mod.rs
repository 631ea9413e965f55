//! Task tracking
//!
//! A write operation against the cluster returns immediately with a UPID;
//! the actual work runs in the background on the owning node. [`Task`]
//! wraps one UPID and turns it into an observable unit of work: poll once
//! with [`Task::status`], or block with [`Task::wait`]/[`Task::wait_for`]
//! until the remote job reaches a terminal state, a deadline passes, or
//! the caller cancels.
//!
//! A `Task` is owned by one logical caller; concurrent observation of the
//! same task needs external serialization (the `&mut` receivers make this
//! a compile-time property). Independent tasks are freely concurrent and
//! share the client behind an `Arc`.

mod poller;

pub use poller::{PollState, PollerConfig, WaitError, DEFAULT_POLL_INTERVAL};

use std::sync::Arc;

use chrono::{DateTime, Utc};

use virtlink_api::task::{TaskLogLine, TaskStatusRecord};
use virtlink_api::{Upid, EXIT_STATUS_OK};

use crate::client::{ApiClient, ApiError};

/// Last observed status of a remote task.
#[derive(Debug, Clone, Default)]
pub struct TaskStatus {
    /// The remote reports the task as still executing.
    pub running: bool,
    /// Raw exit-status text; `"OK"` on success. Present only once the
    /// scheduler has recorded completion.
    pub exit_status: Option<String>,
    /// Most recently fetched log lines, oldest first.
    pub log_tail: Vec<String>,
}

impl TaskStatus {
    /// Terminal means stopped with an exit status recorded. A stopped
    /// report without an exit status can race the scheduler's bookkeeping
    /// and counts as not yet terminal.
    pub fn is_terminal(&self) -> bool {
        !self.running && self.exit_status.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn is_successful(&self) -> bool {
        self.is_terminal() && self.exit_status.as_deref() == Some(EXIT_STATUS_OK)
    }

    pub fn is_failed(&self) -> bool {
        self.is_terminal() && !self.is_successful()
    }
}

/// Local handle that tracks and reports on one remote task.
pub struct Task {
    upid: Upid,
    client: Arc<ApiClient>,
    status: TaskStatus,
    created_at: DateTime<Utc>,
}

impl Task {
    /// Wrap a UPID. Purely local; no request is made until a status call.
    pub fn new(upid: Upid, client: Arc<ApiClient>) -> Self {
        Self {
            upid,
            client,
            status: TaskStatus::default(),
            created_at: Utc::now(),
        }
    }

    pub fn upid(&self) -> &Upid {
        &self.upid
    }

    /// When this handle was created (not when the remote task started;
    /// that lives in the UPID).
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The cached status snapshot. Never triggers I/O.
    pub fn snapshot(&self) -> &TaskStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.status.running
    }

    /// True only if a terminal snapshot exists and the exit status equals
    /// the success marker. False (not an error) while still running.
    pub fn is_successful(&self) -> bool {
        self.status.is_successful()
    }

    /// True if a terminal snapshot exists with a non-success exit status.
    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }

    /// Raw remote exit-status text, once terminal.
    pub fn exit_status(&self) -> Option<&str> {
        self.status.exit_status.as_deref()
    }

    fn task_path(&self) -> String {
        format!("/nodes/{}/tasks/{}", self.upid.node, self.upid)
    }

    /// Fetch the remote status once and refresh the snapshot.
    ///
    /// Transport errors surface as-is, unretried; retry policy belongs to
    /// [`Task::wait`]. Once the snapshot is terminal this is a no-op: the
    /// remote may recycle task bookkeeping, and a completed verdict never
    /// regresses.
    pub fn status(&mut self) -> Result<(), ApiError> {
        if self.status.is_terminal() {
            return Ok(());
        }
        let record: TaskStatusRecord = self.client.get(&format!("{}/status", self.task_path()))?;
        self.status.running = record.is_running();
        self.status.exit_status = record.exitstatus.filter(|s| !s.is_empty());
        Ok(())
    }

    /// Fetch a window of the task log and refresh the snapshot's tail.
    pub fn log(&mut self, start: u64, limit: u64) -> Result<Vec<TaskLogLine>, ApiError> {
        let lines: Vec<TaskLogLine> = self.client.get(&format!(
            "{}/log?start={start}&limit={limit}",
            self.task_path()
        ))?;
        self.status.log_tail = lines.iter().map(|line| line.t.clone()).collect();
        Ok(lines)
    }

    /// Ask the owning node to stop the task.
    ///
    /// Explicit operation only; [`Task::wait`] never stops remote work on
    /// local timeout or cancellation.
    pub fn stop(&self) -> Result<(), ApiError> {
        use crate::client::transport::Method;
        self.client
            .request_optional::<serde_json::Value>(Method::Delete, &self.task_path(), None)?;
        Ok(())
    }
}
