//! Node-level task views
//!
//! Per-node wrappers over `/nodes/{node}/tasks`. Listings are read-only
//! discovery views; the [`Task`](crate::Task) state machine is always
//! driven through the status endpoint, never from listing rows.

use std::sync::Arc;

use virtlink_api::task::TaskListEntry;
use virtlink_api::{Upid, UpidParseError};

use crate::client::{ApiClient, ApiError};
use crate::task::Task;

/// Handle for one cluster member node.
pub struct Node {
    client: Arc<ApiClient>,
    name: String,
}

impl Node {
    /// Handle for the named node. Purely local; nothing is fetched.
    pub fn new(client: &Arc<ApiClient>, name: impl Into<String>) -> Self {
        Self {
            client: Arc::clone(client),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recent and in-flight tasks on this node.
    pub fn tasks(&self) -> Result<Vec<TaskListEntry>, ApiError> {
        self.client.get(&format!("/nodes/{}/tasks", self.name))
    }

    /// Build a [`Task`] handle from a UPID token, e.g. one picked out of
    /// a listing. Fails only if the token does not parse; nothing is
    /// fetched.
    pub fn task(&self, token: &str) -> Result<Task, UpidParseError> {
        let upid = Upid::parse(token)?;
        Ok(Task::new(upid, Arc::clone(&self.client)))
    }
}
