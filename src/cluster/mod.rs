//! Cluster-level operations
//!
//! Wrappers over the `/cluster` endpoints. Reads return typed listings;
//! writes are fire-and-forget on the remote side and answer with a UPID,
//! surfaced here as a [`Task`] handle.

use std::sync::Arc;

use virtlink_api::cluster::{
    BackupOptions, BackupSchedule, ClusterResource, ClusterStatusEntry, ResourceKind,
    CLUSTER_STATUS_CLUSTER, CLUSTER_STATUS_NODE,
};
use virtlink_api::task::TaskListEntry;
use virtlink_api::Upid;

use crate::client::{ApiClient, ApiError};
use crate::task::Task;

/// Handle for cluster-wide state and operations.
pub struct Cluster {
    client: Arc<ApiClient>,
    /// Cluster name, filled by `status`.
    pub name: Option<String>,
    /// Quorum reached, filled by `status`.
    pub quorate: Option<bool>,
    /// Member nodes, filled by `status`.
    pub nodes: Vec<ClusterStatusEntry>,
}

impl Cluster {
    /// A handle with no state loaded yet.
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            name: None,
            quorate: None,
            nodes: Vec::new(),
        }
    }

    /// Cluster handle with a best-effort status load.
    ///
    /// Reading `/cluster/status` needs an audit privilege the principal
    /// may lack; a partially readable cluster is still usable for task
    /// listings and backup operations, so a not-authorized status read is
    /// tolerated rather than surfaced.
    pub fn connect(client: &Arc<ApiClient>) -> Result<Cluster, ApiError> {
        let mut cluster = Cluster::new(Arc::clone(client));
        match cluster.status() {
            Ok(()) => Ok(cluster),
            Err(err) if err.is_not_authorized() => Ok(cluster),
            Err(err) => Err(err),
        }
    }

    /// Refresh name, quorum and the member listing from
    /// `/cluster/status`.
    pub fn status(&mut self) -> Result<(), ApiError> {
        let entries: Vec<ClusterStatusEntry> = self.client.get("/cluster/status")?;
        for entry in &entries {
            if entry.kind == CLUSTER_STATUS_CLUSTER {
                self.name = Some(entry.name.clone());
                self.quorate = entry.quorate.map(|q| q != 0);
            }
        }
        self.nodes = entries
            .into_iter()
            .filter(|e| e.kind == CLUSTER_STATUS_NODE)
            .collect();
        Ok(())
    }

    /// Lowest guest id not yet in use.
    pub fn next_id(&self) -> Result<u64, ApiError> {
        // the API answers with a string
        let raw: String = self.client.get("/cluster/nextid")?;
        raw.parse()
            .map_err(|_| ApiError::Decode(format!("nextid is not a number: {raw:?}")))
    }

    /// Summary of all resources in the cluster, optionally filtered by
    /// kind.
    pub fn resources(&self, kind: Option<ResourceKind>) -> Result<Vec<ClusterResource>, ApiError> {
        let path = match kind {
            Some(kind) => format!("/cluster/resources?type={kind}"),
            None => "/cluster/resources".to_string(),
        };
        self.client.get(&path)
    }

    /// Cluster-wide task listing: recent and in-flight tasks across all
    /// nodes. Rows whose UPID does not parse are dropped; the remote is
    /// authoritative for the grammar, so a mismatch is a listing defect,
    /// not a reason to fail the whole read.
    pub fn tasks(&self) -> Result<Vec<Task>, ApiError> {
        let rows: Vec<TaskListEntry> = self.client.get("/cluster/tasks")?;
        Ok(rows
            .into_iter()
            .filter_map(|row| Upid::parse(&row.upid).ok())
            .map(|upid| Task::new(upid, Arc::clone(&self.client)))
            .collect())
    }

    /// Configured backup schedules.
    pub fn backup_schedules(&self) -> Result<Vec<BackupSchedule>, ApiError> {
        self.client.get("/cluster/backup")
    }

    /// Create a backup job. The scheduler runs it in the background; the
    /// returned [`Task`] observes that run.
    pub fn create_backup(&self, options: &BackupOptions) -> Result<Task, ApiError> {
        let upid: Upid = self.client.post("/cluster/backup", options)?;
        Ok(Task::new(upid, Arc::clone(&self.client)))
    }

    /// Update an existing backup job.
    pub fn update_backup(&self, id: &str, options: &BackupOptions) -> Result<Task, ApiError> {
        let upid: Upid = self.client.put(&format!("/cluster/backup/{id}"), options)?;
        Ok(Task::new(upid, Arc::clone(&self.client)))
    }

    /// Delete a backup schedule.
    pub fn delete_backup_schedule(&self, id: &str) -> Result<Task, ApiError> {
        let upid: Upid = self.client.delete(&format!("/cluster/backup/{id}"))?;
        Ok(Task::new(upid, Arc::clone(&self.client)))
    }
}
