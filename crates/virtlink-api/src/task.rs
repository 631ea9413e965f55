//! Task endpoint records
//!
//! Wire shapes for `/nodes/{node}/tasks/...` and `/cluster/tasks`.

use serde::{Deserialize, Serialize};

/// Status string the API reports while a task is executing.
pub const TASK_RUNNING: &str = "running";

/// Status string the API reports once a task has stopped.
pub const TASK_STOPPED: &str = "stopped";

/// Body of `GET /nodes/{node}/tasks/{upid}/status`.
///
/// `exitstatus` appears only once the scheduler has recorded completion;
/// a `stopped` status with no exit status yet is a transient read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusRecord {
    pub node: String,
    pub upid: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub user: String,
    /// `running` or `stopped`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exitstatus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pstart: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starttime: Option<i64>,
}

impl TaskStatusRecord {
    pub fn is_running(&self) -> bool {
        self.status == TASK_RUNNING
    }
}

/// One row of a node or cluster task listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListEntry {
    pub upid: String,
    pub node: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub user: String,
    /// Present once the task has finished; raw exit-status text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starttime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endtime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl TaskListEntry {
    /// Listing rows omit `endtime` while the task is still executing.
    pub fn is_finished(&self) -> bool {
        self.endtime.is_some()
    }
}

/// One line of `GET /nodes/{node}/tasks/{upid}/log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogLine {
    /// 1-based line number.
    pub n: u64,
    /// Line text.
    pub t: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_record_running() {
        let record: TaskStatusRecord = serde_json::from_str(
            r#"{
                "node": "node1",
                "upid": "UPID:node1:000A5C1F:0004F2A0:65D4B1C3:vmcreate:103:root@pam:",
                "type": "vmcreate",
                "user": "root@pam",
                "status": "running",
                "pid": 679967
            }"#,
        )
        .unwrap();
        assert!(record.is_running());
        assert!(record.exitstatus.is_none());
    }

    #[test]
    fn test_status_record_stopped_with_exit() {
        let record: TaskStatusRecord = serde_json::from_str(
            r#"{
                "node": "node1",
                "upid": "UPID:node1:000A5C1F:0004F2A0:65D4B1C3:vmcreate:103:root@pam:",
                "type": "vmcreate",
                "user": "root@pam",
                "status": "stopped",
                "exitstatus": "OK"
            }"#,
        )
        .unwrap();
        assert!(!record.is_running());
        assert_eq!(record.exitstatus.as_deref(), Some("OK"));
    }

    #[test]
    fn test_list_entry_finished() {
        let row: TaskListEntry = serde_json::from_str(
            r#"{
                "upid": "UPID:node1:000A5C1F:0004F2A0:65D4B1C3:vzdump:103:root@pam:",
                "node": "node1",
                "type": "vzdump",
                "user": "root@pam",
                "status": "OK",
                "starttime": 1708436931,
                "endtime": 1708437001
            }"#,
        )
        .unwrap();
        assert!(row.is_finished());
    }

    #[test]
    fn test_log_line_shape() {
        let lines: Vec<TaskLogLine> =
            serde_json::from_str(r#"[{"n": 1, "t": "starting task"}, {"n": 2, "t": "TASK OK"}]"#)
                .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].t, "TASK OK");
    }
}
