//! Mock cluster implementation
//!
//! Routes [`ApiRequest`]s to canned, scriptable responses the way the
//! real management API would answer them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use virtlink_api::cluster::{BackupSchedule, ClusterResource, ClusterStatusEntry};
use virtlink_api::task::{
    TaskListEntry, TaskLogLine, TaskStatusRecord, TASK_RUNNING, TASK_STOPPED,
};
use virtlink_api::Upid;

use crate::client::transport::{ApiRequest, Method, RawResponse, TransportError};

use super::failure::{FailureConfig, FailureInjector, FailureOutcome};

/// Exit status the mock reports for tasks stopped through the API.
const EXIT_STATUS_INTERRUPTED: &str = "interrupted by signal";

/// One scripted task known to the mock cluster.
#[derive(Debug, Clone)]
pub struct MockTask {
    pub upid: String,
    /// Status records returned poll by poll; the last repeats forever.
    pub progression: Vec<TaskStatusRecord>,
    /// Polls of the status endpoint observed so far.
    pub polls: u32,
    pub log: Vec<TaskLogLine>,
    /// Set by DELETE on the task path.
    pub stopped: bool,
}

#[derive(Debug)]
struct MockState {
    tasks: HashMap<String, MockTask>,
    status_entries: Vec<ClusterStatusEntry>,
    resources: Vec<ClusterResource>,
    backups: Vec<BackupSchedule>,
    next_id: u64,
    minted: u32,
    last_headers: Vec<(String, String)>,
}

impl MockState {
    fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            status_entries: default_status_entries(),
            resources: Vec::new(),
            backups: Vec::new(),
            next_id: 100,
            minted: 0,
            last_headers: Vec::new(),
        }
    }
}

fn default_status_entries() -> Vec<ClusterStatusEntry> {
    vec![
        ClusterStatusEntry {
            id: "cluster".to_string(),
            kind: "cluster".to_string(),
            name: "lab".to_string(),
            quorate: Some(1),
            nodes: Some(1),
            online: None,
            local: None,
            ip: None,
            level: None,
        },
        ClusterStatusEntry {
            id: "node/node1".to_string(),
            kind: "node".to_string(),
            name: "node1".to_string(),
            quorate: None,
            nodes: None,
            online: Some(1),
            local: Some(1),
            ip: Some("10.0.0.1".to_string()),
            level: None,
        },
    ]
}

/// Configurable mock cluster for testing.
#[derive(Clone)]
pub struct MockCluster {
    state: Arc<Mutex<MockState>>,
    failures: Arc<Mutex<FailureInjector>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
            failures: Arc::new(Mutex::new(FailureInjector::new())),
        }
    }

    // === Public API for test configuration ===

    /// Register a task with an explicit status progression.
    pub fn add_task(&self, upid: &str, progression: Vec<TaskStatusRecord>) {
        let mut state = self.state.lock().unwrap();
        state.tasks.insert(
            upid.to_string(),
            MockTask {
                upid: upid.to_string(),
                progression,
                polls: 0,
                log: Vec::new(),
                stopped: false,
            },
        );
    }

    /// Register a task that reports running `running_polls` times, then
    /// stopped with exit status `OK`.
    pub fn add_running_then_ok(&self, upid: &str, running_polls: u32) {
        let mut progression = Vec::new();
        for _ in 0..running_polls {
            progression.push(self.running_record(upid));
        }
        progression.push(self.stopped_record(upid, Some("OK")));
        self.add_task(upid, progression);
    }

    /// Register a task that is already stopped with the given exit status.
    pub fn add_failed_task(&self, upid: &str, exit_status: &str) {
        let record = self.stopped_record(upid, Some(exit_status));
        self.add_task(upid, vec![record]);
    }

    /// Canned log lines for a task's log endpoint. Creates the task as
    /// running-forever if it is not registered yet.
    pub fn set_task_log(&self, upid: &str, lines: Vec<String>) {
        let log = lines
            .into_iter()
            .enumerate()
            .map(|(i, t)| TaskLogLine { n: i as u64 + 1, t })
            .collect();
        let mut state = self.state.lock().unwrap();
        if let Some(task) = state.tasks.get_mut(upid) {
            task.log = log;
        } else {
            let record = self.build_record(upid, TASK_RUNNING, None);
            state.tasks.insert(
                upid.to_string(),
                MockTask {
                    upid: upid.to_string(),
                    progression: vec![record],
                    polls: 0,
                    log,
                    stopped: false,
                },
            );
        }
    }

    /// How many times the status endpoint was polled for `upid`.
    pub fn poll_count(&self, upid: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .tasks
            .get(upid)
            .map(|t| t.polls)
            .unwrap_or(0)
    }

    /// Whether DELETE was issued on the task path.
    pub fn was_stopped(&self, upid: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .tasks
            .get(upid)
            .map(|t| t.stopped)
            .unwrap_or(false)
    }

    /// Headers of the most recent request, for auth assertions.
    pub fn last_request_headers(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().last_headers.clone()
    }

    /// Fail requests whose path starts with `prefix`.
    pub fn inject_failure(&self, prefix: &str, config: FailureConfig) {
        self.failures.lock().unwrap().inject(prefix, config);
    }

    /// Clear all failure injections.
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn set_status_entries(&self, entries: Vec<ClusterStatusEntry>) {
        self.state.lock().unwrap().status_entries = entries;
    }

    pub fn add_resource(&self, resource: ClusterResource) {
        self.state.lock().unwrap().resources.push(resource);
    }

    pub fn set_next_id(&self, next_id: u64) {
        self.state.lock().unwrap().next_id = next_id;
    }

    pub fn add_backup_schedule(&self, schedule: BackupSchedule) {
        self.state.lock().unwrap().backups.push(schedule);
    }

    /// A running status record for `upid`.
    pub fn running_record(&self, upid: &str) -> TaskStatusRecord {
        self.build_record(upid, TASK_RUNNING, None)
    }

    /// A stopped status record; `None` exit status models the transient
    /// window before the scheduler records the verdict.
    pub fn stopped_record(&self, upid: &str, exit_status: Option<&str>) -> TaskStatusRecord {
        self.build_record(upid, TASK_STOPPED, exit_status.map(str::to_string))
    }

    fn build_record(
        &self,
        upid: &str,
        status: &str,
        exitstatus: Option<String>,
    ) -> TaskStatusRecord {
        let parsed = Upid::parse(upid).ok();
        TaskStatusRecord {
            node: parsed.as_ref().map(|u| u.node.clone()).unwrap_or_else(|| "node1".to_string()),
            upid: upid.to_string(),
            task_type: parsed
                .as_ref()
                .map(|u| u.task_type.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            user: parsed
                .as_ref()
                .map(|u| u.user.clone())
                .unwrap_or_else(|| "root@pam".to_string()),
            status: status.to_string(),
            exitstatus,
            id: parsed.as_ref().map(|u| u.task_id.clone()).filter(|s| !s.is_empty()),
            pid: parsed.as_ref().map(|u| u.pid),
            pstart: parsed.as_ref().map(|u| u.pstart),
            starttime: parsed.as_ref().map(|u| u.starttime),
        }
    }

    /// Mint a fresh, valid UPID owned by this mock cluster.
    pub fn mint_upid(&self, node: &str, task_type: &str, id: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.minted += 1;
        let starttime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        format!(
            "UPID:{node}:{:08X}:{:08X}:{starttime:08X}:{task_type}:{id}:root@pam:",
            0x1000 + state.minted,
            0x10 + state.minted,
        )
    }

    // === Request handling ===

    /// Handle one request the way the management API would. Returns
    /// `Err(TransportError)` only for injected transport outages.
    pub fn handle_request(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.state.lock().unwrap().last_headers = request.headers.clone();

        if let Some(outcome) = self.failures.lock().unwrap().take(request.route()) {
            return match outcome {
                FailureOutcome::Transport(err) => Err(err),
                FailureOutcome::Http { status, message } => Ok(error_response(status, &message)),
            };
        }

        let route = request.route().trim_matches('/').to_string();
        let segments: Vec<&str> = route.split('/').collect();

        let response = match (request.method, segments.as_slice()) {
            (Method::Post, ["access", "ticket"]) => self.handle_ticket(request),
            (Method::Get, ["access", "permissions"]) => self.handle_permissions(request),
            (Method::Get, ["access", "domains"]) => self.handle_domains(),
            (Method::Get, ["access", "domains", realm]) => self.handle_domain(realm),
            (Method::Put, ["access", "password"]) => data_response(Value::Null),
            (Method::Get, ["cluster", "status"]) => self.handle_cluster_status(),
            (Method::Get, ["cluster", "nextid"]) => self.handle_next_id(),
            (Method::Get, ["cluster", "resources"]) => self.handle_resources(request),
            (Method::Get, ["cluster", "tasks"]) => self.handle_task_listing(None),
            (Method::Get, ["cluster", "backup"]) => self.handle_backup_listing(),
            (Method::Post, ["cluster", "backup"]) => self.handle_backup_create(request),
            (Method::Put, ["cluster", "backup", id]) => self.handle_backup_update(id),
            (Method::Delete, ["cluster", "backup", id]) => self.handle_backup_delete(id),
            (Method::Get, ["nodes", node, "tasks"]) => self.handle_task_listing(Some(*node)),
            (Method::Get, ["nodes", _, "tasks", upid, "status"]) => self.handle_task_status(upid),
            (Method::Get, ["nodes", _, "tasks", upid, "log"]) => self.handle_task_log(upid, request),
            (Method::Delete, ["nodes", _, "tasks", upid]) => self.handle_task_stop(upid),
            _ => error_response(
                501,
                &format!("no handler for {} /{route}", request.method),
            ),
        };

        Ok(response)
    }

    fn handle_ticket(&self, request: &ApiRequest) -> RawResponse {
        let body = request.body.clone().unwrap_or(Value::Null);
        let username = body
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let password = body
            .get("password")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if username.is_empty() || password.is_empty() {
            return error_response(401, "authentication failure");
        }
        let cluster_name = self
            .state
            .lock()
            .unwrap()
            .status_entries
            .iter()
            .find(|e| e.kind == "cluster")
            .map(|e| e.name.clone());
        data_response(json!({
            "username": username,
            "ticket": format!("VL:{username}:65D4B1C3::mocksig"),
            "CSRFPreventionToken": "65D4B1C3:mocktoken",
            "clustername": cluster_name,
        }))
    }

    fn handle_permissions(&self, request: &ApiRequest) -> RawResponse {
        let path = query_param(request, "path");
        let user_id = query_param(request, "userid");
        if path.is_some() || user_id.is_some() {
            let key = path.unwrap_or_else(|| "path".to_string());
            let mut scoped = serde_json::Map::new();
            scoped.insert(key, json!({"permission": 1}));
            return data_response(Value::Object(scoped));
        }
        data_response(json!({
            "/": {"Datastore.Allocate": 1, "Sys.Audit": 1, "VM.Allocate": 1},
            "/vms": {"VM.Audit": 1},
        }))
    }

    fn handle_domains(&self) -> RawResponse {
        data_response(json!([
            {"realm": "pam", "type": "pam", "comment": "Linux PAM"},
            {"realm": "vl", "type": "builtin", "comment": "Cluster auth server"},
            {"realm": "ldap-main", "type": "ldap"},
        ]))
    }

    fn handle_domain(&self, realm: &str) -> RawResponse {
        match realm {
            "pam" => data_response(json!({"type": "pam", "comment": "Linux PAM"})),
            "vl" => data_response(json!({"type": "builtin", "autocreate": 0})),
            "ldap-main" => data_response(json!({"type": "ldap", "autocreate": 0})),
            other => error_response(500, &format!("domain '{other}' does not exist")),
        }
    }

    fn handle_cluster_status(&self) -> RawResponse {
        let state = self.state.lock().unwrap();
        data_response(json!(state.status_entries))
    }

    fn handle_next_id(&self) -> RawResponse {
        let state = self.state.lock().unwrap();
        // the API answers with a string, not a number
        data_response(json!(state.next_id.to_string()))
    }

    fn handle_resources(&self, request: &ApiRequest) -> RawResponse {
        let state = self.state.lock().unwrap();
        let rows: Vec<&ClusterResource> = match query_param(request, "type").as_deref() {
            Some("vm") => state
                .resources
                .iter()
                .filter(|r| r.kind == "qemu" || r.kind == "lxc")
                .collect(),
            Some(kind) => state.resources.iter().filter(|r| r.kind == kind).collect(),
            None => state.resources.iter().collect(),
        };
        data_response(json!(rows))
    }

    fn handle_task_listing(&self, node: Option<&str>) -> RawResponse {
        let state = self.state.lock().unwrap();
        let rows: Vec<TaskListEntry> = state
            .tasks
            .values()
            .filter_map(|task| {
                let record = current_record(task)?;
                if node.is_some_and(|n| n != record.node) {
                    return None;
                }
                Some(TaskListEntry {
                    upid: task.upid.clone(),
                    node: record.node.clone(),
                    task_type: record.task_type.clone(),
                    user: record.user.clone(),
                    status: record.exitstatus.clone(),
                    starttime: record.starttime,
                    endtime: record
                        .exitstatus
                        .as_ref()
                        .and_then(|_| record.starttime.map(|t| t + 1)),
                    id: record.id.clone(),
                })
            })
            .collect();
        data_response(json!(rows))
    }

    fn handle_backup_listing(&self) -> RawResponse {
        let state = self.state.lock().unwrap();
        data_response(json!(state.backups))
    }

    fn handle_backup_create(&self, request: &ApiRequest) -> RawResponse {
        let body = request.body.clone().unwrap_or(json!({}));
        let id = {
            let mut state = self.state.lock().unwrap();
            let id = format!("backup-{}", state.backups.len() + 1);
            state.backups.push(BackupSchedule {
                id: id.clone(),
                enabled: Some(1),
                schedule: body.get("schedule").and_then(Value::as_str).map(String::from),
                storage: body.get("storage").and_then(Value::as_str).map(String::from),
                vmid: body.get("vmid").and_then(Value::as_str).map(String::from),
                all: body.get("all").and_then(Value::as_u64).map(|v| v as u8),
                mode: body.get("mode").and_then(Value::as_str).map(String::from),
                compress: body.get("compress").and_then(Value::as_str).map(String::from),
                comment: body.get("comment").and_then(Value::as_str).map(String::from),
            });
            id
        };
        self.mint_backup_task(&id)
    }

    fn handle_backup_update(&self, id: &str) -> RawResponse {
        let known = self
            .state
            .lock()
            .unwrap()
            .backups
            .iter()
            .any(|b| b.id == id);
        if !known {
            return error_response(500, &format!("backup job '{id}' does not exist"));
        }
        self.mint_backup_task(id)
    }

    fn handle_backup_delete(&self, id: &str) -> RawResponse {
        let removed = {
            let mut state = self.state.lock().unwrap();
            let before = state.backups.len();
            state.backups.retain(|b| b.id != id);
            state.backups.len() != before
        };
        if !removed {
            return error_response(500, &format!("backup job '{id}' does not exist"));
        }
        self.mint_backup_task(id)
    }

    /// Backup writes answer with the UPID of a scheduler task; register a
    /// short-lived one so callers can wait on it.
    fn mint_backup_task(&self, id: &str) -> RawResponse {
        let node = self
            .state
            .lock()
            .unwrap()
            .status_entries
            .iter()
            .find(|e| e.kind == "node")
            .map(|e| e.name.clone())
            .unwrap_or_else(|| "node1".to_string());
        let upid = self.mint_upid(&node, "vzdump", id);
        self.add_running_then_ok(&upid, 1);
        data_response(json!(upid))
    }

    fn handle_task_status(&self, upid: &str) -> RawResponse {
        let mut state = self.state.lock().unwrap();
        let Some(task) = state.tasks.get_mut(upid) else {
            return error_response(500, &format!("no such task '{upid}'"));
        };
        let record = if task.stopped {
            let mut record = task
                .progression
                .last()
                .cloned()
                .unwrap_or_else(|| fallback_record(upid));
            record.status = TASK_STOPPED.to_string();
            record.exitstatus = Some(EXIT_STATUS_INTERRUPTED.to_string());
            record
        } else {
            let index = (task.polls as usize).min(task.progression.len().saturating_sub(1));
            task.polls += 1;
            task.progression
                .get(index)
                .cloned()
                .unwrap_or_else(|| fallback_record(upid))
        };
        data_response(json!(record))
    }

    fn handle_task_log(&self, upid: &str, request: &ApiRequest) -> RawResponse {
        let start = query_param(request, "start")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let limit = query_param(request, "limit")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(50);

        let state = self.state.lock().unwrap();
        let Some(task) = state.tasks.get(upid) else {
            return error_response(500, &format!("no such task '{upid}'"));
        };
        let lines: Vec<&TaskLogLine> = task.log.iter().skip(start).take(limit).collect();
        data_response(json!(lines))
    }

    fn handle_task_stop(&self, upid: &str) -> RawResponse {
        let mut state = self.state.lock().unwrap();
        let Some(task) = state.tasks.get_mut(upid) else {
            return error_response(500, &format!("no such task '{upid}'"));
        };
        task.stopped = true;
        data_response(Value::Null)
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// The record a task listing should show right now: the last progression
/// step already served, or the first one for tasks never polled.
fn current_record(task: &MockTask) -> Option<&TaskStatusRecord> {
    if task.progression.is_empty() {
        return None;
    }
    let index = (task.polls as usize)
        .saturating_sub(1)
        .min(task.progression.len() - 1);
    task.progression.get(index)
}

fn fallback_record(upid: &str) -> TaskStatusRecord {
    TaskStatusRecord {
        node: "node1".to_string(),
        upid: upid.to_string(),
        task_type: "unknown".to_string(),
        user: "root@pam".to_string(),
        status: TASK_RUNNING.to_string(),
        exitstatus: None,
        id: None,
        pid: None,
        pstart: None,
        starttime: None,
    }
}

fn data_response(data: Value) -> RawResponse {
    RawResponse::ok(json!({ "data": data }))
}

fn error_response(status: u16, message: &str) -> RawResponse {
    RawResponse {
        status,
        body: json!({ "message": message, "data": null }),
    }
}

fn query_param(request: &ApiRequest, name: &str) -> Option<String> {
    request.query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}
