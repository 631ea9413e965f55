//! End-to-end flows against the mock cluster
//!
//! Exercises the full path a caller takes: log in, obtain a cluster
//! handle, fire a background operation, wait on the returned task, and
//! read its log.

use std::sync::Arc;
use std::time::Duration;

use virtlink::access::Credentials;
use virtlink::mock::FailureConfig;
use virtlink::{ApiClient, CancelToken, Cluster, MockTransport, Node, Transport};
use virtlink_api::cluster::BackupOptions;

fn setup() -> (Arc<MockTransport>, Arc<ApiClient>) {
    let transport = Arc::new(MockTransport::new());
    let client = Arc::new(ApiClient::new(transport.clone() as Arc<dyn Transport>));
    (transport, client)
}

#[test]
fn test_login_then_backup_then_wait() {
    let (transport, client) = setup();

    let session = client
        .ticket(&Credentials::new("root@pam", "1234"))
        .unwrap();
    assert_eq!(session.cluster_name.as_deref(), Some("lab"));

    let cluster = Cluster::connect(&client).unwrap();
    let mut task = cluster
        .create_backup(&BackupOptions {
            storage: Some("tank".to_string()),
            all: Some(1),
            ..BackupOptions::default()
        })
        .unwrap();

    let cancel = CancelToken::new();
    task.wait(&cancel, Duration::from_millis(10), Some(Duration::from_secs(5)))
        .unwrap();
    assert!(task.is_successful());

    // the backup write carried the session's CSRF token
    let headers = transport.cluster().last_request_headers();
    assert!(headers.iter().any(|(name, _)| name == "Cookie"));

    transport.cluster().set_task_log(
        &task.upid().to_string(),
        vec!["creating archive".to_string(), "TASK OK".to_string()],
    );
    let lines = task.log(0, 50).unwrap();
    assert_eq!(lines.last().unwrap().t, "TASK OK");
}

#[test]
fn test_listing_then_reattach_to_task() {
    let (transport, client) = setup();
    let upid = "UPID:node1:000A5C1F:0004F2A0:65D4B1C3:vmcreate:103:root@pam:";
    transport.cluster().add_running_then_ok(upid, 1);

    // discover the task through the node listing, then track it
    let node = Node::new(&client, "node1");
    let rows = node.tasks().unwrap();
    assert_eq!(rows.len(), 1);

    let mut task = node.task(&rows[0].upid).unwrap();
    let cancel = CancelToken::new();
    task.wait(&cancel, Duration::from_millis(10), Some(Duration::from_secs(5)))
        .unwrap();
    assert!(task.is_successful());
}

#[test]
fn test_best_effort_cluster_read_with_partial_access() {
    let (transport, client) = setup();
    transport
        .cluster()
        .inject_failure("/cluster/status", FailureConfig::not_authorized());
    transport.cluster().add_running_then_ok(
        "UPID:node1:000A5C1F:0004F2A0:65D4B1C3:vzdump:103:root@pam:",
        0,
    );

    // no audit privilege: the handle comes back unpopulated but the task
    // listing still works
    let cluster = Cluster::connect(&client).unwrap();
    assert!(cluster.name.is_none());
    assert_eq!(cluster.tasks().unwrap().len(), 1);
}

#[test]
fn test_wait_on_listed_cluster_task() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(
        "UPID:node1:000A5C1F:0004F2A0:65D4B1C3:vmstop:104:root@pam:",
        2,
    );

    let cluster = Cluster::connect(&client).unwrap();
    let mut tasks = cluster.tasks().unwrap();
    assert_eq!(tasks.len(), 1);

    let task = &mut tasks[0];
    let cancel = CancelToken::new();
    task.wait(&cancel, Duration::from_millis(10), Some(Duration::from_secs(5)))
        .unwrap();
    assert!(task.is_successful());
}
