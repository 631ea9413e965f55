//! Task wait loop tests
//!
//! Drives `Task::wait` against the in-process mock cluster: poll
//! counting, remote failure reporting, deadlines, cancellation and
//! transient-error tolerance.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use virtlink::mock::FailureConfig;
use virtlink::{
    ApiClient, CancelToken, MockTransport, PollerConfig, Task, Transport, Upid, WaitError,
};

const UPID: &str = "UPID:node1:000A5C1F:0004F2A0:65D4B1C3:vmcreate:103:root@pam:";

fn setup() -> (Arc<MockTransport>, Arc<ApiClient>) {
    let transport = Arc::new(MockTransport::new());
    let client = Arc::new(ApiClient::new(transport.clone() as Arc<dyn Transport>));
    (transport, client)
}

fn task(client: &Arc<ApiClient>) -> Task {
    Task::new(Upid::parse(UPID).unwrap(), Arc::clone(client))
}

fn status_path() -> String {
    format!("/nodes/node1/tasks/{UPID}/status")
}

// =============================================================================
// Completion
// =============================================================================

#[test]
fn test_wait_completes_after_exact_poll_count() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(UPID, 2);

    let mut task = task(&client);
    let cancel = CancelToken::new();
    task.wait(&cancel, Duration::from_millis(10), None).unwrap();

    assert!(task.is_successful());
    assert!(!task.is_running());
    // running, running, stopped/OK: exactly 3 status reads
    assert_eq!(transport.cluster().poll_count(UPID), 3);
}

#[test]
fn test_wait_on_already_terminal_task_makes_no_remote_call() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(UPID, 0);

    let mut task = task(&client);
    task.status().unwrap();
    assert!(task.is_successful());
    let polls = transport.cluster().poll_count(UPID);

    let cancel = CancelToken::new();
    task.wait(&cancel, Duration::from_millis(10), None).unwrap();
    assert_eq!(transport.cluster().poll_count(UPID), polls);
}

#[test]
fn test_wait_for_uses_default_interval() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(UPID, 0);

    let mut task = task(&client);
    let cancel = CancelToken::new();
    // first poll is immediate, so a terminal-on-first-poll task returns
    // well before the 1s default interval matters
    let started = Instant::now();
    task.wait_for(&cancel, Some(Duration::from_secs(5))).unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(task.is_successful());
}

// =============================================================================
// Remote failure
// =============================================================================

#[test]
fn test_wait_reports_remote_failure_text() {
    let (transport, client) = setup();
    transport
        .cluster()
        .add_failed_task(UPID, "job errored: disk full");

    let mut task = task(&client);
    let cancel = CancelToken::new();
    let error = task
        .wait(&cancel, Duration::from_millis(10), None)
        .unwrap_err();

    match &error {
        WaitError::TaskFailed { exit_status } => {
            assert_eq!(exit_status, "job errored: disk full")
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert!(error.to_string().contains("job errored: disk full"));
    assert!(task.is_failed());
    assert!(!task.is_successful());
}

#[test]
fn test_failed_verdict_does_not_regress() {
    let (transport, client) = setup();
    transport.cluster().add_failed_task(UPID, "unable to acquire lock");

    let mut task = task(&client);
    let cancel = CancelToken::new();
    let _ = task.wait(&cancel, Duration::from_millis(10), None);
    assert!(task.is_failed());

    // another wait observes the cached verdict, unchanged
    let error = task
        .wait(&cancel, Duration::from_millis(10), None)
        .unwrap_err();
    assert!(matches!(error, WaitError::TaskFailed { .. }));
    assert!(task.is_failed());
}

// =============================================================================
// Deadline
// =============================================================================

#[test]
fn test_wait_deadline_with_bounded_overshoot() {
    let (transport, client) = setup();
    // running forever
    transport.cluster().add_task(
        UPID,
        vec![transport.cluster().running_record(UPID)],
    );

    let mut task = task(&client);
    let cancel = CancelToken::new();
    let started = Instant::now();
    let error = task
        .wait(
            &cancel,
            Duration::from_millis(10),
            Some(Duration::from_millis(50)),
        )
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(error, WaitError::DeadlineExceeded { .. }));
    assert!(elapsed >= Duration::from_millis(50), "returned early: {elapsed:?}");
    // overshoot is bounded by one poll interval (plus scheduling slack)
    assert!(elapsed < Duration::from_millis(90), "returned late: {elapsed:?}");
    // the remote task was not touched beyond status reads
    assert!(!transport.cluster().was_stopped(UPID));
}

#[test]
fn test_zero_timeout_means_indefinite() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(UPID, 3);

    let mut task = task(&client);
    let cancel = CancelToken::new();
    // Duration::ZERO is "no budget", not "give up immediately"
    task.wait(&cancel, Duration::from_millis(10), Some(Duration::ZERO))
        .unwrap();
    assert!(task.is_successful());
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn test_cancel_mid_wait_returns_within_one_interval() {
    let (transport, client) = setup();
    transport.cluster().add_task(
        UPID,
        vec![transport.cluster().running_record(UPID)],
    );

    let mut task = task(&client);
    let cancel = CancelToken::new();

    let canceller = cancel.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(35));
        canceller.cancel();
    });

    let started = Instant::now();
    let error = task
        .wait(&cancel, Duration::from_millis(20), None)
        .unwrap_err();
    let elapsed = started.elapsed();
    handle.join().unwrap();

    assert!(matches!(error, WaitError::Cancelled));
    // not before the signal fired, not a full extra interval after it
    assert!(elapsed >= Duration::from_millis(35), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(80), "returned late: {elapsed:?}");
    assert!(!transport.cluster().was_stopped(UPID));
}

#[test]
fn test_pre_cancelled_wait_skips_remote_call() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(UPID, 5);

    let mut task = task(&client);
    let cancel = CancelToken::new();
    cancel.cancel();

    let error = task
        .wait(&cancel, Duration::from_millis(10), None)
        .unwrap_err();
    assert!(matches!(error, WaitError::Cancelled));
    assert_eq!(transport.cluster().poll_count(UPID), 0);
}

// =============================================================================
// Transport error policy
// =============================================================================

#[test]
fn test_transient_errors_within_bound_are_tolerated() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(UPID, 1);
    transport
        .cluster()
        .inject_failure(&status_path(), FailureConfig::transient(2));

    let mut task = task(&client);
    let cancel = CancelToken::new();
    task.wait_with(
        &cancel,
        PollerConfig {
            interval: Duration::from_millis(10),
            timeout: Some(Duration::from_secs(5)),
            max_transient_errors: 2,
        },
    )
    .unwrap();
    assert!(task.is_successful());
}

#[test]
fn test_transient_errors_beyond_bound_escalate() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(UPID, 1);
    transport
        .cluster()
        .inject_failure(&status_path(), FailureConfig::transient(3));

    let mut task = task(&client);
    let cancel = CancelToken::new();
    let error = task
        .wait_with(
            &cancel,
            PollerConfig {
                interval: Duration::from_millis(10),
                timeout: Some(Duration::from_secs(5)),
                max_transient_errors: 2,
            },
        )
        .unwrap_err();

    match error {
        WaitError::TransportExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected TransportExhausted, got {other:?}"),
    }
}

#[test]
fn test_successful_poll_resets_transient_counter() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(UPID, 4);

    let mut task = task(&client);
    let cancel = CancelToken::new();
    let config = PollerConfig {
        interval: Duration::from_millis(10),
        timeout: Some(Duration::from_secs(5)),
        max_transient_errors: 2,
    };

    // 2 failures, a success, then 2 more failures: never 3 consecutive
    transport
        .cluster()
        .inject_failure(&status_path(), FailureConfig::transient(2));

    let injector_transport = transport.clone();
    let injector = thread::spawn(move || {
        // after the first successful polls, re-inject two more failures
        thread::sleep(Duration::from_millis(45));
        injector_transport
            .cluster()
            .inject_failure(&status_path(), FailureConfig::transient(2));
    });

    task.wait_with(&cancel, config).unwrap();
    injector.join().unwrap();
    assert!(task.is_successful());
}

#[test]
fn test_not_authorized_aborts_wait_immediately() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(UPID, 5);
    transport
        .cluster()
        .inject_failure(&status_path(), FailureConfig::not_authorized());

    let mut task = task(&client);
    let cancel = CancelToken::new();
    let started = Instant::now();
    let error = task
        .wait(&cancel, Duration::from_millis(50), None)
        .unwrap_err();

    match &error {
        WaitError::Api(api) => assert!(api.is_not_authorized()),
        other => panic!("expected Api(NotAuthorized), got {other:?}"),
    }
    // no retries, no sleeps: the wait aborted on the first poll
    assert!(started.elapsed() < Duration::from_millis(40));
}

#[test]
fn test_malformed_response_aborts_wait() {
    let (transport, client) = setup();
    transport.cluster().add_running_then_ok(UPID, 5);
    transport
        .cluster()
        .inject_failure(&status_path(), FailureConfig::http(500, "internal error"));

    let mut task = task(&client);
    let cancel = CancelToken::new();
    let error = task
        .wait(&cancel, Duration::from_millis(10), None)
        .unwrap_err();
    assert!(matches!(error, WaitError::Api(_)));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_independent_tasks_wait_concurrently() {
    let (transport, client) = setup();
    let upids: Vec<String> = (0..4)
        .map(|i| format!("UPID:node1:0000100{i}:00000010:65D4B1C3:vmcreate:10{i}:root@pam:"))
        .collect();
    for upid in &upids {
        transport.cluster().add_running_then_ok(upid, 2);
    }

    let handles: Vec<_> = upids
        .iter()
        .map(|upid| {
            let mut task = Task::new(Upid::parse(upid).unwrap(), Arc::clone(&client));
            thread::spawn(move || {
                let cancel = CancelToken::new();
                task.wait(&cancel, Duration::from_millis(10), Some(Duration::from_secs(5)))
                    .map(|()| task.is_successful())
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().unwrap());
    }
}
