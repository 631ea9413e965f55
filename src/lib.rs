//! Virtlink - client for the virtlink cluster management API
//!
//! This crate implements a synchronous client for a hypervisor cluster's
//! management API. Write operations (create/delete/backup/...) are
//! accepted by the cluster immediately and executed in the background;
//! the API answers with an opaque job identifier (UPID) which this client
//! wraps in a [`Task`]: an observable, awaitable handle with polling,
//! blocking wait, timeout and cooperative cancellation.

pub mod access;
pub mod client;
pub mod cluster;
pub mod config;
pub mod mock;
pub mod node;
pub mod signal;
pub mod task;

pub use client::transport::{
    ApiRequest, HttpConfig, HttpTransport, Method, MockTransport, RawResponse, Transport,
    TransportError,
};
pub use client::{ApiClient, ApiError};
pub use cluster::Cluster;
pub use config::{ClientConfig, ConfigError};
pub use node::Node;
pub use signal::{CancelToken, SignalHandler};
pub use task::{PollState, PollerConfig, Task, TaskStatus, WaitError, DEFAULT_POLL_INTERVAL};
pub use virtlink_api::{Upid, UpidParseError, EXIT_STATUS_OK};
