//! Virtlink CLI
//!
//! Entry point for the `virtlink` command-line tool.
//!
//! Exit codes: 0 success, 1 general failure, 3 remote task failed,
//! 124 wait deadline exceeded, 130 wait interrupted.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use virtlink::{
    access::Credentials, ApiClient, ClientConfig, Cluster, HttpTransport, SignalHandler, Task,
    Transport, Upid, WaitError,
};
use virtlink_api::cluster::ResourceKind;

#[derive(Parser)]
#[command(name = "virtlink")]
#[command(about = "Client for the virtlink cluster management API", version)]
struct Cli {
    /// Path to config file (default: ~/.config/virtlink/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with the configured credentials and print the session
    Login,

    /// Task tracking commands
    Task {
        #[command(subcommand)]
        action: TaskCommands,
    },

    /// Cluster-level commands
    Cluster {
        #[command(subcommand)]
        action: ClusterCommands,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Poll a task's status once
    Status {
        /// Task identifier (UPID)
        upid: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Block until a task reaches a terminal state
    Wait {
        /// Task identifier (UPID)
        upid: String,

        /// Poll interval in milliseconds (default: from config)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Give up after this many seconds; 0 waits indefinitely
        #[arg(long)]
        timeout_seconds: Option<u64>,
    },

    /// Print a window of the task log
    Log {
        /// Task identifier (UPID)
        upid: String,

        /// First line to fetch (0-based)
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Maximum lines to fetch
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },

    /// Ask the owning node to stop a task
    Stop {
        /// Task identifier (UPID)
        upid: String,
    },
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Show cluster name, quorum and member nodes
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List cluster resources
    Resources {
        /// Filter by kind: vm, storage, node or sdn
        #[arg(long)]
        kind: Option<ResourceKind>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List recent and in-flight tasks across the cluster
    Tasks,

    /// Print the lowest free guest id
    NextId,
}

const EXIT_TASK_FAILED: i32 = 3;
const EXIT_DEADLINE: i32 = 124;
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(message) => {
            eprintln!("error: {message}");
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32, String> {
    let config = ClientConfig::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    let client = build_client(&config)?;

    match cli.command {
        Commands::Login => {
            let session = login(&client, &config)?;
            println!("logged in as {}", session.username);
            if let Some(cluster_name) = session.cluster_name {
                println!("cluster: {cluster_name}");
            }
            Ok(0)
        }

        Commands::Task { action } => run_task(action, &client, &config),
        Commands::Cluster { action } => run_cluster(action, &client),
    }
}

fn run_task(
    action: TaskCommands,
    client: &Arc<ApiClient>,
    config: &ClientConfig,
) -> Result<i32, String> {
    match action {
        TaskCommands::Status { upid, json } => {
            let mut task = task_for(&upid, client)?;
            task.status().map_err(|e| e.to_string())?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "upid": task.upid().to_string(),
                        "running": task.is_running(),
                        "exitstatus": task.exit_status(),
                    })
                );
            } else if task.is_running() {
                println!("{upid}: running");
            } else {
                println!("{upid}: stopped ({})", task.exit_status().unwrap_or("pending"));
            }
            Ok(0)
        }

        TaskCommands::Wait {
            upid,
            interval_ms,
            timeout_seconds,
        } => {
            let mut task = task_for(&upid, client)?;

            let handler = SignalHandler::new();
            handler.install().map_err(|e| e.to_string())?;
            let cancel = handler.token();

            let mut poller = config.poller_config();
            if let Some(ms) = interval_ms {
                poller.interval = Duration::from_millis(ms.max(1));
            }
            if let Some(seconds) = timeout_seconds {
                poller.timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
            }

            match task.wait_with(&cancel, poller) {
                Ok(()) => {
                    println!("{upid}: OK");
                    Ok(0)
                }
                Err(WaitError::TaskFailed { exit_status }) => {
                    eprintln!("{upid}: failed: {exit_status}");
                    Ok(EXIT_TASK_FAILED)
                }
                Err(WaitError::DeadlineExceeded { waited }) => {
                    eprintln!("{upid}: still running after {waited:?}, giving up");
                    Ok(EXIT_DEADLINE)
                }
                Err(WaitError::Cancelled) => {
                    eprintln!("{upid}: wait interrupted, task keeps running");
                    Ok(EXIT_INTERRUPTED)
                }
                Err(err) => Err(err.to_string()),
            }
        }

        TaskCommands::Log { upid, start, limit } => {
            let mut task = task_for(&upid, client)?;
            let lines = task.log(start, limit).map_err(|e| e.to_string())?;
            for line in lines {
                println!("{:>6}  {}", line.n, line.t);
            }
            Ok(0)
        }

        TaskCommands::Stop { upid } => {
            let task = task_for(&upid, client)?;
            task.stop().map_err(|e| e.to_string())?;
            println!("{upid}: stop requested");
            Ok(0)
        }
    }
}

fn run_cluster(action: ClusterCommands, client: &Arc<ApiClient>) -> Result<i32, String> {
    let cluster = Cluster::connect(client).map_err(|e| e.to_string())?;

    match action {
        ClusterCommands::Status { json } => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "name": cluster.name,
                        "quorate": cluster.quorate,
                        "nodes": cluster.nodes,
                    })
                );
            } else {
                println!(
                    "cluster: {} (quorate: {})",
                    cluster.name.as_deref().unwrap_or("unknown"),
                    match cluster.quorate {
                        Some(true) => "yes",
                        Some(false) => "NO",
                        None => "unknown",
                    }
                );
                for node in &cluster.nodes {
                    println!(
                        "  {} {}",
                        node.name,
                        if node.online == Some(1) { "online" } else { "offline" }
                    );
                }
            }
            Ok(0)
        }

        ClusterCommands::Resources { kind, json } => {
            let resources = cluster.resources(kind).map_err(|e| e.to_string())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resources).map_err(|e| e.to_string())?);
            } else {
                for resource in resources {
                    println!(
                        "{:12} {:8} {}",
                        resource.kind,
                        resource.status.as_deref().unwrap_or("-"),
                        resource.id
                    );
                }
            }
            Ok(0)
        }

        ClusterCommands::Tasks => {
            for task in cluster.tasks().map_err(|e| e.to_string())? {
                println!("{}", task.upid());
            }
            Ok(0)
        }

        ClusterCommands::NextId => {
            println!("{}", cluster.next_id().map_err(|e| e.to_string())?);
            Ok(0)
        }
    }
}

fn task_for(token: &str, client: &Arc<ApiClient>) -> Result<Task, String> {
    let upid = Upid::parse(token).map_err(|e| e.to_string())?;
    Ok(Task::new(upid, Arc::clone(client)))
}

fn build_client(config: &ClientConfig) -> Result<Arc<ApiClient>, String> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.http_config()));
    let client = Arc::new(ApiClient::new(transport));

    if let Some(token) = &config.api_token {
        client.set_token(token.clone());
    } else if config.username.is_some() {
        login(&client, config)?;
    }

    Ok(client)
}

fn login(
    client: &Arc<ApiClient>,
    config: &ClientConfig,
) -> Result<virtlink_api::access::Session, String> {
    let username = config
        .username
        .clone()
        .ok_or("username is not configured")?;
    let password = config
        .password
        .clone()
        .ok_or("password is not configured (set VIRTLINK_PASSWORD)")?;
    client
        .ticket(&Credentials::new(username, password))
        .map_err(|e| e.to_string())
}
