use std::{collections::HashMap, fmt, path::PathBuf};

use async_trait::async_trait;
use bollard::Docker;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Fixed in-container mount point of the host backup directory.
pub const BACKUP_MOUNT: &str = "/backup";

/// Label that asks Rancher to attach the container to its managed network.
pub const RANCHER_NETWORK_LABEL: &str = "io.rancher.container.network";

/// Seconds the worker waits before running its command, so Rancher has time to
/// configure the container network.
pub const NETWORK_SETTLE_SECS: u64 = 5;

/// One unit of dump work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub command: String,
    pub image: String,
    pub host_backup_path: PathBuf,
    /// `<container>:<alias>` pairs.
    pub network_links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed { image: String, command: String },
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Success => write!(f, "Dump command succeeded"),
            TaskOutcome::Failed { image, command } => {
                write!(f, "Dump command failed: {} (using {})", command, image)
            }
        }
    }
}

/// Everything needed to create a worker container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub labels: HashMap<String, String>,
    pub binds: Vec<String>,
    pub links: Vec<String>,
    pub auto_remove: bool,
}

#[derive(Debug, Clone)]
pub struct DockerClient {
    pub client: Docker,
}

/// The container runtime operations a worker task goes through.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Progress statuses of an image pull. The pull is only complete once the
    /// stream is exhausted.
    fn pull_image<'a>(&'a self, image: &'a str) -> BoxStream<'a, RunnerResult<String>>;

    /// Returns the id of the created container.
    async fn create_container(&self, config: &Config) -> RunnerResult<String>;

    async fn start_container(&self, container_id: &str) -> RunnerResult<()>;

    /// Blocks until the container is no longer running and returns its exit status.
    async fn wait_not_running(&self, container_id: &str) -> RunnerResult<i64>;

    /// Combined stdout and stderr, followed until the container exits.
    fn logs<'a>(&'a self, container_id: &'a str) -> BoxStream<'a, RunnerResult<Vec<u8>>>;

    async fn remove_container(&self, container_id: &str) -> RunnerResult<()>;
}

/// What the backup run needs from task execution.
#[async_trait]
pub trait DumpRunner: Send + Sync {
    async fn run_task(&self, spec: &TaskSpec) -> RunnerResult<TaskOutcome>;
}

pub struct TaskRunner<R> {
    pub runtime: R,
}

/// Infrastructure failures: the task could not be launched or supervised.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Cannot connect to the container runtime: {0}")]
    Connect(String),

    #[error("Cannot pull image {image}: {reason}")]
    Pull { image: String, reason: String },

    #[error("Cannot create container from {image}: {reason}")]
    Create { image: String, reason: String },

    #[error("Cannot start container {container_id}: {reason}")]
    Start { container_id: String, reason: String },

    #[error("Waiting for container {container_id} failed: {reason}")]
    Wait { container_id: String, reason: String },

    #[error("Cannot remove container {container_id}: {reason}")]
    Remove { container_id: String, reason: String },

    #[error("Cannot read logs of container {container_id}: {reason}")]
    Logs { container_id: String, reason: String },
}

pub type RunnerResult<T> = Result<T, RunnerError>;
