use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::types::{
    BACKUP_MOUNT, Config, ContainerRuntime, DumpRunner, NETWORK_SETTLE_SECS,
    RANCHER_NETWORK_LABEL, RunnerError, RunnerResult, TaskOutcome, TaskRunner, TaskSpec,
};

/// Wraps the dump command in the network settle delay.
pub fn worker_command(command: &str) -> Vec<String> {
    vec![
        "bash".to_string(),
        "-c".to_string(),
        format!("sleep {} && {}", NETWORK_SETTLE_SECS, command),
    ]
}

pub fn new_config(spec: &TaskSpec) -> Config {
    Config {
        name: format!("backup-worker-{}", uuid::Uuid::new_v4()),
        image: spec.image.clone(),
        cmd: worker_command(&spec.command),
        labels: HashMap::from([(RANCHER_NETWORK_LABEL.to_string(), "true".to_string())]),
        binds: vec![format!("{}:{}", spec.host_backup_path.display(), BACKUP_MOUNT)],
        links: spec.network_links.clone(),
        auto_remove: true,
    }
}

impl<R: ContainerRuntime> TaskRunner<R> {
    pub fn new(runtime: R) -> Self {
        TaskRunner { runtime }
    }

    /// Runs one worker container to completion, copying its output to `out`.
    pub async fn run_task_with_output<W>(
        &self,
        spec: &TaskSpec,
        out: &mut W,
    ) -> RunnerResult<TaskOutcome>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if spec.image.is_empty() {
            return Err(RunnerError::InvalidTask("image is empty".to_string()));
        }
        if spec.command.is_empty() {
            return Err(RunnerError::InvalidTask("command is empty".to_string()));
        }
        check_backup_path(&spec.host_backup_path).await?;

        info!("Pulling image: {}", spec.image);
        let mut pull = self.runtime.pull_image(&spec.image);
        while let Some(status) = pull.next().await {
            let status = status?;
            if !status.is_empty() {
                debug!("{}: {}", spec.image, status);
            }
        }
        drop(pull);
        debug!("Image pulled: {}", spec.image);

        let config = new_config(spec);
        let container_id = self.runtime.create_container(&config).await?;
        debug!("Container {} created as {}", config.name, container_id);

        if let Err(e) = self.runtime.start_container(&container_id).await {
            // Never started, so auto-removal will not fire.
            if let Err(remove_err) = self.runtime.remove_container(&container_id).await {
                warn!("{}", remove_err);
            }
            return Err(e);
        }
        info!("Container {} started", container_id);

        let (forwarded, status) = tokio::join!(
            forward_logs(&container_id, self.runtime.logs(&container_id), out),
            self.runtime.wait_not_running(&container_id),
        );
        let status = status?;
        if let Err(e) = forwarded {
            warn!("Output of container {} was not fully forwarded: {}", container_id, e);
        }

        if status == 0 {
            info!("Container {} exited successfully", container_id);
            Ok(TaskOutcome::Success)
        } else {
            warn!("Container {} exited with status {}", container_id, status);
            Ok(TaskOutcome::Failed {
                image: spec.image.clone(),
                command: config.cmd.join(" "),
            })
        }
    }
}

/// The daemon would silently create a missing bind source, so the backup
/// directory has to exist and be writable before the worker is created.
async fn check_backup_path(path: &Path) -> RunnerResult<()> {
    let invalid = |reason: &str| {
        RunnerError::InvalidTask(format!("backup path {} {}", path.display(), reason))
    };

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| invalid(&format!("is not accessible: {}", e)))?;

    if !metadata.is_dir() {
        return Err(invalid("is not a directory"));
    }
    if metadata.permissions().readonly() {
        return Err(invalid("is read-only"));
    }

    Ok(())
}

async fn forward_logs<W>(
    container_id: &str,
    mut logs: BoxStream<'_, RunnerResult<Vec<u8>>>,
    out: &mut W,
) -> RunnerResult<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let io_error = |e: std::io::Error| RunnerError::Logs {
        container_id: container_id.to_string(),
        reason: e.to_string(),
    };

    while let Some(chunk) = logs.next().await {
        out.write_all(&chunk?).await.map_err(io_error)?;
        out.flush().await.map_err(io_error)?;
    }

    Ok(())
}

#[async_trait]
impl<R: ContainerRuntime> DumpRunner for TaskRunner<R> {
    async fn run_task(&self, spec: &TaskSpec) -> RunnerResult<TaskOutcome> {
        let mut stdout = tokio::io::stdout();
        self.run_task_with_output(spec, &mut stdout).await
    }
}
