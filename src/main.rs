use lib::{
    backup::types::{BackupError, BackupOrchestrator, Phase, RunOutcome},
    config::types::Config,
    directory::{rancher::RancherClient, types::ClusterDirectory},
    logs::init_logging,
    tasks::types::{DockerClient, TaskRunner},
};
use tracing::{error, info};

mod lib {
    pub mod backup;
    pub mod config;
    pub mod directory;
    pub mod logs;
    pub mod tasks;
    #[cfg(test)]
    pub mod testing;
}

type Orchestrator = BackupOrchestrator<ClusterDirectory<RancherClient>, TaskRunner<DockerClient>>;

fn connect(config: Config) -> Result<Orchestrator, BackupError> {
    let rancher = RancherClient::new(&config.rancher).map_err(|source| BackupError::Directory {
        phase: Phase::Connect,
        source,
    })?;
    let docker = DockerClient::new().map_err(|source| BackupError::Runner {
        phase: Phase::Connect,
        source,
    })?;

    Ok(BackupOrchestrator::new(
        config,
        ClusterDirectory::new(rancher),
        TaskRunner::new(docker),
    ))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = init_logging() {
        eprintln!("Cannot initialise logging: {}", e);
    }

    let outcome = match Config::from_env()
        .map_err(BackupError::from)
        .and_then(connect)
    {
        Ok(orchestrator) => orchestrator.run().await,
        Err(err) => RunOutcome::Aborted(err),
    };

    match outcome {
        RunOutcome::Completed(report) => {
            if let Some(manifest) = report.manifest {
                info!("Backup log written to {}", manifest.display());
            }
            info!("Backup finished");
        }
        RunOutcome::Aborted(err) => error!("An error occurred during {}", err),
    }
}
