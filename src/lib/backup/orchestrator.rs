use tracing::{info, warn};

use super::{
    dumps::{postgres_task, rancher_database_task, write_manifest},
    types::{BackupError, BackupOrchestrator, BackupReport, Phase, RunOutcome},
};
use crate::lib::{
    config::types::Config,
    directory::types::ServiceDirectory,
    tasks::types::{DumpRunner, TaskOutcome, TaskSpec},
};

impl<D: ServiceDirectory, T: DumpRunner> BackupOrchestrator<D, T> {
    pub fn new(config: Config, directory: D, runner: T) -> Self {
        BackupOrchestrator {
            config,
            directory,
            runner,
        }
    }

    /// Runs every enabled phase in order and stops at the first error.
    pub async fn run(&self) -> RunOutcome {
        match self.backup().await {
            Ok(report) => RunOutcome::Completed(report),
            Err(err) => RunOutcome::Aborted(err),
        }
    }

    async fn backup(&self) -> Result<BackupReport, BackupError> {
        let mut report = BackupReport::default();

        if self.config.backup_rancher_database {
            let server = self
                .directory
                .find_control_plane_service()
                .await
                .map_err(|source| BackupError::Directory {
                    phase: Phase::RancherDiscovery,
                    source,
                })?;

            info!("Starting backup of rancher database");
            let spec = rancher_database_task(&server, &self.config.backup_root);
            self.dump(Phase::RancherDump, &spec).await?;
            report.rancher_database = true;
        }

        if self.config.backup_postgres_databases {
            let services = self
                .directory
                .list_database_services()
                .await
                .map_err(|source| BackupError::Directory {
                    phase: Phase::PostgresDiscovery,
                    source,
                })?;

            for (i, service) in services.iter().enumerate() {
                info!(
                    "Starting backup of postgres service {}/{}: {}",
                    i + 1,
                    services.len(),
                    service.name
                );
                let spec = postgres_task(service, &self.config.backup_root);
                self.dump(Phase::PostgresDump, &spec).await?;
                report.databases.push(service.clone());
            }

            match write_manifest(&self.config.backup_root, &report.databases).await {
                Ok(path) => report.manifest = Some(path),
                Err(e) => warn!("Cannot write the backup log: {}", e),
            }
        }

        Ok(report)
    }

    async fn dump(&self, phase: Phase, spec: &TaskSpec) -> Result<(), BackupError> {
        let outcome = self
            .runner
            .run_task(spec)
            .await
            .map_err(|source| BackupError::Runner { phase, source })?;

        match outcome {
            TaskOutcome::Success => Ok(()),
            failed @ TaskOutcome::Failed { .. } => Err(BackupError::TaskFailed {
                phase,
                outcome: failed,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::{
        config::types::RancherConfig,
        directory::types::{ClusterDirectory, DirectoryError},
        testing::{MockCluster, RecordingRunner, container, host, project, service},
        tasks::types::RunnerError,
    };
    use assert_matches::assert_matches;
    use std::path::Path;

    fn config(root: &Path, rancher: bool, postgres: bool) -> Config {
        Config {
            backup_root: root.to_path_buf(),
            rancher: RancherConfig {
                url: "http://rancher:8080/v2-beta".to_string(),
                access_key: "access".to_string(),
                secret_key: "secret".to_string(),
            },
            backup_rancher_database: rancher,
            backup_postgres_databases: postgres,
        }
    }

    fn cluster() -> MockCluster {
        let mut cluster = MockCluster::default();
        cluster.add_project(project("1a5"));
        cluster.add_service("1a5", service("1s1", "db-main", "docker:postgres:9.6", "active"));
        cluster.add_instance("1s1", container("1i1", "running", Some("10.42.0.5")));
        cluster.add_host("1i1", host("1h1", "node-1"));
        cluster.add_service("1a5", service("1s2", "db-audit", "docker:postgres:10", "active"));
        cluster.add_instance("1s2", container("1i2", "running", Some("10.42.0.9")));
        cluster.add_host("1i2", host("1h2", "node-2"));

        let mut server = container("1i50", "running", Some("10.42.0.50"));
        server.image_uuid = Some("docker:rancher/server:stable".to_string());
        server.hostname = Some("f00dfeed".to_string());
        cluster.add_container("1a5", server);
        cluster
    }

    #[tokio::test]
    async fn test_completes_and_writes_manifest_in_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = BackupOrchestrator::new(
            config(dir.path(), false, true),
            ClusterDirectory::new(cluster()),
            RecordingRunner::default(),
        );

        let report = assert_matches!(orchestrator.run().await, RunOutcome::Completed(report) => report);

        assert_eq!(report.databases.len(), 2);
        let manifest = std::fs::read_to_string(report.manifest.unwrap()).unwrap();
        assert_eq!(
            manifest,
            "1s1,db-main,postgres:9.6,10.42.0.5,node-1\n1s2,db-audit,postgres:10,10.42.0.9,node-2\n"
        );

        let specs = orchestrator.runner.specs();
        assert_eq!(specs.len(), 2);
        assert!(specs[0].command.ends_with("/backup/dump_1s1_db-main.sql"));
        assert!(specs[1].command.ends_with("/backup/dump_1s2_db-audit.sql"));
    }

    #[tokio::test]
    async fn test_rancher_database_runs_first() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = BackupOrchestrator::new(
            config(dir.path(), true, true),
            ClusterDirectory::new(cluster()),
            RecordingRunner::default(),
        );

        let report = assert_matches!(orchestrator.run().await, RunOutcome::Completed(report) => report);
        assert!(report.rancher_database);

        let specs = orchestrator.runner.specs();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].image, "mysql");
        assert_eq!(specs[0].network_links, vec!["f00dfeed:db"]);
    }

    #[tokio::test]
    async fn test_stops_at_first_failed_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut cluster = cluster();
        cluster.add_service("1a5", service("1s3", "db-third", "docker:postgres:11", "active"));
        cluster.add_instance("1s3", container("1i3", "running", Some("10.42.0.13")));

        let runner = RecordingRunner::with_outcomes(vec![
            Ok(TaskOutcome::Success),
            Ok(TaskOutcome::Failed {
                image: "postgres:10".to_string(),
                command: "bash -c sleep 5 && pg_dumpall".to_string(),
            }),
        ]);
        let orchestrator = BackupOrchestrator::new(
            config(dir.path(), false, true),
            ClusterDirectory::new(cluster),
            runner,
        );

        let err = assert_matches!(orchestrator.run().await, RunOutcome::Aborted(err) => err);
        assert_matches!(
            err,
            BackupError::TaskFailed {
                phase: Phase::PostgresDump,
                outcome: TaskOutcome::Failed { ref image, .. },
            } if image == "postgres:10"
        );
        assert_eq!(
            err.to_string(),
            "postgres service dump: Dump command failed: bash -c sleep 5 && pg_dumpall (using postgres:10)"
        );
        assert_eq!(orchestrator.runner.specs().len(), 2);
        assert!(!dir.path().join("backuplog.csv").exists());
    }

    #[tokio::test]
    async fn test_runner_error_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::with_outcomes(vec![Err(RunnerError::Pull {
            image: "mysql".to_string(),
            reason: "no such host".to_string(),
        })]);
        let orchestrator = BackupOrchestrator::new(
            config(dir.path(), true, true),
            ClusterDirectory::new(cluster()),
            runner,
        );

        let err = assert_matches!(orchestrator.run().await, RunOutcome::Aborted(err) => err);
        assert_matches!(err, BackupError::Runner { phase: Phase::RancherDump, .. });
        assert_eq!(orchestrator.runner.specs().len(), 1);
        assert!(!orchestrator.directory.fetcher.calls().iter().any(|call| call.starts_with("services")));
    }

    #[tokio::test]
    async fn test_unreachable_service_aborts_before_any_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut cluster = MockCluster::default();
        cluster.add_project(project("1a5"));
        cluster.add_service("1a5", service("1s7", "db-pending", "docker:postgres:9.6", "active"));
        cluster.add_instance("1s7", container("1i7", "pending", Some("10.42.0.7")));
        cluster.add_instance("1s7", container("1i8", "pending", None));

        let orchestrator = BackupOrchestrator::new(
            config(dir.path(), false, true),
            ClusterDirectory::new(cluster),
            RecordingRunner::default(),
        );

        let err = assert_matches!(orchestrator.run().await, RunOutcome::Aborted(err) => err);
        assert_matches!(
            err,
            BackupError::Directory {
                phase: Phase::PostgresDiscovery,
                source: DirectoryError::ServiceUnreachable { ref service_id, ref service_name },
            } if service_id == "1s7" && service_name == "db-pending"
        );
        assert!(orchestrator.runner.specs().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_rancher_phase_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = BackupOrchestrator::new(
            config(dir.path(), false, true),
            ClusterDirectory::new(cluster()),
            RecordingRunner::default(),
        );

        let report = assert_matches!(orchestrator.run().await, RunOutcome::Completed(report) => report);
        assert!(!report.rancher_database);

        let calls = orchestrator.directory.fetcher.calls();
        assert!(!calls.iter().any(|call| call.starts_with("containers")));
        assert!(orchestrator.runner.specs().iter().all(|spec| spec.image != "mysql"));
    }

    #[tokio::test]
    async fn test_missing_rancher_server_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut cluster = MockCluster::default();
        cluster.add_project(project("1a5"));

        let orchestrator = BackupOrchestrator::new(
            config(dir.path(), true, true),
            ClusterDirectory::new(cluster),
            RecordingRunner::default(),
        );

        let err = assert_matches!(orchestrator.run().await, RunOutcome::Aborted(err) => err);
        assert_matches!(
            err,
            BackupError::Directory {
                phase: Phase::RancherDiscovery,
                source: DirectoryError::ControlPlaneServiceNotFound,
            }
        );
        assert!(orchestrator.runner.specs().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_enabled_completes_without_work() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = BackupOrchestrator::new(
            config(dir.path(), false, false),
            ClusterDirectory::new(cluster()),
            RecordingRunner::default(),
        );

        let report = assert_matches!(orchestrator.run().await, RunOutcome::Completed(report) => report);
        assert_eq!(report, BackupReport::default());
        assert!(orchestrator.directory.fetcher.calls().is_empty());
    }
}
