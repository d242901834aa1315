use std::path::{Path, PathBuf};

use crate::lib::{
    directory::types::ServiceEndpoint,
    tasks::types::{BACKUP_MOUNT, TaskSpec},
};

pub const RANCHER_DATABASE_IMAGE: &str = "mysql";
/// Alias under which the Rancher server container is linked into the worker.
pub const RANCHER_DATABASE_ALIAS: &str = "db";
pub const MANIFEST_FILE: &str = "backuplog.csv";

/// Dumps the Rancher server's own MySQL database through a link to its container.
pub fn rancher_database_task(server: &ServiceEndpoint, backup_root: &Path) -> TaskSpec {
    let dump_path = format!("{}/rancher_dump.sql", BACKUP_MOUNT);

    TaskSpec {
        command: format!(
            "mysqldump -A -h {} -u cattle -pcattle --result-file {}",
            RANCHER_DATABASE_ALIAS, dump_path
        ),
        image: RANCHER_DATABASE_IMAGE.to_string(),
        host_backup_path: backup_root.to_path_buf(),
        network_links: vec![format!(
            "{}:{}",
            server.address.host(),
            RANCHER_DATABASE_ALIAS
        )],
    }
}

pub fn postgres_dump_path(service: &ServiceEndpoint) -> String {
    format!("{}/dump_{}_{}.sql", BACKUP_MOUNT, service.id, service.name)
}

/// Dumps every database of a postgres service with the service's own image.
pub fn postgres_task(service: &ServiceEndpoint, backup_root: &Path) -> TaskSpec {
    TaskSpec {
        command: format!(
            "pg_dumpall -h {} -U postgres --clean -f {}",
            service.address.host(),
            postgres_dump_path(service)
        ),
        image: service.image.clone(),
        host_backup_path: backup_root.to_path_buf(),
        network_links: Vec::new(),
    }
}

/// Overwrites the backup log with one line per backed-up service.
pub async fn write_manifest(
    backup_root: &Path,
    services: &[ServiceEndpoint],
) -> std::io::Result<PathBuf> {
    let path = backup_root.join(MANIFEST_FILE);
    let contents: String = services
        .iter()
        .map(|service| format!("{}\n", service))
        .collect();

    tokio::fs::write(&path, contents).await?;
    Ok(path)
}
