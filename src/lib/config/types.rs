use std::path::PathBuf;

use thiserror::Error;

/// Connection parameters for the Rancher management API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RancherConfig {
    pub url: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Settings resolved once at startup and shared read-only by every phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backup_root: PathBuf,
    pub rancher: RancherConfig,
    pub backup_rancher_database: bool,
    pub backup_postgres_databases: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("The {name} environment variable is required")]
    Missing { name: &'static str },
}
