use std::path::PathBuf;

use super::types::{Config, ConfigError, RancherConfig};

pub const BACKUP_ROOT: &str = "BACKUP_ROOT";
pub const RANCHER_URL: &str = "RANCHER_URL";
pub const RANCHER_ACCESS_KEY: &str = "RANCHER_ACCESS_KEY";
pub const RANCHER_SECRET_KEY: &str = "RANCHER_SECRET_KEY";
pub const ACTIVATE_RANCHER_DATABASE: &str = "ACTIVATE_RANCHER_DATABASE";
pub const ACTIVATE_POSTGRES_DATABASE: &str = "ACTIVATE_POSTGRES_DATABASE";

impl Config {
    /// Reads the configuration from the process environment, after loading a
    /// `.env` file from the working directory if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing { name });

        let backup_root = PathBuf::from(required(BACKUP_ROOT)?);
        let rancher = RancherConfig {
            url: required(RANCHER_URL)?,
            access_key: required(RANCHER_ACCESS_KEY)?,
            secret_key: required(RANCHER_SECRET_KEY)?,
        };

        Ok(Config {
            backup_root,
            rancher,
            backup_rancher_database: toggle(lookup(ACTIVATE_RANCHER_DATABASE)),
            backup_postgres_databases: toggle(lookup(ACTIVATE_POSTGRES_DATABASE)),
        })
    }
}

// Unset means enabled; only a literal "false" turns a phase off.
fn toggle(value: Option<String>) -> bool {
    match value {
        Some(value) => !value.eq_ignore_ascii_case("false"),
        None => true,
    }
}
