use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::lib::{
    config::types::{Config, ConfigError},
    directory::types::{DirectoryError, ServiceEndpoint},
    tasks::types::{RunnerError, TaskOutcome},
};

/// Stage of a backup run, named in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    RancherDiscovery,
    RancherDump,
    PostgresDiscovery,
    PostgresDump,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Phase::Connect => "rancher API connection",
            Phase::RancherDiscovery => "rancher server service retrieval",
            Phase::RancherDump => "rancher database dump",
            Phase::PostgresDiscovery => "postgres services retrieval",
            Phase::PostgresDump => "postgres service dump",
        };
        f.write_str(phase)
    }
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{phase}: {source}")]
    Directory {
        phase: Phase,
        #[source]
        source: DirectoryError,
    },

    #[error("{phase}: {source}")]
    Runner {
        phase: Phase,
        #[source]
        source: RunnerError,
    },

    #[error("{phase}: {outcome}")]
    TaskFailed { phase: Phase, outcome: TaskOutcome },
}

/// What a completed run backed up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub rancher_database: bool,
    pub databases: Vec<ServiceEndpoint>,
    pub manifest: Option<PathBuf>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(BackupReport),
    Aborted(BackupError),
}

pub struct BackupOrchestrator<D, T> {
    pub config: Config,
    pub directory: D,
    pub runner: T,
}
