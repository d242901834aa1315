use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Image marker identifying a database service worth dumping.
pub const DATABASE_IMAGE_MARKER: &str = "postgres";
/// Image marker identifying the Rancher server container.
pub const CONTROL_PLANE_IMAGE_MARKER: &str = "rancher/server";

pub const SERVICE_STATE_ACTIVE: &str = "active";
pub const INSTANCE_STATE_RUNNING: &str = "running";

/// Best-known network identity of a target. At least one side is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub ip: Option<String>,
    pub hostname: Option<String>,
}

impl Address {
    /// The name a worker container should connect to, preferring the hostname.
    pub fn host(&self) -> &str {
        self.hostname
            .as_deref()
            .or(self.ip.as_deref())
            .unwrap_or_default()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}",
            self.ip.as_deref().unwrap_or_default(),
            self.hostname.as_deref().unwrap_or_default()
        )
    }
}

/// A discovered backup target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceEndpoint {
    pub id: String,
    pub name: String,
    pub image: String,
    pub address: Address,
}

/// Renders the manifest line `id,name,image,ip,hostname`.
impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.id, self.name, self.image, self.address)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Collection<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub links: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    #[serde(default)]
    pub image_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub launch_config: Option<LaunchConfig>,
    #[serde(default)]
    pub links: HashMap<String, String>,
}

impl Service {
    pub fn image_uuid(&self) -> &str {
        self.launch_config
            .as_ref()
            .and_then(|config| config.image_uuid.as_deref())
            .unwrap_or_default()
    }
}

/// A Rancher container, either a service instance or a standalone one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub image_uuid: Option<String>,
    #[serde(default)]
    pub primary_ip_address: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub links: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub links: HashMap<String, String>,
}

/// A control-plane entity that can be walked through its `links` map.
pub trait Linked {
    fn id(&self) -> &str;
    fn links(&self) -> &HashMap<String, String>;
}

macro_rules! impl_linked {
    ($($ty:ty),*) => {
        $(impl Linked for $ty {
            fn id(&self) -> &str {
                &self.id
            }

            fn links(&self) -> &HashMap<String, String> {
                &self.links
            }
        })*
    };
}

impl_linked!(Project, Service, Container, Host);

/// One method per relation the directory walks.
#[async_trait]
pub trait RelatedEntityFetcher: Send + Sync {
    async fn projects(&self) -> DirectoryResult<Vec<Project>>;
    async fn services(&self, project: &Project) -> DirectoryResult<Vec<Service>>;
    async fn containers(&self, project: &Project) -> DirectoryResult<Vec<Container>>;
    async fn instances(&self, service: &Service) -> DirectoryResult<Vec<Container>>;
    async fn hosts(&self, instance: &Container) -> DirectoryResult<Vec<Host>>;
}

/// What the backup run needs from service discovery.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    async fn list_database_services(&self) -> DirectoryResult<Vec<ServiceEndpoint>>;
    async fn find_control_plane_service(&self) -> DirectoryResult<ServiceEndpoint>;
}

pub struct ClusterDirectory<F> {
    pub fetcher: F,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Rancher API request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Rancher API returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Cannot decode Rancher API response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Resource {resource_id} has no '{relation}' link")]
    MissingLink {
        resource_id: String,
        relation: String,
    },

    #[error("Cannot find an IP address for the service named {service_name} (id: {service_id})")]
    ServiceUnreachable {
        service_id: String,
        service_name: String,
    },

    #[error("The Rancher server container {container_name} (id: {container_id}) has no hostname")]
    ControlPlaneUnreachable {
        container_id: String,
        container_name: String,
    },

    #[error(
        "Cannot find the service of the Rancher server. The host of the server must be added to Rancher."
    )]
    ControlPlaneServiceNotFound,
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;
