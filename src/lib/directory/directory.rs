use async_trait::async_trait;
use tracing::debug;

use super::types::{
    Address, CONTROL_PLANE_IMAGE_MARKER, ClusterDirectory, Container, DATABASE_IMAGE_MARKER,
    DirectoryError, DirectoryResult, INSTANCE_STATE_RUNNING, RelatedEntityFetcher,
    SERVICE_STATE_ACTIVE, Service, ServiceDirectory, ServiceEndpoint,
};

const IMAGE_SCHEME: &str = "docker:";

/// Strips the `docker:` scheme Rancher prepends to image references.
pub fn normalize_image(image_uuid: &str) -> String {
    image_uuid
        .strip_prefix(IMAGE_SCHEME)
        .unwrap_or(image_uuid)
        .to_string()
}

impl<F: RelatedEntityFetcher> ClusterDirectory<F> {
    pub fn new(fetcher: F) -> Self {
        ClusterDirectory { fetcher }
    }

    /// Resolves a service to the first running instance that has an address,
    /// picking up the hostname of the instance's host when there is one.
    async fn resolve_address(&self, service: &Service) -> DirectoryResult<Address> {
        let instances = self.fetcher.instances(service).await?;

        let Some(instance) = instances.iter().find(|instance| is_reachable(instance)) else {
            return Err(DirectoryError::ServiceUnreachable {
                service_id: service.id.clone(),
                service_name: service.name.clone().unwrap_or_default(),
            });
        };

        let hostname = self
            .fetcher
            .hosts(instance)
            .await?
            .into_iter()
            .find_map(|host| host.hostname.filter(|hostname| !hostname.is_empty()));

        Ok(Address {
            ip: instance.primary_ip_address.clone(),
            hostname,
        })
    }
}

fn is_reachable(instance: &Container) -> bool {
    instance.state == INSTANCE_STATE_RUNNING
        && instance
            .primary_ip_address
            .as_deref()
            .is_some_and(|ip| !ip.is_empty())
}

#[async_trait]
impl<F: RelatedEntityFetcher> ServiceDirectory for ClusterDirectory<F> {
    async fn list_database_services(&self) -> DirectoryResult<Vec<ServiceEndpoint>> {
        let mut endpoints = Vec::new();

        for project in self.fetcher.projects().await? {
            for service in self.fetcher.services(&project).await? {
                let image_uuid = service.image_uuid();
                if !image_uuid.contains(DATABASE_IMAGE_MARKER) || service.state != SERVICE_STATE_ACTIVE
                {
                    continue;
                }

                let address = self.resolve_address(&service).await?;
                debug!("Found database service {} ({}) at {}", service.id, image_uuid, address);

                endpoints.push(ServiceEndpoint {
                    id: service.id.clone(),
                    name: service.name.clone().unwrap_or_default(),
                    image: normalize_image(image_uuid),
                    address,
                });
            }
        }

        Ok(endpoints)
    }

    async fn find_control_plane_service(&self) -> DirectoryResult<ServiceEndpoint> {
        for project in self.fetcher.projects().await? {
            let containers = self.fetcher.containers(&project).await?;
            let server = containers.into_iter().find(|container| {
                container
                    .image_uuid
                    .as_deref()
                    .is_some_and(|image| image.contains(CONTROL_PLANE_IMAGE_MARKER))
            });

            if let Some(server) = server {
                debug!(
                    "Found Rancher server container {} in project {}",
                    server.id,
                    project.name.as_deref().unwrap_or(&project.id)
                );

                let Some(hostname) = server.hostname.filter(|hostname| !hostname.is_empty()) else {
                    return Err(DirectoryError::ControlPlaneUnreachable {
                        container_id: server.id,
                        container_name: server.name.unwrap_or_default(),
                    });
                };

                return Ok(ServiceEndpoint {
                    image: normalize_image(server.image_uuid.as_deref().unwrap_or_default()),
                    name: server.name.unwrap_or_default(),
                    address: Address {
                        ip: None,
                        hostname: Some(hostname),
                    },
                    id: server.id,
                });
            }
        }

        Err(DirectoryError::ControlPlaneServiceNotFound)
    }
}
