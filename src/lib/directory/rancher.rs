use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use super::types::{
    Collection, Container, DirectoryError, DirectoryResult, Host, Linked, Project,
    RelatedEntityFetcher, Service,
};
use crate::lib::config::types::RancherConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Rancher management API client, authenticated with an API key pair.
pub struct RancherClient {
    client: Client,
    base_url: String,
    access_key: String,
    secret_key: String,
}

impl RancherClient {
    pub fn new(config: &RancherConfig) -> DirectoryResult<Self> {
        let base_url = config.url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| DirectoryError::Http {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base_url,
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    async fn get_collection<T: DeserializeOwned>(&self, url: &str) -> DirectoryResult<Vec<T>> {
        debug!("GET {}", url);

        let http_error = |source| DirectoryError::Http {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        let body = response.text().await.map_err(http_error)?;

        if !status.is_success() {
            error!("Rancher API GET failed: {} - {}", status, body);
            return Err(DirectoryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let collection: Collection<T> =
            serde_json::from_str(&body).map_err(|source| DirectoryError::Decode {
                url: url.to_string(),
                source,
            })?;

        Ok(collection.data)
    }

    /// Follows the named relation of a resource.
    async fn get_link<R, T>(&self, resource: &R, relation: &str) -> DirectoryResult<Vec<T>>
    where
        R: Linked + Sync,
        T: DeserializeOwned,
    {
        let url = resource
            .links()
            .get(relation)
            .ok_or_else(|| DirectoryError::MissingLink {
                resource_id: resource.id().to_string(),
                relation: relation.to_string(),
            })?;

        self.get_collection(url).await
    }
}

#[async_trait]
impl RelatedEntityFetcher for RancherClient {
    async fn projects(&self) -> DirectoryResult<Vec<Project>> {
        self.get_collection(&format!("{}/projects", self.base_url))
            .await
    }

    async fn services(&self, project: &Project) -> DirectoryResult<Vec<Service>> {
        self.get_link(project, "services").await
    }

    async fn containers(&self, project: &Project) -> DirectoryResult<Vec<Container>> {
        self.get_link(project, "containers").await
    }

    async fn instances(&self, service: &Service) -> DirectoryResult<Vec<Container>> {
        self.get_link(service, "instances").await
    }

    async fn hosts(&self, instance: &Container) -> DirectoryResult<Vec<Host>> {
        self.get_link(instance, "hosts").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn config() -> RancherConfig {
        RancherConfig {
            url: "http://rancher:8080/v2-beta/".to_string(),
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
        }
    }

    #[test]
    fn test_client_creation_trims_base_url() {
        let client = RancherClient::new(&config()).unwrap();
        assert_eq!(client.base_url, "http://rancher:8080/v2-beta");
    }

    #[tokio::test]
    async fn test_missing_link_is_reported() {
        let client = RancherClient::new(&config()).unwrap();
        let project = Project {
            id: "1a5".to_string(),
            ..Default::default()
        };

        assert_matches!(
            client.services(&project).await,
            Err(DirectoryError::MissingLink { ref resource_id, ref relation })
                if resource_id == "1a5" && relation == "services"
        );
    }

    #[test]
    fn test_decode_service_collection() {
        let body = r#"{
            "type": "collection",
            "data": [{
                "id": "1s12",
                "name": "db-main",
                "state": "active",
                "launchConfig": {"imageUuid": "docker:postgres:9.6"},
                "links": {"instances": "http://rancher:8080/v2-beta/projects/1a5/services/1s12/instances"}
            }]
        }"#;

        let collection: Collection<Service> = serde_json::from_str(body).unwrap();
        let service = &collection.data[0];
        assert_eq!(service.id, "1s12");
        assert_eq!(service.name.as_deref(), Some("db-main"));
        assert_eq!(service.image_uuid(), "docker:postgres:9.6");
        assert!(service.links.contains_key("instances"));
    }

    #[test]
    fn test_collection_without_data_is_a_decode_error() {
        let body = r#"{"type": "error", "status": 404, "code": "NotFound"}"#;
        assert!(serde_json::from_str::<Collection<Service>>(body).is_err());
    }

    #[test]
    fn test_decode_container_with_null_fields() {
        let body = r#"{"data": [{
            "id": "1i7",
            "name": null,
            "state": "running",
            "imageUuid": "docker:rancher/server:stable",
            "primaryIpAddress": null,
            "hostname": "f00dfeed"
        }]}"#;

        let collection: Collection<Container> = serde_json::from_str(body).unwrap();
        let container = &collection.data[0];
        assert_eq!(container.name, None);
        assert_eq!(container.primary_ip_address, None);
        assert_eq!(container.hostname.as_deref(), Some("f00dfeed"));
        assert!(container.links.is_empty());
    }
}
