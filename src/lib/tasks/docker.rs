use super::types::{Config, ContainerRuntime, DockerClient, RunnerError, RunnerResult};
use async_trait::async_trait;
use bollard::{
    Docker,
    container::{
        Config as ContainerConfig, CreateContainerOptions, LogsOptions, RemoveContainerOptions,
        StartContainerOptions, WaitContainerOptions,
    },
    errors::Error as DockerError,
    image::CreateImageOptions,
    secret::HostConfig,
};
use futures_util::stream::{BoxStream, StreamExt};
use tracing::debug;

const DEFAULT_TAG: &str = "latest";

/// Splits an image reference into the `fromImage` and `tag` pull parameters.
/// A name-only reference gets `latest`, otherwise the daemon pulls every tag.
pub fn split_image_reference(image: &str) -> (String, String) {
    if image.contains('@') {
        return (image.to_string(), String::new());
    }

    let name_start = image.rfind('/').map_or(0, |slash| slash + 1);
    match image[name_start..].rfind(':') {
        Some(colon) => {
            let colon = name_start + colon;
            (image[..colon].to_string(), image[colon + 1..].to_string())
        }
        None => (image.to_string(), DEFAULT_TAG.to_string()),
    }
}

impl DockerClient {
    /// Connects through `DOCKER_HOST` or the local unix socket.
    pub fn new() -> RunnerResult<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| RunnerError::Connect(e.to_string()))?;

        Ok(DockerClient { client })
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    fn pull_image<'a>(&'a self, image: &'a str) -> BoxStream<'a, RunnerResult<String>> {
        let (from_image, tag) = split_image_reference(image);
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };

        self.client
            .create_image(Some(options), None, None)
            .map(move |msg| match msg {
                Ok(info) => match info.error {
                    Some(reason) => Err(RunnerError::Pull {
                        image: image.to_string(),
                        reason,
                    }),
                    None => Ok(info.status.unwrap_or_default()),
                },
                Err(e) => Err(RunnerError::Pull {
                    image: image.to_string(),
                    reason: e.to_string(),
                }),
            })
            .boxed()
    }

    async fn create_container(&self, config: &Config) -> RunnerResult<String> {
        let host_config = HostConfig {
            auto_remove: Some(config.auto_remove),
            binds: Some(config.binds.clone()),
            links: Some(config.links.clone()),
            ..Default::default()
        };

        let container_config = ContainerConfig {
            image: Some(config.image.clone()),
            cmd: Some(config.cmd.clone()),
            labels: Some(config.labels.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: config.name.clone(),
            ..Default::default()
        });

        let response = self
            .client
            .create_container(options, container_config)
            .await
            .map_err(|e| RunnerError::Create {
                image: config.image.clone(),
                reason: e.to_string(),
            })?;

        debug!("Container {} created from {}", response.id, config.image);
        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> RunnerResult<()> {
        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RunnerError::Start {
                container_id: container_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn wait_not_running(&self, container_id: &str) -> RunnerResult<i64> {
        let options = Some(WaitContainerOptions {
            condition: "not-running",
        });
        let wait_error = |reason: String| RunnerError::Wait {
            container_id: container_id.to_string(),
            reason,
        };

        let mut stream = Box::pin(self.client.wait_container(container_id, options));
        match stream.next().await {
            Some(Ok(response)) => match response.error.and_then(|e| e.message) {
                Some(message) if !message.is_empty() => Err(wait_error(message)),
                _ => Ok(response.status_code),
            },
            // A nonzero exit comes back from the wait endpoint as an error.
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(wait_error(e.to_string())),
            None => Err(wait_error("wait stream ended without a status".to_string())),
        }
    }

    fn logs<'a>(&'a self, container_id: &'a str) -> BoxStream<'a, RunnerResult<Vec<u8>>> {
        let options = Some(LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        });

        self.client
            .logs(container_id, options)
            .map(move |chunk| {
                chunk
                    .map(|output| output.into_bytes().to_vec())
                    .map_err(|e| RunnerError::Logs {
                        container_id: container_id.to_string(),
                        reason: e.to_string(),
                    })
            })
            .boxed()
    }

    async fn remove_container(&self, container_id: &str) -> RunnerResult<()> {
        let options = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });

        self.client
            .remove_container(container_id, options)
            .await
            .map_err(|e| RunnerError::Remove {
                container_id: container_id.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(image: &str) -> (&str, String, String) {
        let (from_image, tag) = split_image_reference(image);
        (image, from_image, tag)
    }

    #[test]
    fn test_name_only_reference_pulls_latest() {
        for image in ["mysql", "postgres", "library/postgres"] {
            let (image, from_image, tag) = split(image);
            assert_eq!(from_image, image);
            assert_eq!(tag, "latest");
        }
    }

    #[test]
    fn test_tagged_reference_is_split() {
        assert_eq!(
            split_image_reference("postgres:9.6"),
            ("postgres".to_string(), "9.6".to_string())
        );
        assert_eq!(
            split_image_reference("rancher/server:v1.6.14"),
            ("rancher/server".to_string(), "v1.6.14".to_string())
        );
    }

    #[test]
    fn test_registry_port_is_not_a_tag() {
        assert_eq!(
            split_image_reference("registry.local:5000/team/postgres"),
            ("registry.local:5000/team/postgres".to_string(), "latest".to_string())
        );
        assert_eq!(
            split_image_reference("registry.local:5000/team/postgres:11"),
            ("registry.local:5000/team/postgres".to_string(), "11".to_string())
        );
    }

    #[test]
    fn test_digest_reference_is_pulled_as_is() {
        let image = "postgres@sha256:0123456789abcdef";
        assert_eq!(
            split_image_reference(image),
            (image.to_string(), String::new())
        );
    }
}
