//! In-memory stand-ins for the Rancher API and the container runtime.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::lib::{
    directory::types::{
        Container, DirectoryResult, Host, LaunchConfig, Project, RelatedEntityFetcher, Service,
    },
    tasks::types::{
        Config, ContainerRuntime, DumpRunner, RunnerError, RunnerResult, TaskOutcome, TaskSpec,
    },
};

pub fn project(id: &str) -> Project {
    Project {
        id: id.to_string(),
        name: Some(format!("project-{}", id)),
        ..Default::default()
    }
}

pub fn service(id: &str, name: &str, image_uuid: &str, state: &str) -> Service {
    Service {
        id: id.to_string(),
        name: Some(name.to_string()),
        state: state.to_string(),
        launch_config: Some(LaunchConfig {
            image_uuid: Some(image_uuid.to_string()),
        }),
        ..Default::default()
    }
}

pub fn container(id: &str, state: &str, ip: Option<&str>) -> Container {
    Container {
        id: id.to_string(),
        state: state.to_string(),
        primary_ip_address: ip.map(str::to_string),
        ..Default::default()
    }
}

pub fn host(id: &str, hostname: &str) -> Host {
    Host {
        id: id.to_string(),
        hostname: Some(hostname.to_string()),
        ..Default::default()
    }
}

/// A cluster keyed by owner id, recording every relation it is asked for.
#[derive(Default)]
pub struct MockCluster {
    projects: Vec<Project>,
    services: HashMap<String, Vec<Service>>,
    containers: HashMap<String, Vec<Container>>,
    instances: HashMap<String, Vec<Container>>,
    hosts: HashMap<String, Vec<Host>>,
    calls: Mutex<Vec<String>>,
}

impl MockCluster {
    pub fn add_project(&mut self, project: Project) {
        self.projects.push(project);
    }

    pub fn add_service(&mut self, project_id: &str, service: Service) {
        self.services.entry(project_id.to_string()).or_default().push(service);
    }

    pub fn add_container(&mut self, project_id: &str, container: Container) {
        self.containers.entry(project_id.to_string()).or_default().push(container);
    }

    pub fn add_instance(&mut self, service_id: &str, instance: Container) {
        self.instances.entry(service_id.to_string()).or_default().push(instance);
    }

    pub fn add_host(&mut self, instance_id: &str, host: Host) {
        self.hosts.entry(instance_id.to_string()).or_default().push(host);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn related<T: Clone>(map: &HashMap<String, Vec<T>>, owner_id: &str) -> Vec<T> {
    map.get(owner_id).cloned().unwrap_or_default()
}

#[async_trait]
impl RelatedEntityFetcher for MockCluster {
    async fn projects(&self) -> DirectoryResult<Vec<Project>> {
        self.record("projects".to_string());
        Ok(self.projects.clone())
    }

    async fn services(&self, project: &Project) -> DirectoryResult<Vec<Service>> {
        self.record(format!("services:{}", project.id));
        Ok(related(&self.services, &project.id))
    }

    async fn containers(&self, project: &Project) -> DirectoryResult<Vec<Container>> {
        self.record(format!("containers:{}", project.id));
        Ok(related(&self.containers, &project.id))
    }

    async fn instances(&self, service: &Service) -> DirectoryResult<Vec<Container>> {
        self.record(format!("instances:{}", service.id));
        Ok(related(&self.instances, &service.id))
    }

    async fn hosts(&self, instance: &Container) -> DirectoryResult<Vec<Host>> {
        self.record(format!("hosts:{}", instance.id));
        Ok(related(&self.hosts, &instance.id))
    }
}

/// A container runtime that plays back a fixed script.
pub struct ScriptedRuntime {
    pull_statuses: Vec<String>,
    pull_error: Option<String>,
    start_error: Option<String>,
    wait: Result<i64, String>,
    logs: Vec<String>,
    logs_error: Option<String>,
    pulled: AtomicUsize,
    pulled_before_create: Mutex<Option<usize>>,
    created: Mutex<Vec<Config>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRuntime {
    pub fn exiting_with(status: i64) -> Self {
        ScriptedRuntime {
            pull_statuses: vec!["Pull complete".to_string()],
            pull_error: None,
            start_error: None,
            wait: Ok(status),
            logs: Vec::new(),
            logs_error: None,
            pulled: AtomicUsize::new(0),
            pulled_before_create: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pull_statuses(mut self, statuses: &[&str]) -> Self {
        self.pull_statuses = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_logs(mut self, chunks: &[&str]) -> Self {
        self.logs = chunks.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn failing_pull(mut self, reason: &str) -> Self {
        self.pull_error = Some(reason.to_string());
        self
    }

    pub fn failing_start(mut self, reason: &str) -> Self {
        self.start_error = Some(reason.to_string());
        self
    }

    pub fn failing_wait(mut self, reason: &str) -> Self {
        self.wait = Err(reason.to_string());
        self
    }

    pub fn failing_logs(mut self, reason: &str) -> Self {
        self.logs_error = Some(reason.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<Config> {
        self.created.lock().unwrap().clone()
    }

    pub fn pull_statuses_consumed_before_create(&self) -> Option<usize> {
        *self.pulled_before_create.lock().unwrap()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    fn pull_image<'a>(&'a self, image: &'a str) -> BoxStream<'a, RunnerResult<String>> {
        self.record("pull");

        let mut items: Vec<RunnerResult<String>> =
            self.pull_statuses.iter().cloned().map(Ok).collect();
        if let Some(reason) = &self.pull_error {
            items = vec![Err(RunnerError::Pull {
                image: image.to_string(),
                reason: reason.clone(),
            })];
        }

        let pulled = &self.pulled;
        stream::iter(items)
            .map(move |item| {
                if item.is_ok() {
                    pulled.fetch_add(1, Ordering::SeqCst);
                }
                item
            })
            .boxed()
    }

    async fn create_container(&self, config: &Config) -> RunnerResult<String> {
        self.record("create");
        *self.pulled_before_create.lock().unwrap() = Some(self.pulled.load(Ordering::SeqCst));
        self.created.lock().unwrap().push(config.clone());
        Ok("c0ffee".to_string())
    }

    async fn start_container(&self, container_id: &str) -> RunnerResult<()> {
        self.record("start");
        match &self.start_error {
            Some(reason) => Err(RunnerError::Start {
                container_id: container_id.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn wait_not_running(&self, container_id: &str) -> RunnerResult<i64> {
        self.record("wait");
        self.wait.clone().map_err(|reason| RunnerError::Wait {
            container_id: container_id.to_string(),
            reason,
        })
    }

    fn logs<'a>(&'a self, container_id: &'a str) -> BoxStream<'a, RunnerResult<Vec<u8>>> {
        self.record("logs");

        let mut chunks: Vec<RunnerResult<Vec<u8>>> = self
            .logs
            .iter()
            .map(|chunk| Ok(chunk.as_bytes().to_vec()))
            .collect();
        if let Some(reason) = &self.logs_error {
            chunks.push(Err(RunnerError::Logs {
                container_id: container_id.to_string(),
                reason: reason.clone(),
            }));
        }

        stream::iter(chunks).boxed()
    }

    async fn remove_container(&self, _container_id: &str) -> RunnerResult<()> {
        self.record("remove");
        Ok(())
    }
}

/// A dump runner that records each spec and replies from a queue, then with
/// `Success` once the queue is empty.
#[derive(Default)]
pub struct RecordingRunner {
    outcomes: Mutex<VecDeque<RunnerResult<TaskOutcome>>>,
    specs: Mutex<Vec<TaskSpec>>,
}

impl RecordingRunner {
    pub fn with_outcomes(outcomes: Vec<RunnerResult<TaskOutcome>>) -> Self {
        RecordingRunner {
            outcomes: Mutex::new(outcomes.into()),
            specs: Mutex::new(Vec::new()),
        }
    }

    pub fn specs(&self) -> Vec<TaskSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl DumpRunner for RecordingRunner {
    async fn run_task(&self, spec: &TaskSpec) -> RunnerResult<TaskOutcome> {
        self.specs.lock().unwrap().push(spec.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(TaskOutcome::Success))
    }
}
