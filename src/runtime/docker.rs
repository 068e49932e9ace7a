use super::{ContainerRuntime, EventStream, RuntimeConnector};
use crate::error::RuntimeError;
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, Network, Service, SystemInfo,
};
use bollard::network::{InspectNetworkOptions, ListNetworksOptions};
use bollard::service::ListServicesOptions;
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Request timeout for daemon calls, in seconds.
const DOCKER_TIMEOUT_SECS: u64 = 120;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the daemon at `endpoint`.  An empty endpoint uses the
    /// local defaults (unix socket on Linux).
    pub fn connect(endpoint: &str) -> Result<Self, RuntimeError> {
        let docker = if endpoint.is_empty() {
            Docker::connect_with_local_defaults()?
        } else if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") {
            Docker::connect_with_http(endpoint, DOCKER_TIMEOUT_SECS, &bollard::API_DEFAULT_VERSION)?
        } else {
            let path = endpoint.trim_start_matches("unix://");
            Docker::connect_with_socket(path, DOCKER_TIMEOUT_SECS, &bollard::API_DEFAULT_VERSION)?
        };
        debug!("Created docker client for {}", endpoint);
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        Ok(self.docker.list_containers(Some(opts)).await?)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError> {
        Ok(self.docker.inspect_container(id, None).await?)
    }

    async fn list_networks(&self, driver: &str) -> Result<Vec<Network>, RuntimeError> {
        let opts = ListNetworksOptions::<String> {
            filters: HashMap::from([("driver".to_string(), vec![driver.to_string()])]),
        };
        Ok(self.docker.list_networks(Some(opts)).await?)
    }

    async fn inspect_network(&self, id: &str) -> Result<Network, RuntimeError> {
        Ok(self
            .docker
            .inspect_network(id, None::<InspectNetworkOptions<String>>)
            .await?)
    }

    async fn list_services(&self) -> Result<Vec<Service>, RuntimeError> {
        Ok(self
            .docker
            .list_services(None::<ListServicesOptions<String>>)
            .await?)
    }

    async fn info(&self) -> Result<SystemInfo, RuntimeError> {
        Ok(self.docker.info().await?)
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }

    fn events(&self, filters: HashMap<String, Vec<String>>) -> EventStream {
        let opts = EventsOptions::<String> {
            filters,
            ..Default::default()
        };
        self.docker
            .events(Some(opts))
            .map(|msg| msg.map_err(RuntimeError::from))
            .boxed()
    }
}

/// Connector backed by bollard.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerConnector;

impl RuntimeConnector for DockerConnector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn ContainerRuntime>, RuntimeError> {
        Ok(Arc::new(DockerRuntime::connect(endpoint)?))
    }
}
