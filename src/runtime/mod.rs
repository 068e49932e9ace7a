use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, EventMessage, Network, Service, SystemInfo,
};
use futures_util::stream::BoxStream;

use crate::error::RuntimeError;

pub mod docker;
#[cfg(test)]
pub mod fake;

pub use docker::{DockerConnector, DockerRuntime};

/// Stream of daemon events; ends or yields an error when the daemon goes away.
pub type EventStream = BoxStream<'static, Result<EventMessage, RuntimeError>>;

/// Calls this adapter makes against a container runtime daemon.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError>;

    /// List networks created with the given driver.
    async fn list_networks(&self, driver: &str) -> Result<Vec<Network>, RuntimeError>;

    async fn inspect_network(&self, id: &str) -> Result<Network, RuntimeError>;

    async fn list_services(&self) -> Result<Vec<Service>, RuntimeError>;

    async fn info(&self) -> Result<SystemInfo, RuntimeError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Subscribe to daemon events matching the given server-side filters.
    fn events(&self, filters: HashMap<String, Vec<String>>) -> EventStream;
}

/// Produces fresh runtime handles for an endpoint.
pub trait RuntimeConnector: Send + Sync {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn ContainerRuntime>, RuntimeError>;
}
