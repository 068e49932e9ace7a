//! In-memory container runtime for tests.
//!
//! [`FakeRuntime`] serves canned containers, networks and services from
//! shared state and can be scripted to fail a number of calls or pings
//! with connectivity errors.  Every handle produced by [`FakeConnector`]
//! shares the same state, so a "reconnect" lands on the same daemon.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerSummary, EndpointSettings, EventActor,
    EventMessage, Ipam, IpamConfig, LocalNodeState, Network, NetworkSettings, Service,
    ServiceEndpoint, ServiceEndpointVirtualIps, SwarmInfo, SystemInfo,
};
use futures_util::stream::{self, StreamExt};

use super::{ContainerRuntime, EventStream, RuntimeConnector};
use crate::error::RuntimeError;
use crate::types::{OPT_DOMAIN, OPT_ORGANIZATION, OPT_SUBNET, OPT_USER, OPT_ZONE};

/// Mutable daemon state behind the fake.
#[derive(Default)]
pub struct FakeState {
    pub containers: Vec<ContainerSummary>,
    pub inspects: HashMap<String, ContainerInspectResponse>,
    pub networks: Vec<Network>,
    pub services: Vec<Service>,
    pub info: SystemInfo,
    /// Number of upcoming API calls that fail as unreachable.
    pub failing_calls: usize,
    /// Number of upcoming pings that fail.
    pub failing_pings: usize,
    /// One entry per future `events()` subscription.
    pub subscriptions: VecDeque<Vec<Result<EventMessage, RuntimeError>>>,
    pub subscribe_count: usize,
    pub inspect_network_calls: usize,
    pub list_services_calls: usize,
    /// Delay applied to every `inspect_network` after it is counted.
    pub inspect_network_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn take_failure(state: &mut FakeState) -> Result<(), RuntimeError> {
        if state.failing_calls > 0 {
            state.failing_calls -= 1;
            return Err(RuntimeError::Unreachable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let mut state = self.state();
        Self::take_failure(&mut state)?;
        Ok(state.containers.clone())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError> {
        let mut state = self.state();
        Self::take_failure(&mut state)?;
        state
            .inspects
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(format!("No such container: {}", id)))
    }

    async fn list_networks(&self, driver: &str) -> Result<Vec<Network>, RuntimeError> {
        let mut state = self.state();
        Self::take_failure(&mut state)?;
        Ok(state
            .networks
            .iter()
            .filter(|n| n.driver.as_deref() == Some(driver))
            .cloned()
            .collect())
    }

    async fn inspect_network(&self, id: &str) -> Result<Network, RuntimeError> {
        let (found, delay) = {
            let mut state = self.state();
            Self::take_failure(&mut state)?;
            state.inspect_network_calls += 1;
            let found = state
                .networks
                .iter()
                .find(|n| n.id.as_deref() == Some(id))
                .cloned();
            (found, state.inspect_network_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        found.ok_or_else(|| RuntimeError::NotFound(format!("No such network: {}", id)))
    }

    async fn list_services(&self) -> Result<Vec<Service>, RuntimeError> {
        let mut state = self.state();
        Self::take_failure(&mut state)?;
        state.list_services_calls += 1;
        Ok(state.services.clone())
    }

    async fn info(&self) -> Result<SystemInfo, RuntimeError> {
        let mut state = self.state();
        Self::take_failure(&mut state)?;
        Ok(state.info.clone())
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        let mut state = self.state();
        if state.failing_pings > 0 {
            state.failing_pings -= 1;
            return Err(RuntimeError::Unreachable("ping failed".into()));
        }
        Ok(())
    }

    fn events(&self, _filters: HashMap<String, Vec<String>>) -> EventStream {
        let mut state = self.state();
        state.subscribe_count += 1;
        match state.subscriptions.pop_front() {
            Some(items) => stream::iter(items).chain(stream::pending()).boxed(),
            None => stream::pending().boxed(),
        }
    }
}

/// Connector that hands out handles onto one shared [`FakeRuntime`].
pub struct FakeConnector {
    runtime: FakeRuntime,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(runtime: FakeRuntime) -> Self {
        Self {
            runtime,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl RuntimeConnector for FakeConnector {
    fn connect(&self, _endpoint: &str) -> Result<Arc<dyn ContainerRuntime>, RuntimeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.runtime.clone()))
    }
}

// Builders for canned daemon objects.

pub fn sdn_network(
    id: &str,
    driver: &str,
    identity: [&str; 5],
    subnets: &[(&str, &str)],
) -> Network {
    let keys = [OPT_ORGANIZATION, OPT_DOMAIN, OPT_ZONE, OPT_SUBNET, OPT_USER];
    let options = keys
        .iter()
        .zip(identity.iter())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Network {
        id: Some(id.to_string()),
        name: Some(format!("net-{}", id)),
        driver: Some(driver.to_string()),
        ipam: Some(Ipam {
            options: Some(options),
            config: Some(
                subnets
                    .iter()
                    .map(|(subnet, gateway)| IpamConfig {
                        subnet: Some(subnet.to_string()),
                        gateway: Some(gateway.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service(vips: &[(&str, &str)]) -> Service {
    Service {
        endpoint: Some(ServiceEndpoint {
            virtual_ips: Some(
                vips.iter()
                    .map(|(network_id, addr)| ServiceEndpointVirtualIps {
                        network_id: Some(network_id.to_string()),
                        addr: Some(addr.to_string()),
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn swarm_info(state: LocalNodeState, manager: bool) -> SystemInfo {
    SystemInfo {
        swarm: Some(SwarmInfo {
            local_node_state: Some(state),
            control_available: Some(manager),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn container(
    id: &str,
    name: &str,
    env: &[&str],
    networks: &[(&str, &str)],
) -> ContainerInspectResponse {
    ContainerInspectResponse {
        id: Some(id.to_string()),
        name: Some(format!("/{}", name)),
        config: Some(ContainerConfig {
            env: Some(env.iter().map(|e| e.to_string()).collect()),
            ..Default::default()
        }),
        network_settings: Some(NetworkSettings {
            networks: Some(
                networks
                    .iter()
                    .map(|(network_id, ip)| {
                        (
                            format!("net-{}", network_id),
                            EndpointSettings {
                                network_id: Some(network_id.to_string()),
                                ip_address: Some(ip.to_string()),
                                ..Default::default()
                            },
                        )
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn connect_event(network_id: &str, container_id: &str, network_type: &str) -> EventMessage {
    EventMessage {
        action: Some("connect".to_string()),
        actor: Some(EventActor {
            id: Some(network_id.to_string()),
            attributes: Some(HashMap::from([
                ("container".to_string(), container_id.to_string()),
                ("type".to_string(), network_type.to_string()),
            ])),
        }),
        ..Default::default()
    }
}

/// Context wired to `runtime`, with a short reconnect backoff.
pub fn context(runtime: &FakeRuntime, network_type: &str) -> Arc<crate::context::Context> {
    let connector = Arc::new(FakeConnector::new(runtime.clone()));
    let connection = crate::connection::DaemonConnection::connect(
        "unix:///var/run/docker.sock",
        connector,
        Duration::from_millis(5),
    )
    .unwrap();
    Arc::new(crate::context::Context::new(connection, network_type))
}
