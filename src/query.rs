//! Query facade over the daemon connection.
//!
//! Every daemon call goes through [`DaemonConnection::execute`], so an
//! outage makes these calls wait for reconnection instead of failing.
//!
//! [`DaemonConnection::execute`]: crate::connection::DaemonConnection::execute

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::models::{ContainerSummary, Ipam, LocalNodeState, Network, SystemInfo};
use ipnet::IpNet;
use log::{debug, error};

use crate::cache::NetworkResolver;
use crate::context::Context;
use crate::error::QueryError;
use crate::types::{ContainerEventMetadata, NetworkParams};

#[derive(Clone)]
pub struct QueryFacade {
    ctx: Arc<Context>,
}

impl QueryFacade {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>, QueryError> {
        let containers = self
            .ctx
            .connection
            .execute(|rt| async move { rt.list_containers().await })
            .await
            .map_err(|e| {
                error!("Getting list of running containers failed with error: {}", e);
                e
            })?;
        debug!("number of containers in docker ps = {}", containers.len());
        Ok(containers)
    }

    /// Networks created with `driver`, filtered by the daemon.
    pub async fn list_networks(&self, driver: &str) -> Result<Vec<Network>, QueryError> {
        let networks = self
            .ctx
            .connection
            .execute(|rt| {
                let driver = driver.to_string();
                async move { rt.list_networks(&driver).await }
            })
            .await
            .map_err(|e| {
                error!("Retrieving existing networks from docker failed with error: {}", e);
                e
            })?;
        Ok(networks)
    }

    async fn sdn_networks(&self) -> Result<Vec<Network>, QueryError> {
        self.list_networks(&self.ctx.network_type).await
    }

    /// Inspect one network and cache its parameters.
    pub async fn inspect_network(&self, network_id: &str) -> Result<NetworkParams, QueryError> {
        let network = self
            .ctx
            .connection
            .execute(|rt| {
                let id = network_id.to_string();
                async move { rt.inspect_network(&id).await }
            })
            .await
            .map_err(|e| {
                error!("Inspecting network {} failed with error: {}", network_id, e);
                e
            })?;

        let params = params_from_first_config(network.ipam.unwrap_or_default())
            .ok_or_else(|| QueryError::NetworkConfigMissing(network_id.to_string()))?;
        self.ctx.networks.put(network_id, params.clone()).await;
        Ok(params)
    }

    /// Fails with [`QueryError::OverlappingNetwork`] when `candidate`
    /// collides with an existing SDN network: same identity fields and
    /// subnets that contain one another.  A malformed CIDR anywhere fails
    /// the whole check.
    pub async fn check_network_overlap(&self, candidate: &NetworkParams) -> Result<(), QueryError> {
        let networks = self.sdn_networks().await?;
        let new_subnet = parse_cidr(&candidate.subnet_cidr)?;

        for network in networks {
            let ipam = network.ipam.unwrap_or_default();
            let existing = NetworkParams::from_ipam_options(&ipam.options.unwrap_or_default());
            let matching = existing.same_network_opts(candidate);

            let mut overlapping = false;
            for config in ipam.config.unwrap_or_default() {
                let subnet = parse_cidr(config.subnet.as_deref().unwrap_or_default())?;
                if new_subnet.contains(&subnet.network())
                    || subnet.contains(&new_subnet.network())
                {
                    overlapping = true;
                }
            }

            if matching && overlapping {
                debug!(
                    "Network options and subnet {} overlap with network {}",
                    candidate.subnet_cidr,
                    network.id.as_deref().unwrap_or_default()
                );
                return Err(QueryError::OverlappingNetwork);
            }
        }
        Ok(())
    }

    /// Parameters of the first SDN network whose pool ID is `pool_id`.
    pub async fn resolve_by_pool_id(&self, pool_id: &str) -> Result<NetworkParams, QueryError> {
        for network in self.sdn_networks().await? {
            let Some(params) = network.ipam.and_then(params_from_first_config) else {
                continue;
            };
            if params.pool_id() == pool_id {
                return Ok(params);
            }
        }
        Err(QueryError::PoolIdNotFound(pool_id.to_string()))
    }

    async fn info(&self) -> Result<SystemInfo, QueryError> {
        let info = self
            .ctx
            .connection
            .execute(|rt| async move { rt.info().await })
            .await
            .map_err(|e| {
                error!("Fetching docker node info for this node failed: {}", e);
                e
            })?;
        Ok(info)
    }

    pub async fn is_swarm_enabled(&self) -> Result<bool, QueryError> {
        Ok(swarm_active(&self.info().await?))
    }

    /// Whether this node is an acting swarm manager.  Errors when the node
    /// is not part of a swarm at all.
    pub async fn is_swarm_manager(&self) -> Result<bool, QueryError> {
        let info = self.info().await?;
        if !swarm_active(&info) {
            return Err(QueryError::SwarmNotEnabled);
        }
        Ok(info
            .swarm
            .and_then(|s| s.control_available)
            .unwrap_or(false))
    }

    pub async fn get_all_network_opts(&self) -> HashMap<String, NetworkParams> {
        self.ctx.networks.snapshot().await
    }

    pub async fn is_service_ip(&self, metadata: &ContainerEventMetadata) -> bool {
        self.ctx
            .service_ips
            .is_service_ip(&metadata.network_params, &metadata.ip_address)
            .await
    }

    /// Populate the network table from a full scan of SDN networks.
    pub async fn rebuild_network_table(&self) -> Result<usize, QueryError> {
        let networks = self.sdn_networks().await?;
        let mut count = 0;
        for network in networks {
            let Some(id) = network.id else { continue };
            let ipam = network.ipam.unwrap_or_default();
            let mut params = NetworkParams::from_ipam_options(&ipam.options.unwrap_or_default());
            if let Some(config) = ipam.config.unwrap_or_default().pop() {
                params.subnet_cidr = config.subnet.unwrap_or_default();
                params.gateway = config.gateway.unwrap_or_default();
            }
            self.ctx.networks.put(&id, params).await;
            count += 1;
        }
        debug!("network cache populated with {} networks", count);
        Ok(count)
    }

    /// Rebuild the service-IP table when this node manages the swarm.
    /// Returns `Ok(None)` when the node is not a manager.
    pub async fn refresh_service_ips(&self) -> Result<Option<usize>, QueryError> {
        match self.is_swarm_manager().await {
            Ok(true) => {}
            Ok(false) | Err(QueryError::SwarmNotEnabled) => return Ok(None),
            Err(e) => return Err(e),
        }
        let services = self
            .ctx
            .connection
            .execute(|rt| async move { rt.list_services().await })
            .await
            .map_err(|e| {
                error!("Fetching list of services from docker daemon failed with error: {}", e);
                e
            })?;
        let count = self.ctx.service_ips.rebuild_from(&services, self).await?;
        Ok(Some(count))
    }
}

#[async_trait]
impl NetworkResolver for QueryFacade {
    async fn resolve_network(&self, network_id: &str) -> Result<NetworkParams, QueryError> {
        match self.ctx.networks.get(network_id).await {
            Some(params) => Ok(params),
            None => self.inspect_network(network_id).await,
        }
    }
}

fn params_from_first_config(ipam: Ipam) -> Option<NetworkParams> {
    let options = ipam.options.filter(|o| !o.is_empty())?;
    let config = ipam.config.and_then(|c| c.into_iter().next())?;
    let mut params = NetworkParams::from_ipam_options(&options);
    params.subnet_cidr = config.subnet.unwrap_or_default();
    params.gateway = config.gateway.unwrap_or_default();
    Some(params)
}

fn parse_cidr(cidr: &str) -> Result<IpNet, QueryError> {
    cidr.parse::<IpNet>().map_err(|source| {
        error!("ParseCIDR failed for address {} with error: {}", cidr, source);
        QueryError::InvalidCidr {
            cidr: cidr.to_string(),
            source,
        }
    })
}

fn swarm_active(info: &SystemInfo) -> bool {
    matches!(
        info.swarm.as_ref().and_then(|s| s.local_node_state.as_ref()),
        Some(LocalNodeState::ACTIVE)
    )
}
