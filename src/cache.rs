//! Network-parameter and service-IP caches.
//!
//! Both tables are rebuilt from the daemon on demand and never persisted.
//! Each exposes only whole operations; no caller ever holds a reference
//! into the maps.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bollard::models::Service;
use log::{debug, error};
use tokio::sync::{Mutex, RwLock};

use crate::error::QueryError;
use crate::types::NetworkParams;

/// Docker network ID -> parameters of that network.
#[derive(Default)]
pub struct NetworkParamsTable {
    entries: RwLock<HashMap<String, NetworkParams>>,
}

impl NetworkParamsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, network_id: &str) -> Option<NetworkParams> {
        self.entries.read().await.get(network_id).cloned()
    }

    /// Replace the entry for `network_id` wholesale.
    pub async fn put(&self, network_id: &str, params: NetworkParams) {
        self.entries
            .write()
            .await
            .insert(network_id.to_string(), params);
    }

    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn snapshot(&self) -> HashMap<String, NetworkParams> {
        self.entries.read().await.clone()
    }
}

/// Resolves a docker network ID to its parameters, fetching from the
/// daemon when the network is not cached yet.
#[async_trait]
pub trait NetworkResolver: Send + Sync {
    async fn resolve_network(&self, network_id: &str) -> Result<NetworkParams, QueryError>;
}

/// Pool ID -> service virtual IPs allocated on that network.
#[derive(Default)]
pub struct ServiceIpTable {
    pools: Mutex<HashMap<String, HashSet<String>>>,
}

impl ServiceIpTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_set(&self, pool_id: &str) -> Option<HashSet<String>> {
        self.pools.lock().await.get(pool_id).cloned()
    }

    /// Replace the table contents with the virtual IPs of `services`.
    ///
    /// The lock is held from the clear until the last insert, so readers
    /// see either the previous generation or the new one.  A resolution
    /// failure stops the scan; whatever was inserted before it stays until
    /// the next rebuild.
    pub async fn rebuild_from<R>(
        &self,
        services: &[Service],
        resolver: &R,
    ) -> Result<usize, QueryError>
    where
        R: NetworkResolver + ?Sized,
    {
        let mut pools = self.pools.lock().await;
        pools.clear();

        let mut count = 0;
        for service in services {
            let Some(vips) = service.endpoint.as_ref().and_then(|e| e.virtual_ips.as_ref()) else {
                continue;
            };
            for vip in vips {
                let (Some(network_id), Some(addr)) =
                    (vip.network_id.as_deref(), vip.addr.as_deref())
                else {
                    continue;
                };
                if addr.is_empty() {
                    continue;
                }
                let params = match resolver.resolve_network(network_id).await {
                    Ok(params) => params,
                    Err(e) => {
                        error!("Fetching network opts from network ID failed with error: {}", e);
                        return Err(e);
                    }
                };
                pools
                    .entry(params.pool_id())
                    .or_default()
                    .insert(addr.to_string());
                count += 1;
            }
        }
        debug!("service IP cache rebuilt with {} addresses", count);
        Ok(count)
    }

    /// Whether `ip` is a service virtual IP on the network described by `params`.
    pub async fn is_service_ip(&self, params: &NetworkParams, ip: &str) -> bool {
        self.pools
            .lock()
            .await
            .get(&params.pool_id())
            .is_some_and(|set| set.contains(ip))
    }
}
