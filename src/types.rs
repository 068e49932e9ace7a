//! Data structures used throughout the docker adapter.
//!
//! [`NetworkParams`] describes one SDN-backed network as it is encoded in
//! the IPAM options of a docker network.  Its identity fields
//! (organization, domain, zone, subnet name and user) determine the
//! pool ID, a content hash used both as a cache key and as the network
//! pool identifier seen by the rest of the plugin.  CIDR and gateway are
//! carried along but never take part in identity.
//!
//! [`ContainerEventMetadata`] is the enriched record handed to the SDN
//! control plane once per qualifying network-connect event.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// IPAM option keys carrying the network identity.
pub const OPT_ORGANIZATION: &str = "organization";
pub const OPT_DOMAIN: &str = "domain";
pub const OPT_ZONE: &str = "zone";
pub const OPT_SUBNET: &str = "subnet";
pub const OPT_USER: &str = "user";

/// Parameters of one SDN-backed network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub organization: String,
    pub domain: String,
    pub zone: String,
    pub subnet_name: String,
    pub user: String,
    pub subnet_cidr: String,
    pub gateway: String,
}

impl NetworkParams {
    /// Read the identity fields from a network's IPAM driver options.
    /// Missing keys are left empty.
    pub fn from_ipam_options(options: &HashMap<String, String>) -> Self {
        let get = |key: &str| options.get(key).cloned().unwrap_or_default();
        Self {
            organization: get(OPT_ORGANIZATION),
            domain: get(OPT_DOMAIN),
            zone: get(OPT_ZONE),
            subnet_name: get(OPT_SUBNET),
            user: get(OPT_USER),
            ..Default::default()
        }
    }

    /// Two parameter sets describe the same network iff their identity
    /// fields match.
    pub fn same_network_opts(&self, other: &NetworkParams) -> bool {
        self.identity() == other.identity()
    }

    /// Deterministic pool ID derived from the identity fields: hex SHA-256
    /// over the length-prefixed fields.  `ResolvePoolId` only matches IDs
    /// minted here, not MD5 IDs from older plugin builds.
    pub fn pool_id(&self) -> String {
        let mut hasher = Sha256::new();
        for field in self.identity() {
            // Length prefix keeps ("ab", "c") and ("a", "bc") apart.
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    fn identity(&self) -> [&str; 5] {
        [
            &self.organization,
            &self.domain,
            &self.zone,
            &self.subnet_name,
            &self.user,
        ]
    }
}

/// Container details forwarded to the control plane after a container
/// joins an SDN network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEventMetadata {
    pub name: String,
    pub uuid: String,
    pub policy_group: Option<String>,
    pub orchestration_id: Option<String>,
    pub ip_address: String,
    pub network_params: NetworkParams,
}
