//! Docker adapter for the Nuage SDN network plugin.
//!
//! Keeps a resilient connection to the docker daemon, tracks SDN networks
//! and swarm service VIPs, enriches network-connect events with container
//! metadata for the control plane, and answers docker queries from the
//! rest of the plugin over a request channel.

pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod query;
pub mod runtime;
pub mod types;

pub use client::{Channels, DockerClient};
pub use config::Config;
pub use dispatcher::{call, DockerRequest};
pub use error::{CallError, QueryError, RuntimeError};
pub use types::{ContainerEventMetadata, NetworkParams};
