//! Error types shared by the connection, cache and query layers.

use thiserror::Error;

/// Text the daemon client reports when the socket cannot be reached.
const UNREACHABLE_SIGNATURE: &str = "Cannot connect to the Docker daemon";

/// Errors raised by a single call against the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Cannot connect to the Docker daemon: {0}")]
    Unreachable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Docker API error: {0}")]
    Api(String),
}

impl RuntimeError {
    /// Whether this failure means the daemon is unreachable and the call
    /// should be retried after the connection recovers.
    pub fn is_connectivity(&self) -> bool {
        match self {
            RuntimeError::Unreachable(_) => true,
            RuntimeError::NotFound(_) => false,
            RuntimeError::Api(msg) => msg.contains(UNREACHABLE_SIGNATURE),
        }
    }
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error as E;
        match err {
            E::IOError { .. }
            | E::HyperLegacyError { .. }
            | E::HyperResponseError { .. }
            | E::SocketNotFoundError(_)
            | E::RequestTimeoutError => RuntimeError::Unreachable(err.to_string()),
            E::DockerResponseServerError {
                status_code: 404,
                message,
            } => RuntimeError::NotFound(message),
            other => {
                let msg = other.to_string();
                if msg.contains(UNREACHABLE_SIGNATURE) {
                    RuntimeError::Unreachable(msg)
                } else {
                    RuntimeError::Api(msg)
                }
            }
        }
    }
}

/// Errors surfaced by the query facade and the caches.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("error reading network {0} information from docker")]
    NetworkConfigMissing(String),
    #[error("network {0} not found in local cache")]
    NetworkNotCached(String),
    #[error("network options with matching poolID {0} not found")]
    PoolIdNotFound(String),
    #[error("invalid CIDR {cidr}: {source}")]
    InvalidCidr {
        cidr: String,
        #[source]
        source: ipnet::AddrParseError,
    },
    #[error("Network options and subnet overlap with existing network")]
    OverlappingNetwork,
    #[error("Swarm is not enabled on this node")]
    SwarmNotEnabled,
}

/// Failures of the request/reply round trip itself.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("docker request channel is closed")]
    ChannelClosed,
    #[error("docker request was dropped without a reply")]
    NoReply,
}
