//! Request/reply front end used by the rest of the plugin.
//!
//! Callers send a [`DockerRequest`] carrying its own reply sender and
//! await the answer; [`call`] wraps that round trip.  Every request is
//! served on its own task so one caller stuck behind a daemon outage does
//! not hold up the others.

use std::collections::HashMap;

use bollard::models::ContainerSummary;
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::error::{CallError, QueryError};
use crate::query::QueryFacade;
use crate::types::{ContainerEventMetadata, NetworkParams};

pub type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub enum DockerRequest {
    CheckNetworkOverlap {
        params: NetworkParams,
        reply: Reply<Result<(), QueryError>>,
    },
    InspectNetworkById {
        network_id: String,
        reply: Reply<Result<NetworkParams, QueryError>>,
    },
    ResolvePoolId {
        pool_id: String,
        reply: Reply<Result<NetworkParams, QueryError>>,
    },
    ListContainers {
        reply: Reply<Result<Vec<ContainerSummary>, QueryError>>,
    },
    GetAllNetworkOpts {
        reply: Reply<HashMap<String, NetworkParams>>,
    },
    IsSwarmEnabled {
        reply: Reply<Result<bool, QueryError>>,
    },
    IsSwarmManager {
        reply: Reply<Result<bool, QueryError>>,
    },
    IsServiceIp {
        metadata: ContainerEventMetadata,
        reply: Reply<bool>,
    },
}

impl DockerRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            DockerRequest::CheckNetworkOverlap { .. } => "CheckNetworkOverlap",
            DockerRequest::InspectNetworkById { .. } => "InspectNetworkById",
            DockerRequest::ResolvePoolId { .. } => "ResolvePoolId",
            DockerRequest::ListContainers { .. } => "ListContainers",
            DockerRequest::GetAllNetworkOpts { .. } => "GetAllNetworkOpts",
            DockerRequest::IsSwarmEnabled { .. } => "IsSwarmEnabled",
            DockerRequest::IsSwarmManager { .. } => "IsSwarmManager",
            DockerRequest::IsServiceIp { .. } => "IsServiceIp",
        }
    }
}

/// Send a request built by `build` and wait for its reply.
///
/// ```ignore
/// let enabled = call(&tx, |reply| DockerRequest::IsSwarmEnabled { reply }).await??;
/// ```
pub async fn call<T>(
    requests: &mpsc::Sender<DockerRequest>,
    build: impl FnOnce(Reply<T>) -> DockerRequest,
) -> Result<T, CallError> {
    let (reply, response) = oneshot::channel();
    requests
        .send(build(reply))
        .await
        .map_err(|_| CallError::ChannelClosed)?;
    response.await.map_err(|_| CallError::NoReply)
}

#[derive(Clone)]
pub struct Dispatcher {
    facade: QueryFacade,
}

impl Dispatcher {
    pub fn new(facade: QueryFacade) -> Self {
        Self { facade }
    }

    /// Serve requests until `stop` fires or every request sender is gone.
    pub async fn run(
        self,
        mut requests: mpsc::Receiver<DockerRequest>,
        mut stop: oneshot::Receiver<()>,
    ) {
        info!("Docker request dispatcher started");
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => {
                        let dispatcher = self.clone();
                        tokio::spawn(async move { dispatcher.handle(request).await });
                    }
                    None => {
                        info!("Docker request channel closed");
                        return;
                    }
                },
                _ = &mut stop => {
                    info!("Docker request dispatcher stopping");
                    return;
                }
            }
        }
    }

    /// Serve one request and publish exactly one reply.
    pub async fn handle(&self, request: DockerRequest) {
        let kind = request.kind();
        debug!("Received a docker request {}", kind);
        let facade = &self.facade;
        match request {
            DockerRequest::CheckNetworkOverlap { params, reply } => {
                respond(kind, reply, facade.check_network_overlap(&params).await)
            }
            DockerRequest::InspectNetworkById { network_id, reply } => {
                respond(kind, reply, facade.inspect_network(&network_id).await)
            }
            DockerRequest::ResolvePoolId { pool_id, reply } => {
                respond(kind, reply, facade.resolve_by_pool_id(&pool_id).await)
            }
            DockerRequest::ListContainers { reply } => {
                respond(kind, reply, facade.list_containers().await)
            }
            DockerRequest::GetAllNetworkOpts { reply } => {
                respond(kind, reply, facade.get_all_network_opts().await)
            }
            DockerRequest::IsSwarmEnabled { reply } => {
                respond(kind, reply, facade.is_swarm_enabled().await)
            }
            DockerRequest::IsSwarmManager { reply } => {
                respond(kind, reply, facade.is_swarm_manager().await)
            }
            DockerRequest::IsServiceIp { metadata, reply } => {
                respond(kind, reply, facade.is_service_ip(&metadata).await)
            }
        }
        debug!("Served docker request {}", kind);
    }
}

fn respond<T>(kind: &str, reply: Reply<T>, value: T) {
    if reply.send(value).is_err() {
        warn!("Requester of {} went away before the reply", kind);
    }
}
