//! Network-connect event pipeline.
//!
//! One task holds the daemon subscription and pushes every connect event
//! for an SDN network onto a bounded queue.  A fixed pool of workers
//! drains the queue, inspects the attached container and forwards the
//! enriched record downstream, so a slow inspect never stalls the
//! subscription.  When the stream fails the subscriber waits for the
//! connection to recover and subscribes again; events emitted while the
//! daemon was away are not replayed.

use std::collections::HashMap;
use std::sync::Arc;

use bollard::models::{ContainerInspectResponse, EventMessage};
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::context::Context;
use crate::types::ContainerEventMetadata;

pub const POLICY_GROUP_ENV: &str = "NUAGE-POLICY-GROUP";
pub const ORCHESTRATION_ID_ENV: &str = "MESOS_TASK_ID";

pub struct EventPipeline {
    ctx: Arc<Context>,
    downstream: mpsc::Sender<ContainerEventMetadata>,
    workers: usize,
    queue_depth: usize,
}

impl EventPipeline {
    pub fn new(
        ctx: Arc<Context>,
        downstream: mpsc::Sender<ContainerEventMetadata>,
        workers: usize,
        queue_depth: usize,
    ) -> Self {
        Self {
            ctx,
            downstream,
            workers: workers.max(1),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Start the workers and the subscription loop.
    pub fn spawn(self) -> JoinHandle<()> {
        let (queue_tx, queue_rx) = mpsc::channel(self.queue_depth);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        for worker in 0..self.workers {
            let ctx = Arc::clone(&self.ctx);
            let downstream = self.downstream.clone();
            let queue_rx = Arc::clone(&queue_rx);
            tokio::spawn(async move {
                loop {
                    let next = queue_rx.lock().await.recv().await;
                    match next {
                        Some(event) => process_event(&ctx, event, &downstream).await,
                        None => break,
                    }
                }
                debug!("event worker {} stopped", worker);
            });
        }

        tokio::spawn(subscribe(self.ctx, queue_tx))
    }
}

fn connect_filters() -> HashMap<String, Vec<String>> {
    [("type", "network"), ("event", "connect")]
        .iter()
        .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
        .collect()
}

async fn subscribe(ctx: Arc<Context>, queue: mpsc::Sender<EventMessage>) {
    loop {
        let (generation, runtime) = ctx.connection.handle().await;
        let mut stream = runtime.events(connect_filters());
        info!("Listening for docker network connect events...");

        loop {
            match stream.next().await {
                Some(Ok(event)) => {
                    if !is_sdn_event(&event, &ctx.network_type) {
                        continue;
                    }
                    debug!("got docker event {:?}", event);
                    if queue.send(event).await.is_err() {
                        warn!("Event queue closed, stopping docker event subscription");
                        return;
                    }
                }
                Some(Err(e)) => {
                    error!("Error in docker event stream: {}", e);
                    break;
                }
                None => {
                    warn!("Docker event stream ended");
                    break;
                }
            }
        }

        ctx.connection.recover(generation).await;
    }
}

fn is_sdn_event(event: &EventMessage, network_type: &str) -> bool {
    event
        .actor
        .as_ref()
        .and_then(|a| a.attributes.as_ref())
        .and_then(|attrs| attrs.get("type"))
        .is_some_and(|t| t == network_type)
}

/// Enrich one network-connect event and hand it downstream.  Any failure
/// drops the event.
pub async fn process_event(
    ctx: &Context,
    event: EventMessage,
    downstream: &mpsc::Sender<ContainerEventMetadata>,
) {
    let Some(actor) = event.actor else { return };
    let network_id = actor.id.unwrap_or_default();
    let container_id = actor
        .attributes
        .and_then(|mut attrs| attrs.remove("container"))
        .unwrap_or_default();

    let inspect = match ctx
        .connection
        .execute(|rt| {
            let id = container_id.clone();
            async move { rt.inspect_container(&id).await }
        })
        .await
    {
        Ok(inspect) => inspect,
        Err(e) => {
            error!("Inspect on container {} failed with error {}", container_id, e);
            return;
        }
    };

    let Some(network_params) = ctx.networks.get(&network_id).await else {
        error!("NetworkID {} not found in local cache", network_id);
        return;
    };

    let env = inspect
        .config
        .as_ref()
        .and_then(|c| c.env.clone())
        .unwrap_or_default();
    let metadata = ContainerEventMetadata {
        name: inspect.name.as_deref().unwrap_or_default().replace('/', ""),
        uuid: inspect.id.clone().unwrap_or_default(),
        policy_group: check_policy_group(&env),
        orchestration_id: check_orchestration_id(&env),
        ip_address: ip_on_network(&inspect, &network_id).unwrap_or_default(),
        network_params,
    };

    debug!("forwarding container metadata {:?}", metadata);
    if downstream.send(metadata).await.is_err() {
        warn!("Control plane channel closed, dropping event for container {}", container_id);
    }
}

fn ip_on_network(inspect: &ContainerInspectResponse, network_id: &str) -> Option<String> {
    inspect
        .network_settings
        .as_ref()?
        .networks
        .as_ref()?
        .values()
        .find(|settings| settings.network_id.as_deref() == Some(network_id))
        .and_then(|settings| settings.ip_address.clone())
}

pub fn check_policy_group(vars: &[String]) -> Option<String> {
    check_env_var(POLICY_GROUP_ENV, vars)
}

pub fn check_orchestration_id(vars: &[String]) -> Option<String> {
    check_env_var(ORCHESTRATION_ID_ENV, vars)
}

fn check_env_var(key: &str, vars: &[String]) -> Option<String> {
    vars.iter()
        .filter_map(|var| var.split_once('='))
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value.to_string())
}
