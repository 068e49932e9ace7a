//! Startup and wiring of the docker adapter.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::Config;
use crate::connection::DaemonConnection;
use crate::context::Context;
use crate::dispatcher::{Dispatcher, DockerRequest};
use crate::events::EventPipeline;
use crate::query::QueryFacade;
use crate::runtime::RuntimeConnector;
use crate::types::ContainerEventMetadata;

/// Channels connecting the adapter to the rest of the plugin.
pub struct Channels {
    pub requests: mpsc::Receiver<DockerRequest>,
    pub stop: oneshot::Receiver<()>,
    pub control_plane: mpsc::Sender<ContainerEventMetadata>,
}

pub struct DockerClient {
    facade: QueryFacade,
    service_ip_refresh: Duration,
    event_workers: usize,
    event_queue_depth: usize,
}

impl DockerClient {
    pub fn new(config: &Config, connector: Arc<dyn RuntimeConnector>) -> anyhow::Result<Self> {
        let connection = DaemonConnection::connect(
            &config.docker_socket,
            connector,
            config.reconnect_backoff(),
        )?;
        let ctx = Arc::new(Context::new(connection, config.network_type()?));
        debug!("Finished initializing docker module");
        Ok(Self {
            facade: QueryFacade::new(ctx),
            service_ip_refresh: config.service_ip_refresh(),
            event_workers: config.event_workers,
            event_queue_depth: config.event_queue_depth,
        })
    }

    pub fn facade(&self) -> &QueryFacade {
        &self.facade
    }

    /// Warm the caches, start the background tasks and serve requests
    /// until stopped.  On return the event subscription is aborted and the
    /// refresher is told to stop; a rebuild already running finishes
    /// first.
    pub async fn start(self, channels: Channels) {
        info!("Starting docker client");

        if let Err(e) = self.facade.rebuild_network_table().await {
            error!("Fetching network list from docker failed with error {}", e);
        }

        let (refresh_stop, refresh_stopped) = watch::channel(false);
        spawn_service_ip_refresher(
            self.facade.clone(),
            self.service_ip_refresh,
            refresh_stopped,
        );
        let pipeline = EventPipeline::new(
            Arc::clone(self.facade.context()),
            channels.control_plane,
            self.event_workers,
            self.event_queue_depth,
        )
        .spawn();

        Dispatcher::new(self.facade)
            .run(channels.requests, channels.stop)
            .await;

        let _ = refresh_stop.send(true);
        pipeline.abort();
        info!("Docker client stopped");
    }
}

/// Rebuild the service-IP table right away and then every `period`
/// until `stop` flips or its sender goes away.  The stop signal is only
/// observed between cycles.  A failed cycle is logged and the next one
/// starts from scratch.
pub fn spawn_service_ip_refresher(
    facade: QueryFacade,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }
            match facade.refresh_service_ips().await {
                Ok(Some(count)) => debug!("service IP cache holds {} addresses", count),
                Ok(None) => debug!("not a swarm manager, skipping service IP cache"),
                Err(e) => error!("Building service IP cache failed: {}", e),
            }
        }
        debug!("service IP refresher stopped");
    })
}
