//! nuage-docker daemon entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;
use tokio::sync::{mpsc, oneshot};

use nuage_docker::runtime::DockerConnector;
use nuage_docker::{Channels, Config, DockerClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting nuage-docker with config: {:?}", cfg);

    let client = DockerClient::new(&cfg, Arc::new(DockerConnector))?;

    // The host plugin hands clones of `request_tx` to its network and IPAM
    // drivers.  Run standalone, nothing sends on it and the dispatcher just
    // waits for the stop signal.
    let (request_tx, request_rx) = mpsc::channel(128);
    let (stop_tx, stop_rx) = oneshot::channel();
    let (control_plane_tx, mut control_plane_rx) = mpsc::channel(128);

    let control_plane_handle = tokio::spawn(async move {
        while let Some(metadata) = control_plane_rx.recv().await {
            match serde_json::to_string(&metadata) {
                Ok(json) => info!("Container network update: {}", json),
                Err(e) => error!("Failed to serialize container metadata: {}", e),
            }
        }
    });

    let client_handle = tokio::spawn(client.start(Channels {
        requests: request_rx,
        stop: stop_rx,
        control_plane: control_plane_tx,
    }));

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    let _ = stop_tx.send(());
    drop(request_tx);
    if let Err(e) = client_handle.await {
        error!("Docker client task failed: {}", e);
    }
    control_plane_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
