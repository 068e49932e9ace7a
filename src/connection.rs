//! Live connection to the container runtime daemon.
//!
//! The connection owns the current runtime handle together with a
//! generation counter.  A handle is never mutated; recovery swaps in a new
//! one and bumps the generation.  Callers that hit a connectivity error
//! report the generation they were using, so only the first reporter of a
//! given generation actually reconnects and everyone else just waits for
//! it to finish.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;

use crate::error::RuntimeError;
use crate::runtime::{ContainerRuntime, RuntimeConnector};

struct Slot {
    generation: u64,
    handle: Arc<dyn ContainerRuntime>,
}

pub struct DaemonConnection {
    endpoint: String,
    connector: Arc<dyn RuntimeConnector>,
    backoff: Duration,
    slot: RwLock<Slot>,
    recovery: Mutex<()>,
}

impl DaemonConnection {
    pub fn connect(
        endpoint: &str,
        connector: Arc<dyn RuntimeConnector>,
        backoff: Duration,
    ) -> Result<Self, RuntimeError> {
        let handle = connector.connect(endpoint).map_err(|e| {
            error!("Connecting to docker client failed with error {}", e);
            e
        })?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            connector,
            backoff,
            slot: RwLock::new(Slot {
                generation: 0,
                handle,
            }),
            recovery: Mutex::new(()),
        })
    }

    /// Current handle and the generation it belongs to.
    pub async fn handle(&self) -> (u64, Arc<dyn ContainerRuntime>) {
        let slot = self.slot.read().await;
        (slot.generation, Arc::clone(&slot.handle))
    }

    /// Number of completed recoveries.
    pub async fn generation(&self) -> u64 {
        self.slot.read().await.generation
    }

    pub async fn probe(handle: &dyn ContainerRuntime) -> bool {
        handle.ping().await.is_ok()
    }

    /// Run `op` against the current handle.  Connectivity failures are
    /// retried against the recovered handle until `op` succeeds or fails
    /// for another reason; every other error is returned as is.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, RuntimeError>
    where
        F: Fn(Arc<dyn ContainerRuntime>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, RuntimeError>> + Send,
        T: Send,
    {
        loop {
            let (generation, handle) = self.handle().await;
            match op(handle).await {
                Err(e) if e.is_connectivity() => {
                    warn!("{}", e);
                    self.recover(generation).await;
                }
                result => return result,
            }
        }
    }

    /// Bring the connection back after a failure observed on `seen`.
    ///
    /// Returns once a generation newer than `seen` is active.  Concurrent
    /// callers queue on the recovery lock and return immediately if the
    /// holder already moved the generation on.
    pub async fn recover(&self, seen: u64) {
        let _flight = self.recovery.lock().await;

        let (generation, current) = self.handle().await;
        if generation != seen {
            debug!("docker connection already recovered (generation {})", generation);
            return;
        }

        if Self::probe(current.as_ref()).await {
            self.slot.write().await.generation += 1;
            info!("docker connection is active");
            return;
        }

        error!(
            "Ping to docker host failed. Will try to reconnect every {:?}",
            self.backoff
        );
        loop {
            match self.connector.connect(&self.endpoint) {
                Ok(handle) => {
                    if Self::probe(handle.as_ref()).await {
                        let mut slot = self.slot.write().await;
                        slot.generation += 1;
                        slot.handle = handle;
                        info!("docker connection is now active");
                        return;
                    }
                    debug!("docker host at {} still not answering", self.endpoint);
                }
                Err(e) => debug!("Reconnecting to docker failed: {}", e),
            }
            sleep(self.backoff).await;
        }
    }
}
