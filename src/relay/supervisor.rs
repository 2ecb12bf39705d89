//! Task ownership for the consumption loop
//!
//! The loop runs on its own tokio task. The [`Supervisor`] keeps the join
//! handle and the shutdown sender so the process can stop it between
//! deliveries and learn why it ended.

use crate::forwarder::Forwarder;
use crate::relay::consumer::{LoopExit, Relay};
use crate::transport::DeliveryStream;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Consumption task panicked or was cancelled: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
    #[error("Consumption task already failed")]
    AlreadyFailed,
}

/// Owner of the running consumption loop
pub struct Supervisor {
    handle: JoinHandle<LoopExit>,
    shutdown_tx: watch::Sender<bool>,
    exit: Option<LoopExit>,
    failed: bool,
}

impl Supervisor {
    /// Spawn `relay` over `deliveries` on a new task
    pub fn spawn<F>(relay: Relay<F>, deliveries: DeliveryStream) -> Self
    where
        F: Forwarder + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { relay.run(deliveries, shutdown_rx).await });
        info!("Consumption loop started");

        Self {
            handle,
            shutdown_tx,
            exit: None,
            failed: false,
        }
    }

    /// Whether the loop has already ended
    pub fn is_finished(&self) -> bool {
        self.exit.is_some() || self.failed || self.handle.is_finished()
    }

    /// Signal the loop to stop and wait for it
    ///
    /// A delivery in progress is settled before the loop exits.
    pub async fn shutdown(mut self) -> Result<LoopExit, SupervisorError> {
        info!("Stopping consumption loop");
        // Send fails only when the loop already dropped its receiver
        let _ = self.shutdown_tx.send(true);
        self.wait().await
    }

    /// Wait for the loop to end on its own
    ///
    /// Cancel safe, and repeated calls return the same exit.
    pub async fn wait(&mut self) -> Result<LoopExit, SupervisorError> {
        if let Some(exit) = &self.exit {
            return Ok(exit.clone());
        }
        if self.failed {
            return Err(SupervisorError::AlreadyFailed);
        }
        let exit = (&mut self.handle).await.map_err(|e| {
            error!("Consumption task failed: {}", e);
            self.failed = true;
            SupervisorError::from(e)
        })?;
        self.exit = Some(exit.clone());
        Ok(exit)
    }
}
