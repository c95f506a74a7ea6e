//! DPR curve calculation behind an async seam.
//!
//! [`DprCurveCalculator`] is what the delta engine and the stores talk to.
//! [`DprWorker`] runs the calculation on a background task fed by a command
//! channel and answers over oneshot replies; [`LocalCalculator`] computes
//! inline on the caller's task.

use crate::build::BuildConfiguration;
use crate::dpr::{calculate_dpr_curves, DprConfiguration, DprCurves, DprError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Computes DPR curves for a build.
///
/// `Ok(None)` means the calculator produced nothing for this call; callers
/// treat it as a failure.
#[async_trait]
pub trait DprCurveCalculator: Send + Sync {
    /// Resolves once the calculator can serve requests.
    async fn ready(&self);

    async fn calculate_dpr_curves(
        &self,
        build: &BuildConfiguration,
        config: &DprConfiguration,
    ) -> Result<Option<DprCurves>, DprError>;
}

#[async_trait]
impl<T: DprCurveCalculator + ?Sized> DprCurveCalculator for Arc<T> {
    async fn ready(&self) {
        (**self).ready().await
    }

    async fn calculate_dpr_curves(
        &self,
        build: &BuildConfiguration,
        config: &DprConfiguration,
    ) -> Result<Option<DprCurves>, DprError> {
        (**self).calculate_dpr_curves(build, config).await
    }
}

/// Calculates on the calling task. Always ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCalculator;

#[async_trait]
impl DprCurveCalculator for LocalCalculator {
    async fn ready(&self) {}

    async fn calculate_dpr_curves(
        &self,
        build: &BuildConfiguration,
        config: &DprConfiguration,
    ) -> Result<Option<DprCurves>, DprError> {
        calculate_dpr_curves(build, config).map(Some)
    }
}

/// Commands accepted by the DPR worker.
pub enum Command {
    Calculate {
        build: Box<BuildConfiguration>,
        config: DprConfiguration,
        reply: oneshot::Sender<Result<DprCurves, DprError>>,
    },

    /// Stop accepting commands. In-flight calculations still reply.
    Shutdown,
}

/// Background worker that owns DPR calculation.
pub struct DprWorker {
    command_rx: mpsc::Receiver<Command>,
    ready_tx: watch::Sender<bool>,
}

impl DprWorker {
    /// Create a worker and the handle that talks to it. The worker does not
    /// run until [`DprWorker::run`] is polled.
    pub fn new(queue_size: usize) -> (Self, DprWorkerHandle) {
        let (command_tx, command_rx) = mpsc::channel(queue_size.max(1));
        let (ready_tx, ready_rx) = watch::channel(false);
        let worker = Self {
            command_rx,
            ready_tx,
        };
        let handle = DprWorkerHandle {
            command_tx,
            ready_rx,
        };
        (worker, handle)
    }

    /// Create a worker and run it on the current runtime.
    pub fn spawn(queue_size: usize) -> (DprWorkerHandle, JoinHandle<()>) {
        let (worker, handle) = Self::new(queue_size);
        let task = tokio::spawn(worker.run());
        (handle, task)
    }

    /// Main worker loop.
    pub async fn run(mut self) {
        info!("DprWorker started");
        self.ready_tx.send_replace(true);

        while let Some(command) = self.command_rx.recv().await {
            match command {
                Command::Calculate {
                    build,
                    config,
                    reply,
                } => {
                    debug!(build = %build.id, "DprWorker received calculation");
                    // Requests are answered concurrently, not in arrival order.
                    tokio::spawn(async move {
                        let result =
                            tokio::task::spawn_blocking(move || calculate_dpr_curves(&build, &config))
                                .await
                                .unwrap_or_else(|e| Err(DprError::Failed(e.to_string())));
                        if reply.send(result).is_err() {
                            debug!("DPR result dropped: requester went away");
                        }
                    });
                }
                Command::Shutdown => {
                    info!("DprWorker shutting down");
                    break;
                }
            }
        }

        self.ready_tx.send_replace(false);
    }
}

/// Client-facing handle to the DPR worker.
#[derive(Clone)]
pub struct DprWorkerHandle {
    command_tx: mpsc::Sender<Command>,
    ready_rx: watch::Receiver<bool>,
}

impl DprWorkerHandle {
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Ask the worker to stop.
    pub async fn shutdown(&self) -> Result<(), DprError> {
        self.command_tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| DprError::WorkerUnavailable)
    }
}

#[async_trait]
impl DprCurveCalculator for DprWorkerHandle {
    async fn ready(&self) {
        let mut ready_rx = self.ready_rx.clone();
        if ready_rx.wait_for(|ready| *ready).await.is_err() {
            warn!("DprWorker dropped before becoming ready");
        }
    }

    async fn calculate_dpr_curves(
        &self,
        build: &BuildConfiguration,
        config: &DprConfiguration,
    ) -> Result<Option<DprCurves>, DprError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::Calculate {
                build: Box::new(build.clone()),
                config: config.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| DprError::WorkerUnavailable)?;

        reply_rx
            .await
            .map_err(|_| DprError::WorkerUnavailable)?
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CharacterClass;
    use crate::dice::Advantage;

    fn fighter() -> BuildConfiguration {
        BuildConfiguration::new("Fighter")
            .with_levels(CharacterClass::Fighter, 5)
            .with_main_hand("greatsword")
    }

    #[tokio::test]
    async fn test_worker_matches_local() {
        let (handle, _task) = DprWorker::spawn(8);
        handle.ready().await;
        assert!(handle.is_ready());

        let config = DprConfiguration::default();
        let remote = handle
            .calculate_dpr_curves(&fighter(), &config)
            .await
            .unwrap()
            .unwrap();
        let local = LocalCalculator
            .calculate_dpr_curves(&fighter(), &config)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(remote, local);
        assert!(remote.dpr_at(Advantage::Normal, 16).is_some());
    }

    #[tokio::test]
    async fn test_worker_not_ready_before_run() {
        let (_worker, handle) = DprWorker::new(8);
        assert!(!handle.is_ready());
    }

    #[tokio::test]
    async fn test_worker_propagates_build_errors() {
        let (handle, _task) = DprWorker::spawn(8);
        let empty = BuildConfiguration::new("Nobody");
        let result = handle
            .calculate_dpr_curves(&empty, &DprConfiguration::default())
            .await;
        assert!(matches!(result, Err(DprError::Build(_))));
    }

    #[tokio::test]
    async fn test_worker_unavailable_after_shutdown() {
        let (handle, task) = DprWorker::spawn(8);
        handle.ready().await;
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(!handle.is_ready());
        let result = handle
            .calculate_dpr_curves(&fighter(), &DprConfiguration::default())
            .await;
        assert_eq!(result, Err(DprError::WorkerUnavailable));
    }
}
