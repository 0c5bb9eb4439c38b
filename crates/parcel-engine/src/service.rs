// ABOUTME: QueueService bundles the engine and its drain worker into one long-lived, cloneable handle.
// ABOUTME: Producers, the CLI, and the connectivity monitor all hold a clone of the same service.

use std::sync::{Arc, Mutex};

use parcel_core::NewArtifact;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::{DrainReport, EnqueueOutcome, QueueEngine};
use crate::worker::{DrainHandle, DrainWorker, TriggerSource, WorkerError};

struct ServiceInner {
    engine: Arc<QueueEngine>,
    handle: DrainHandle,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// The process-wide delivery queue. Construct once at startup and clone it
/// into every trigger source. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct QueueService {
    inner: Arc<ServiceInner>,
}

impl QueueService {
    /// Take ownership of the engine and spawn its drain worker.
    pub fn new(engine: QueueEngine) -> Self {
        let engine = Arc::new(engine);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, worker) = DrainWorker::spawn(Arc::clone(&engine), shutdown_rx);
        Self {
            inner: Arc::new(ServiceInner {
                engine,
                handle,
                shutdown_tx,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    pub fn engine(&self) -> &QueueEngine {
        &self.inner.engine
    }

    pub fn handle(&self) -> DrainHandle {
        self.inner.handle.clone()
    }

    /// Receiver that flips to true when [`shutdown`](Self::shutdown) runs.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    /// Fire the startup drain so records left by a previous run go out.
    pub fn start(&self) -> bool {
        self.trigger(TriggerSource::Startup)
    }

    /// Enqueue an artifact and, if it was newly queued, request a drain
    /// without waiting for it.
    pub async fn enqueue(&self, artifact: NewArtifact) -> EnqueueOutcome {
        let outcome = self.inner.engine.enqueue(artifact).await;
        if outcome.is_queued() {
            self.trigger(TriggerSource::Enqueued);
        }
        outcome
    }

    pub fn trigger(&self, source: TriggerSource) -> bool {
        self.inner.handle.trigger(source)
    }

    pub async fn drain_now(&self, source: TriggerSource) -> Result<DrainReport, WorkerError> {
        self.inner.handle.drain_now(source).await
    }

    /// Stop after the in-flight record and wait for the worker to exit.
    /// Pending records stay in the store for the next run.
    pub async fn shutdown(&self) {
        self.inner.engine.request_stop();
        self.inner.shutdown_tx.send_replace(true);

        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            tracing::warn!(error = %e, "drain worker ended abnormally");
        }
        tracing::info!("queue service stopped");
    }
}
