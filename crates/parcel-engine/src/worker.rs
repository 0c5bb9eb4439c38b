// ABOUTME: Single-flight drain worker: one tokio task runs drain passes, fed by a bounded request channel.
// ABOUTME: DrainHandle lets trigger sources request passes; overlapping requests coalesce into one follow-up pass.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::engine::{DrainReport, QueueEngine};

/// Errors returned by [`DrainHandle`].
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("drain worker has shut down")]
    Closed,
}

/// Why a drain pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Startup,
    Enqueued,
    ConnectivityRestored,
    Manual,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerSource::Startup => "startup",
            TriggerSource::Enqueued => "enqueued",
            TriggerSource::ConnectivityRestored => "connectivity_restored",
            TriggerSource::Manual => "manual",
        };
        f.write_str(s)
    }
}

pub(crate) struct DrainRequest {
    pub(crate) source: TriggerSource,
    pub(crate) reply: Option<oneshot::Sender<DrainReport>>,
}

/// A capacity of one means at most one pass is ever waiting behind the
/// running one.
const REQUEST_CAPACITY: usize = 1;

pub(crate) fn drain_channel() -> (DrainHandle, mpsc::Receiver<DrainRequest>) {
    let (tx, rx) = mpsc::channel(REQUEST_CAPACITY);
    (DrainHandle { tx }, rx)
}

/// Cloneable handle for requesting drain passes.
#[derive(Clone)]
pub struct DrainHandle {
    tx: mpsc::Sender<DrainRequest>,
}

impl DrainHandle {
    /// Request a pass without waiting for it. Returns false only when the
    /// worker is gone.
    pub fn trigger(&self, source: TriggerSource) -> bool {
        match self.tx.try_send(DrainRequest {
            source,
            reply: None,
        }) {
            Ok(()) => {
                tracing::debug!(source = %source, "drain requested");
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(source = %source, "drain already pending, coalesced");
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(source = %source, "drain worker is gone, trigger ignored");
                false
            }
        }
    }

    /// Request a pass and wait for its report. The pass starts after this call.
    pub async fn drain_now(&self, source: TriggerSource) -> Result<DrainReport, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DrainRequest {
                source,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| WorkerError::Closed)?;
        reply_rx.await.map_err(|_| WorkerError::Closed)
    }
}

/// Owns the pass loop. Only one pass runs at a time.
pub struct DrainWorker {
    engine: Arc<QueueEngine>,
    rx: mpsc::Receiver<DrainRequest>,
    shutdown: watch::Receiver<bool>,
}

impl DrainWorker {
    /// Spawn the worker task. It exits when `shutdown` becomes true or every
    /// handle is dropped.
    pub fn spawn(
        engine: Arc<QueueEngine>,
        shutdown: watch::Receiver<bool>,
    ) -> (DrainHandle, JoinHandle<()>) {
        let (handle, rx) = drain_channel();
        let worker = DrainWorker {
            engine,
            rx,
            shutdown,
        };
        (handle, tokio::spawn(worker.run()))
    }

    async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let next = tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    None
                }
                request = self.rx.recv() => match request {
                    Some(request) => Some(request),
                    None => break,
                },
            };
            // Woken by the shutdown channel; the loop head decides.
            let Some(first) = next else {
                continue;
            };

            let mut sources = vec![first.source];
            let mut waiters: Vec<oneshot::Sender<DrainReport>> = first.reply.into_iter().collect();
            while let Ok(more) = self.rx.try_recv() {
                sources.push(more.source);
                waiters.extend(more.reply);
            }

            tracing::debug!(sources = ?sources, waiters = waiters.len(), "starting drain pass");
            let report = self.engine.drain_pass().await;
            for waiter in waiters {
                // The caller may have given up waiting.
                let _ = waiter.send(report.clone());
            }
        }
        tracing::debug!("drain worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use parcel_core::NewArtifact;
    use parcel_delivery::testing::{RecordingNotifier, ScriptedDeliveryClient};
    use parcel_store::QueueStore;
    use tempfile::TempDir;

    use crate::engine::EngineConfig;

    fn engine(dir: &TempDir, client: Arc<ScriptedDeliveryClient>) -> Arc<QueueEngine> {
        Arc::new(QueueEngine::new(
            Arc::new(QueueStore::open_in_memory().unwrap()),
            client,
            Arc::new(RecordingNotifier::new()),
            EngineConfig::new(dir.path().join("artifacts")),
        ))
    }

    #[tokio::test]
    async fn drain_now_returns_report() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedDeliveryClient::new());
        let engine = engine(&dir, client.clone());
        engine
            .enqueue(NewArtifact::text("hello", "1", Utc::now()))
            .await;
        let (_tx, shutdown) = watch::channel(false);
        let (handle, _join) = DrainWorker::spawn(engine.clone(), shutdown);

        let report = handle.drain_now(TriggerSource::Manual).await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(engine.store().pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn passes_never_overlap() {
        let dir = TempDir::new().unwrap();
        let client =
            Arc::new(ScriptedDeliveryClient::new().with_latency(Duration::from_millis(20)));
        let engine = engine(&dir, client.clone());
        for i in 0..3 {
            engine
                .enqueue(NewArtifact::text(format!("note {}", i), "1", Utc::now()))
                .await;
        }
        let (_tx, shutdown) = watch::channel(false);
        let (handle, _join) = DrainWorker::spawn(engine, shutdown);

        for _ in 0..10 {
            handle.trigger(TriggerSource::Enqueued);
        }
        let a = handle.clone();
        let b = handle.clone();
        let (ra, rb) = tokio::join!(
            a.drain_now(TriggerSource::Manual),
            b.drain_now(TriggerSource::Manual)
        );
        ra.unwrap();
        rb.unwrap();

        assert_eq!(client.max_in_flight(), 1);
        let notes = client.texts().iter().filter(|t| t.starts_with("note")).count();
        assert_eq!(notes, 3, "each note delivered exactly once");
    }

    #[tokio::test]
    async fn triggers_while_one_is_pending_coalesce() {
        let (handle, mut rx) = drain_channel();

        assert!(handle.trigger(TriggerSource::Enqueued));
        assert!(handle.trigger(TriggerSource::Enqueued));
        assert!(handle.trigger(TriggerSource::ConnectivityRestored));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.source, TriggerSource::Enqueued);
        assert!(rx.try_recv().is_err(), "extra triggers folded into the pending one");
    }

    #[tokio::test]
    async fn queued_waiters_share_one_pass() {
        let dir = TempDir::new().unwrap();
        let client =
            Arc::new(ScriptedDeliveryClient::new().with_latency(Duration::from_millis(30)));
        let engine = engine(&dir, client.clone());
        engine
            .enqueue(NewArtifact::text("once", "1", Utc::now()))
            .await;
        let (_tx, shutdown) = watch::channel(false);
        let (handle, _join) = DrainWorker::spawn(engine, shutdown);

        let reports = tokio::join!(
            handle.drain_now(TriggerSource::Manual),
            handle.drain_now(TriggerSource::Manual),
            handle.drain_now(TriggerSource::Manual),
        );
        let delivered =
            reports.0.unwrap().delivered + reports.1.unwrap().delivered + reports.2.unwrap().delivered;

        // The first pass delivers; waiters that share it see the same report,
        // any later pass finds the queue empty.
        assert!(delivered >= 1);
        let sends = client.texts().iter().filter(|t| *t == "once").count();
        assert_eq!(sends, 1);
    }

    #[tokio::test]
    async fn shutdown_stops_the_worker() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(ScriptedDeliveryClient::new()));
        let (tx, shutdown) = watch::channel(false);
        let (handle, join) = DrainWorker::spawn(engine, shutdown);

        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .unwrap()
            .unwrap();

        assert!(!handle.trigger(TriggerSource::Manual));
        assert!(matches!(
            handle.drain_now(TriggerSource::Manual).await,
            Err(WorkerError::Closed)
        ));
    }

    #[test]
    fn trigger_source_names() {
        assert_eq!(TriggerSource::ConnectivityRestored.to_string(), "connectivity_restored");
        assert_eq!(TriggerSource::Startup.to_string(), "startup");
    }
}
