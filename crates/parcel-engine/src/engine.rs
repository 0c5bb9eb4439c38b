// ABOUTME: QueueEngine owns the enqueue path and the drain pass that delivers pending artifacts in capture order.
// ABOUTME: It is the only writer of the queue store; every terminal outcome emits a status event and an operator notice.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use parcel_core::{ArtifactId, ArtifactRecord, ArtifactType, LocationPayload, NewArtifact, Notices};
use parcel_delivery::{DeliveryClient, DeliveryError, Payload, StatusEvent, StatusNotifier, UploadKind};
use parcel_store::{Appended, DEFAULT_MAX_AGE, QueueStore};
use tracing::Instrument;
use ulid::Ulid;

/// Tunables for a [`QueueEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory the retention sweeper cleans before each pass.
    pub artifact_root: PathBuf,
    pub retention: Duration,
    /// How long a record whose file is missing or empty is left alone
    /// before being dropped. Zero drops immediately.
    pub missing_file_grace: Duration,
    pub notices: Notices,
}

impl EngineConfig {
    pub fn new(artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            artifact_root: artifact_root.into(),
            retention: DEFAULT_MAX_AGE,
            missing_file_grace: Duration::ZERO,
            notices: Notices::default(),
        }
    }
}

/// Result of handing an artifact to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued(ArtifactId),
    /// The same file is already pending under this id; nothing changed.
    Duplicate(ArtifactId),
    MissingFile,
    Invalid(String),
    /// The store rejected the write. The capture is lost.
    StoreUnavailable,
}

impl EnqueueOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, EnqueueOutcome::Queued(_))
    }
}

/// Counts from one drain pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub pass_id: Ulid,
    pub considered: usize,
    pub delivered: usize,
    pub failed: usize,
    pub dropped: usize,
    pub deferred: usize,
    pub swept: usize,
    /// The pass ended early because a stop was requested.
    pub stopped: bool,
}

impl DrainReport {
    fn new(pass_id: Ulid) -> Self {
        Self {
            pass_id,
            considered: 0,
            delivered: 0,
            failed: 0,
            dropped: 0,
            deferred: 0,
            swept: 0,
            stopped: false,
        }
    }
}

/// What happened to one record during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Delivered,
    Failed,
    Dropped,
    Deferred,
}

/// A record turned into something sendable, or the reason it never can be.
enum Prepared {
    Send(Payload),
    Drop { reason: String, notice: String },
}

/// The reliable delivery queue.
pub struct QueueEngine {
    store: Arc<QueueStore>,
    client: Arc<dyn DeliveryClient>,
    notifier: Arc<dyn StatusNotifier>,
    config: EngineConfig,
    stop: AtomicBool,
}

impl QueueEngine {
    pub fn new(
        store: Arc<QueueStore>,
        client: Arc<dyn DeliveryClient>,
        notifier: Arc<dyn StatusNotifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            client,
            notifier,
            config,
            stop: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ask the current and any later pass to stop before the next record.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Durably record an artifact for delivery.
    ///
    /// Returns once the record is committed. Scheduling a drain is the
    /// caller's job; see `QueueService::enqueue`.
    pub async fn enqueue(&self, artifact: NewArtifact) -> EnqueueOutcome {
        if let Some(path) = artifact.local_path.as_deref() {
            if !path.is_file() {
                tracing::warn!(path = %path.display(), artifact_type = %artifact.artifact_type, "enqueue: file does not exist");
                return EnqueueOutcome::MissingFile;
            }
        } else if artifact.artifact_type == ArtifactType::Text {
            if artifact.payload_text.as_deref().is_none_or(str::is_empty) {
                return EnqueueOutcome::Invalid("text artifact has no content".to_string());
            }
        } else if artifact.artifact_type != ArtifactType::Location || artifact.payload_text.is_none() {
            return EnqueueOutcome::Invalid(format!("{} artifact needs a file", artifact.artifact_type));
        }

        let appended = match self.store.append(&artifact) {
            Ok(appended) => appended,
            Err(e) => {
                tracing::error!(error = %e, artifact_type = %artifact.artifact_type, "enqueue: store write failed, capture lost");
                return EnqueueOutcome::StoreUnavailable;
            }
        };

        let id = match appended {
            Appended::Duplicate(id) => {
                tracing::debug!(artifact_id = %id, "enqueue: already pending");
                return EnqueueOutcome::Duplicate(id);
            }
            Appended::Inserted(id) => id,
        };

        tracing::info!(artifact_id = %id, artifact_type = %artifact.artifact_type, destination = %artifact.destination, "queued");
        self.notifier.notify(&StatusEvent::Queued {
            id,
            artifact_type: artifact.artifact_type,
        });
        self.send_notice(
            &artifact.destination,
            self.config.notices.received(artifact.artifact_type),
        )
        .await;

        EnqueueOutcome::Queued(id)
    }

    /// Run one drain pass over a snapshot of the pending records.
    pub async fn drain_pass(&self) -> DrainReport {
        let pass_id = Ulid::new();
        let span = tracing::info_span!("drain_pass", pass_id = %pass_id);
        self.run_pass(pass_id).instrument(span).await
    }

    async fn run_pass(&self, pass_id: Ulid) -> DrainReport {
        let mut report = DrainReport::new(pass_id);
        if self.is_stop_requested() {
            report.stopped = true;
            return report;
        }

        report.swept = self.sweep().await;

        let records = match self.store.list_all() {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "drain: cannot list pending records");
                return report;
            }
        };
        tracing::debug!(pending = records.len(), "drain pass started");

        for record in records {
            if self.is_stop_requested() {
                tracing::info!("drain: stop requested, abandoning rest of pass");
                report.stopped = true;
                break;
            }
            report.considered += 1;
            match self.process(&record).await {
                RecordOutcome::Delivered => report.delivered += 1,
                RecordOutcome::Failed => report.failed += 1,
                RecordOutcome::Dropped => report.dropped += 1,
                RecordOutcome::Deferred => report.deferred += 1,
            }
        }

        tracing::info!(
            considered = report.considered,
            delivered = report.delivered,
            failed = report.failed,
            dropped = report.dropped,
            deferred = report.deferred,
            "drain pass finished"
        );
        report
    }

    async fn sweep(&self) -> usize {
        let root = self.config.artifact_root.clone();
        let retention = self.config.retention;
        match tokio::task::spawn_blocking(move || parcel_store::sweep(&root, retention)).await {
            Ok(Ok(swept)) => {
                if swept.deleted > 0 {
                    tracing::info!(deleted = swept.deleted, scanned = swept.scanned, "retention sweep");
                }
                swept.deleted
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "retention sweep failed");
                0
            }
            Err(e) => {
                tracing::warn!(error = %e, "retention sweep task panicked");
                0
            }
        }
    }

    async fn process(&self, record: &ArtifactRecord) -> RecordOutcome {
        if let Some(path) = record.path()
            && !has_content(path).await
        {
            if self.within_grace(record) {
                tracing::debug!(artifact_id = %record.id, path = %path.display(), "file not ready, deferring");
                return RecordOutcome::Deferred;
            }
            let notice = self
                .config
                .notices
                .file_missing(record.artifact_type, record.captured_at);
            self.drop_record(record, "file missing".to_string(), notice).await;
            return RecordOutcome::Dropped;
        }

        let payload = match self.prepare(record).await {
            Ok(Prepared::Send(payload)) => payload,
            Ok(Prepared::Drop { reason, notice }) => {
                self.drop_record(record, reason, notice).await;
                return RecordOutcome::Dropped;
            }
            Err(e) => {
                self.record_failure(record, &e).await;
                return RecordOutcome::Failed;
            }
        };

        match self.client.send(&record.destination, &payload).await {
            Ok(()) => {
                self.finish_delivered(record).await;
                RecordOutcome::Delivered
            }
            Err(e) => {
                self.record_failure(record, &e).await;
                RecordOutcome::Failed
            }
        }
    }

    fn within_grace(&self, record: &ArtifactRecord) -> bool {
        if self.config.missing_file_grace.is_zero() {
            return false;
        }
        let age = Utc::now().signed_duration_since(record.enqueued_at);
        match age.to_std() {
            Ok(age) => age < self.config.missing_file_grace,
            // Enqueued "in the future" relative to our clock: treat as fresh.
            Err(_) => true,
        }
    }

    async fn prepare(&self, record: &ArtifactRecord) -> Result<Prepared, DeliveryError> {
        let notices = &self.config.notices;
        match record.artifact_type {
            ArtifactType::Location => {
                let source = match (record.path(), record.payload_text.as_deref()) {
                    (Some(path), _) => read_text(path).await?,
                    (None, Some(text)) => text.to_string(),
                    (None, None) => String::new(),
                };
                match LocationPayload::decode(&source) {
                    Ok(location) => Ok(Prepared::Send(Payload::Text(
                        notices.location(&location, record.captured_at),
                    ))),
                    Err(e) => {
                        let reason = e.to_string();
                        Ok(Prepared::Drop {
                            notice: notices.malformed_location(record.captured_at, &reason),
                            reason,
                        })
                    }
                }
            }
            ArtifactType::Text => match (record.payload_text.as_deref(), record.path()) {
                (Some(text), _) => Ok(Prepared::Send(Payload::Text(text.to_string()))),
                (None, Some(path)) => Ok(Prepared::Send(Payload::Text(read_text(path).await?))),
                (None, None) => Ok(Prepared::Drop {
                    reason: "no content".to_string(),
                    notice: notices.file_missing(record.artifact_type, record.captured_at),
                }),
            },
            ArtifactType::Photo | ArtifactType::Video | ArtifactType::Audio | ArtifactType::Other => {
                match record.path() {
                    Some(path) => Ok(Prepared::Send(Payload::File {
                        path: path.to_path_buf(),
                        kind: UploadKind::for_artifact(record.artifact_type),
                        caption: Some(notices.caption(record.artifact_type, record.captured_at)),
                    })),
                    None => Ok(Prepared::Drop {
                        reason: "no file".to_string(),
                        notice: notices.file_missing(record.artifact_type, record.captured_at),
                    }),
                }
            }
        }
    }

    async fn finish_delivered(&self, record: &ArtifactRecord) {
        if let Some(path) = record.path() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(artifact_id = %record.id, path = %path.display(), error = %e, "delivered but could not delete local file");
                }
            }
        }
        self.delete_record(record.id);
        tracing::info!(artifact_id = %record.id, artifact_type = %record.artifact_type, "delivered");
        self.notifier.notify(&StatusEvent::Delivered {
            id: record.id,
            artifact_type: record.artifact_type,
        });
    }

    async fn record_failure(&self, record: &ArtifactRecord, error: &DeliveryError) {
        tracing::warn!(artifact_id = %record.id, artifact_type = %record.artifact_type, error = %error, "delivery failed, keeping record");
        self.notifier.notify(&StatusEvent::Failed {
            id: record.id,
            artifact_type: record.artifact_type,
            reason: error.to_string(),
        });
        let notice = self.config.notices.delivery_failed(
            record.artifact_type,
            record.captured_at,
            &error.operator_message(),
        );
        self.send_notice(&record.destination, notice).await;
    }

    async fn drop_record(&self, record: &ArtifactRecord, reason: String, notice: String) {
        tracing::warn!(artifact_id = %record.id, artifact_type = %record.artifact_type, reason = %reason, "dropping unrecoverable record");
        self.delete_record(record.id);
        self.notifier.notify(&StatusEvent::Dropped {
            id: record.id,
            artifact_type: record.artifact_type,
            reason,
        });
        self.send_notice(&record.destination, notice).await;
    }

    fn delete_record(&self, id: ArtifactId) {
        match self.store.delete_by_id(id) {
            Ok(true) => {}
            Ok(false) => tracing::debug!(artifact_id = %id, "record already deleted"),
            Err(e) => {
                tracing::error!(artifact_id = %id, error = %e, "could not delete record; it will be retried next pass");
            }
        }
    }

    /// Best-effort operator notice. Failures are logged and swallowed.
    async fn send_notice(&self, destination: &str, text: String) {
        if let Err(e) = self.client.send(destination, &Payload::Text(text)).await {
            tracing::warn!(destination = %destination, error = %e, "could not send notice");
        }
    }
}

async fn has_content(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

async fn read_text(path: &Path) -> Result<String, DeliveryError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| DeliveryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
