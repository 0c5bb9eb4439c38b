// ABOUTME: Local status events describing an artifact's queue lifecycle, and the notifier trait that emits them.
// ABOUTME: TracingNotifier publishes on a fixed tracing target so local observers can subscribe to one channel.

use parcel_core::{ArtifactId, ArtifactType};

/// Tracing target every [`TracingNotifier`] event is published on.
pub const STATUS_TARGET: &str = "parcel::status";

/// One step in an artifact's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Queued {
        id: ArtifactId,
        artifact_type: ArtifactType,
    },
    Delivered {
        id: ArtifactId,
        artifact_type: ArtifactType,
    },
    Failed {
        id: ArtifactId,
        artifact_type: ArtifactType,
        reason: String,
    },
    Dropped {
        id: ArtifactId,
        artifact_type: ArtifactType,
        reason: String,
    },
}

impl StatusEvent {
    pub fn id(&self) -> ArtifactId {
        match self {
            StatusEvent::Queued { id, .. }
            | StatusEvent::Delivered { id, .. }
            | StatusEvent::Failed { id, .. }
            | StatusEvent::Dropped { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StatusEvent::Queued { .. } => "queued",
            StatusEvent::Delivered { .. } => "delivered",
            StatusEvent::Failed { .. } => "failed",
            StatusEvent::Dropped { .. } => "dropped",
        }
    }
}

/// Receives lifecycle events. Implementations must not block; they are
/// called inline from the drain loop.
pub trait StatusNotifier: Send + Sync {
    fn notify(&self, event: &StatusEvent);
}

/// Publishes status events as tracing events on [`STATUS_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl StatusNotifier for TracingNotifier {
    fn notify(&self, event: &StatusEvent) {
        match event {
            StatusEvent::Queued { id, artifact_type } => {
                tracing::info!(target: STATUS_TARGET, id = %id, artifact_type = %artifact_type, "queued");
            }
            StatusEvent::Delivered { id, artifact_type } => {
                tracing::info!(target: STATUS_TARGET, id = %id, artifact_type = %artifact_type, "delivered");
            }
            StatusEvent::Failed {
                id,
                artifact_type,
                reason,
            } => {
                tracing::warn!(target: STATUS_TARGET, id = %id, artifact_type = %artifact_type, reason = %reason, "failed");
            }
            StatusEvent::Dropped {
                id,
                artifact_type,
                reason,
            } => {
                tracing::warn!(target: STATUS_TARGET, id = %id, artifact_type = %artifact_type, reason = %reason, "dropped");
            }
        }
    }
}
