// ABOUTME: Builds every operator-facing string parcel sends: captions, status and error notices.
// ABOUTME: All text carries the configured device label so operators can tell devices apart.

use chrono::{DateTime, Local, Utc};

use crate::location::LocationPayload;
use crate::record::ArtifactType;

/// Timestamp format shown to the operator, rendered in the device's local time zone.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a capture time for display.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// Formatter for outbound notices, bound to one device label.
#[derive(Debug, Clone, Default)]
pub struct Notices {
    device_label: String,
}

impl Notices {
    pub fn new(device_label: impl Into<String>) -> Self {
        Self {
            device_label: device_label.into().trim().to_string(),
        }
    }

    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    fn prefixed(&self, body: String) -> String {
        if self.device_label.is_empty() {
            body
        } else {
            format!("[{}] {}", self.device_label, body)
        }
    }

    /// Sent to the destination as soon as an artifact is durably queued.
    pub fn received(&self, artifact_type: ArtifactType) -> String {
        self.prefixed(format!("Command received, processing {}", artifact_type))
    }

    /// Caption attached to media and document uploads.
    pub fn caption(&self, artifact_type: ArtifactType, captured_at: DateTime<Utc>) -> String {
        self.prefixed(format!(
            "{} captured at {}",
            artifact_type.label(),
            format_timestamp(captured_at)
        ))
    }

    /// Body of the text message that delivers a location fix.
    pub fn location(&self, payload: &LocationPayload, captured_at: DateTime<Utc>) -> String {
        self.prefixed(format!(
            "Location captured at {}\n{}",
            format_timestamp(captured_at),
            payload.map_link()
        ))
    }

    /// The backing file vanished before delivery; the record has been dropped.
    pub fn file_missing(&self, artifact_type: ArtifactType, captured_at: DateTime<Utc>) -> String {
        self.prefixed(format!(
            "Error: file missing for {} at {}",
            artifact_type,
            format_timestamp(captured_at)
        ))
    }

    /// The location file could not be decoded; the record has been dropped.
    pub fn malformed_location(&self, captured_at: DateTime<Utc>, reason: &str) -> String {
        self.prefixed(format!(
            "Error: unreadable location captured at {}: {}",
            format_timestamp(captured_at),
            reason
        ))
    }

    /// Delivery failed; the record stays queued for the next attempt.
    pub fn delivery_failed(
        &self,
        artifact_type: ArtifactType,
        captured_at: DateTime<Utc>,
        reason: &str,
    ) -> String {
        self.prefixed(format!(
            "Error: failed to send {} captured at {}: {}. Will retry.",
            artifact_type,
            format_timestamp(captured_at),
            reason
        ))
    }
}
