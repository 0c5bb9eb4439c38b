// ABOUTME: Defines the ArtifactRecord struct representing one pending delivery in the queue.
// ABOUTME: Records carry a file path or inline text, a destination chat, a type, and a capture time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store-assigned surrogate key for a queued artifact. Monotonically
/// increasing on insert and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(pub i64);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of capture an artifact came from. Drives which delivery
/// protocol is used at drain time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Photo,
    Video,
    Audio,
    Location,
    Text,
    Other,
}

#[derive(Debug, Error)]
#[error("unknown artifact type: {0}")]
pub struct UnknownArtifactType(pub String);

impl ArtifactType {
    pub const ALL: [ArtifactType; 6] = [
        ArtifactType::Photo,
        ArtifactType::Video,
        ArtifactType::Audio,
        ArtifactType::Location,
        ArtifactType::Text,
        ArtifactType::Other,
    ];

    /// Lowercase name, as stored in the queue table and accepted on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Photo => "photo",
            ArtifactType::Video => "video",
            ArtifactType::Audio => "audio",
            ArtifactType::Location => "location",
            ArtifactType::Text => "text",
            ArtifactType::Other => "other",
        }
    }

    /// Capitalised label used in captions shown to the operator.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactType::Photo => "Photo",
            ArtifactType::Video => "Video",
            ArtifactType::Audio => "Audio",
            ArtifactType::Location => "Location",
            ArtifactType::Text => "Text",
            ArtifactType::Other => "File",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = UnknownArtifactType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownArtifactType(s.to_string()))
    }
}

/// An artifact handed to the queue by a capture producer, before the store
/// has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArtifact {
    pub local_path: Option<PathBuf>,
    pub payload_text: Option<String>,
    pub destination: String,
    pub artifact_type: ArtifactType,
    pub captured_at: DateTime<Utc>,
}

impl NewArtifact {
    /// A file-backed artifact, the common case for every capture producer.
    pub fn file(
        local_path: impl Into<PathBuf>,
        destination: impl Into<String>,
        artifact_type: ArtifactType,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            local_path: Some(local_path.into()),
            payload_text: None,
            destination: destination.into(),
            artifact_type,
            captured_at,
        }
    }

    /// A text artifact carried inline instead of through a file.
    pub fn text(
        text: impl Into<String>,
        destination: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            local_path: None,
            payload_text: Some(text.into()),
            destination: destination.into(),
            artifact_type: ArtifactType::Text,
            captured_at,
        }
    }
}

/// One pending delivery as persisted in the durable store. Records are
/// only ever inserted or deleted, never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: ArtifactId,
    pub local_path: Option<PathBuf>,
    pub payload_text: Option<String>,
    pub destination: String,
    pub artifact_type: ArtifactType,
    pub captured_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Path of the backing file, if this record has one.
    pub fn path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }
}
