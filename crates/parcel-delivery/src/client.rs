// ABOUTME: Defines the DeliveryClient trait every transport implements, plus its payload and error types.
// ABOUTME: Errors distinguish missing credentials from transport failures only for operator-facing text.

use std::path::PathBuf;

use async_trait::async_trait;
use parcel_core::ArtifactType;
use thiserror::Error;

/// How a file is uploaded. Each kind maps to one bot API method and the
/// name of the multipart field carrying the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadKind {
    Photo,
    Video,
    Audio,
    Document,
}

impl UploadKind {
    /// The upload kind used for a given artifact type. Location and text
    /// artifacts are normally sent as text; if they reach here they go as documents.
    pub fn for_artifact(artifact_type: ArtifactType) -> Self {
        match artifact_type {
            ArtifactType::Photo => UploadKind::Photo,
            ArtifactType::Video => UploadKind::Video,
            ArtifactType::Audio => UploadKind::Audio,
            ArtifactType::Location | ArtifactType::Text | ArtifactType::Other => {
                UploadKind::Document
            }
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            UploadKind::Photo => "sendPhoto",
            UploadKind::Video => "sendVideo",
            UploadKind::Audio => "sendAudio",
            UploadKind::Document => "sendDocument",
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            UploadKind::Photo => "photo",
            UploadKind::Video => "video",
            UploadKind::Audio => "audio",
            UploadKind::Document => "document",
        }
    }
}

/// What to deliver to a destination.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    File {
        path: PathBuf,
        kind: UploadKind,
        caption: Option<String>,
    },
}

impl Payload {
    pub fn is_file(&self) -> bool {
        matches!(self, Payload::File { .. })
    }
}

/// Errors that can occur while delivering a payload. Every variant leaves
/// the queued record pending; they differ only in what the operator is told.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery credentials are not configured")]
    MissingCredentials,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("cannot read upload {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL embeds the bot token.
        DeliveryError::Transport(e.without_url().to_string())
    }
}

impl DeliveryError {
    /// Short reason shown to the operator in failure notices.
    pub fn operator_message(&self) -> String {
        match self {
            DeliveryError::MissingCredentials => {
                "bot token is not configured on this device".to_string()
            }
            DeliveryError::Transport(_) => "network unavailable".to_string(),
            DeliveryError::Rejected { status, .. } => {
                format!("server rejected the request (HTTP {})", status)
            }
            DeliveryError::Io { .. } => "could not read the captured file".to_string(),
        }
    }
}

/// Transport that carries payloads to a destination chat. Implementations
/// are stateless per call; retry decisions belong to the queue engine.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(&self, destination: &str, payload: &Payload) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_kind_follows_artifact_type() {
        assert_eq!(UploadKind::for_artifact(ArtifactType::Photo), UploadKind::Photo);
        assert_eq!(UploadKind::for_artifact(ArtifactType::Video), UploadKind::Video);
        assert_eq!(UploadKind::for_artifact(ArtifactType::Audio), UploadKind::Audio);
        assert_eq!(UploadKind::for_artifact(ArtifactType::Other), UploadKind::Document);
    }

    #[test]
    fn upload_kind_method_and_field_pair_up() {
        for kind in [
            UploadKind::Photo,
            UploadKind::Video,
            UploadKind::Audio,
            UploadKind::Document,
        ] {
            let method = kind.method().to_lowercase();
            assert!(
                method.ends_with(kind.field()),
                "{} should end with {}",
                method,
                kind.field()
            );
        }
    }

    #[test]
    fn credential_error_has_distinct_operator_message() {
        let creds = DeliveryError::MissingCredentials;
        let net = DeliveryError::Transport("connection refused".to_string());

        assert_ne!(creds.operator_message(), net.operator_message());
        assert!(creds.operator_message().contains("token"));
    }

    #[test]
    fn rejected_message_carries_status() {
        let err = DeliveryError::Rejected {
            status: 413,
            body: "Request Entity Too Large".to_string(),
        };
        assert!(err.operator_message().contains("413"));
        assert!(err.to_string().contains("Too Large"));
    }
}
