// ABOUTME: DeliveryClient backed by a Telegram-style bot HTTP API using reqwest.
// ABOUTME: Text goes through sendMessage as a form; files go through sendPhoto/Video/Audio/Document as multipart.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::client::{DeliveryClient, DeliveryError, Payload, UploadKind};

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest slice of an error body kept in a Rejected error.
const MAX_ERROR_BODY: usize = 300;

/// Settings for [`BotApiClient`].
#[derive(Debug, Clone)]
pub struct BotApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for BotApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Response envelope returned by the bot API on every call.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API client. The token is resolved per call so a missing token is a
/// delivery failure rather than a construction failure.
pub struct BotApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BotApiClient {
    pub fn new(config: BotApiConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn token(&self) -> Result<&str, DeliveryError> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(DeliveryError::MissingCredentials)
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, token, method)
    }

    async fn send_text(&self, token: &str, destination: &str, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.method_url(token, "sendMessage"))
            .form(&[("chat_id", destination), ("text", text)])
            .send()
            .await?;
        check_response(response).await
    }

    async fn send_file(
        &self,
        token: &str,
        destination: &str,
        path: &Path,
        kind: UploadKind,
        caption: Option<&str>,
    ) -> Result<(), DeliveryError> {
        let io_error = |source| DeliveryError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(io_error)?;
        let length = file.metadata().await.map_err(io_error)?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| kind.field().to_string());

        let part = Part::stream_with_length(Body::from(file), length).file_name(file_name);
        let mut form = Form::new()
            .text("chat_id", destination.to_string())
            .part(kind.field(), part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let response = self
            .client
            .post(self.method_url(token, kind.method()))
            .multipart(form)
            .send()
            .await?;
        check_response(response).await
    }
}

async fn check_response(response: reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        // Some deployments answer 200 with ok=false; treat that as a rejection too.
        if let Ok(envelope) = serde_json::from_str::<ApiResponse>(&body)
            && !envelope.ok
        {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: envelope.description.unwrap_or_default(),
            });
        }
        return Ok(());
    }

    let detail = serde_json::from_str::<ApiResponse>(&body)
        .ok()
        .and_then(|e| e.description)
        .unwrap_or(body);
    Err(DeliveryError::Rejected {
        status: status.as_u16(),
        body: detail.chars().take(MAX_ERROR_BODY).collect(),
    })
}

#[async_trait]
impl DeliveryClient for BotApiClient {
    async fn send(&self, destination: &str, payload: &Payload) -> Result<(), DeliveryError> {
        let token = self.token()?;
        match payload {
            Payload::Text(text) => self.send_text(token, destination, text).await,
            Payload::File {
                path,
                kind,
                caption,
            } => {
                self.send_file(token, destination, path, *kind, caption.as_deref())
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::{Path as UrlPath, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use tempfile::TempDir;

    #[derive(Debug, Clone)]
    struct Captured {
        bot: String,
        method: String,
        content_type: String,
        body: String,
    }

    struct FakeApi {
        status: StatusCode,
        reply: String,
        captured: Mutex<Vec<Captured>>,
    }

    async fn handle(
        State(api): State<Arc<FakeApi>>,
        UrlPath((bot, method)): UrlPath<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> (StatusCode, String) {
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        api.captured.lock().unwrap().push(Captured {
            bot,
            method,
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
        (api.status, api.reply.clone())
    }

    async fn start_fake(status: StatusCode, reply: &str) -> (String, Arc<FakeApi>) {
        let api = Arc::new(FakeApi {
            status,
            reply: reply.to_string(),
            captured: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/{bot}/{method}", post(handle))
            .with_state(api.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), api)
    }

    fn client(base_url: &str, token: Option<&str>) -> BotApiClient {
        BotApiClient::new(BotApiConfig {
            base_url: base_url.to_string(),
            token: token.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn text_goes_through_send_message() {
        let (base, api) = start_fake(StatusCode::OK, r#"{"ok":true,"result":{}}"#).await;
        let client = client(&base, Some("123:abc"));

        client
            .send("4242", &Payload::Text("hello there".to_string()))
            .await
            .unwrap();

        let captured = api.captured.lock().unwrap().clone();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].bot, "bot123:abc");
        assert_eq!(captured[0].method, "sendMessage");
        assert!(captured[0].content_type.starts_with("application/x-www-form-urlencoded"));
        assert!(captured[0].body.contains("chat_id=4242"));
        assert!(captured[0].body.contains("text=hello"));
    }

    #[tokio::test]
    async fn photo_is_uploaded_as_multipart_with_caption() {
        let (base, api) = start_fake(StatusCode::OK, r#"{"ok":true}"#).await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shot.jpg");
        std::fs::write(&path, b"jpeg-bytes").unwrap();

        client(&base, Some("t"))
            .send(
                "7",
                &Payload::File {
                    path: path.clone(),
                    kind: UploadKind::Photo,
                    caption: Some("Photo captured at noon".to_string()),
                },
            )
            .await
            .unwrap();

        let captured = api.captured.lock().unwrap().clone();
        assert_eq!(captured[0].method, "sendPhoto");
        assert!(captured[0].content_type.starts_with("multipart/form-data"));
        let body = &captured[0].body;
        assert!(body.contains(r#"name="chat_id""#));
        assert!(body.contains(r#"name="photo"; filename="shot.jpg""#));
        assert!(body.contains("jpeg-bytes"));
        assert!(body.contains("Photo captured at noon"));
    }

    #[tokio::test]
    async fn large_upload_arrives_whole() {
        let (base, api) = start_fake(StatusCode::OK, r#"{"ok":true}"#).await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long.mp4");
        let size = 1024 * 1024;
        std::fs::write(&path, vec![b'v'; size]).unwrap();

        client(&base, Some("t"))
            .send(
                "7",
                &Payload::File {
                    path,
                    kind: UploadKind::Video,
                    caption: None,
                },
            )
            .await
            .unwrap();

        let captured = api.captured.lock().unwrap().clone();
        assert_eq!(captured[0].method, "sendVideo");
        assert!(captured[0].body.contains(&"v".repeat(size)));
    }

    #[tokio::test]
    async fn each_kind_uses_its_own_method() {
        let (base, api) = start_fake(StatusCode::OK, r#"{"ok":true}"#).await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"x").unwrap();
        let client = client(&base, Some("t"));

        for kind in [UploadKind::Video, UploadKind::Audio, UploadKind::Document] {
            client
                .send(
                    "1",
                    &Payload::File {
                        path: path.clone(),
                        kind,
                        caption: None,
                    },
                )
                .await
                .unwrap();
        }

        let methods: Vec<String> = api
            .captured
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.method.clone())
            .collect();
        assert_eq!(methods, vec!["sendVideo", "sendAudio", "sendDocument"]);
    }

    #[tokio::test]
    async fn missing_token_fails_without_network() {
        let (base, api) = start_fake(StatusCode::OK, r#"{"ok":true}"#).await;

        for token in [None, Some(""), Some("   ")] {
            let err = client(&base, token)
                .send("1", &Payload::Text("hi".to_string()))
                .await
                .unwrap_err();
            assert!(matches!(err, DeliveryError::MissingCredentials));
        }
        assert!(api.captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_rejected_with_description() {
        let (base, _api) = start_fake(
            StatusCode::BAD_REQUEST,
            r#"{"ok":false,"description":"Bad Request: chat not found"}"#,
        )
        .await;

        let err = client(&base, Some("t"))
            .send("1", &Payload::Text("hi".to_string()))
            .await
            .unwrap_err();
        match err {
            DeliveryError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "Bad Request: chat not found");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ok_false_envelope_is_rejected() {
        let (base, _api) =
            start_fake(StatusCode::OK, r#"{"ok":false,"description":"flood"}"#).await;
        let err = client(&base, Some("t"))
            .send("1", &Payload::Text("hi".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { status: 200, .. }));
    }

    #[tokio::test]
    async fn unreadable_file_is_io_error() {
        let (base, api) = start_fake(StatusCode::OK, r#"{"ok":true}"#).await;
        let dir = TempDir::new().unwrap();

        let err = client(&base, Some("t"))
            .send(
                "1",
                &Payload::File {
                    path: dir.path().join("gone.mp4"),
                    kind: UploadKind::Video,
                    caption: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Io { .. }));
        assert!(api.captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        // Port 1 on loopback refuses connections.
        let err = client("http://127.0.0.1:1", Some("SECRET123:tok"))
            .send("1", &Payload::Text("hi".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
        assert!(
            !err.to_string().contains("SECRET123"),
            "token leaked into error: {}",
            err
        );
    }

    #[test]
    fn trailing_slash_in_base_url_is_ignored() {
        let client = client("https://example.test/", Some("t"));
        assert_eq!(
            client.method_url("abc", "sendMessage"),
            "https://example.test/botabc/sendMessage"
        );
    }
}
