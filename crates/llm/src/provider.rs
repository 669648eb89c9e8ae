use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use snafu::{ResultExt, Snafu};

use super::attachment::RawAttachment;

pub const HTTP_PROVIDER_ID: &str = "http";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_RECOMMEND_PATH: &str = "/api/recommend";
pub const DEFAULT_HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub recommend_path: String,
    pub health_path: String,
    /// Bounds the wait for response headers and for each streamed buffer.
    pub request_timeout: Option<Duration>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            recommend_path: DEFAULT_RECOMMEND_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            request_timeout: None,
        }
    }

    pub fn with_recommend_path(mut self, path: impl Into<String>) -> Self {
        self.recommend_path = normalize_path(&path.into(), DEFAULT_RECOMMEND_PATH);
        self
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = normalize_path(&path.into(), DEFAULT_HEALTH_PATH);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn recommend_url(&self) -> String {
        format!("{}{}", self.base_url, self.recommend_path)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, self.health_path)
    }
}

pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn normalize_path(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Prompt plus the files the user picked, before any I/O happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationRequest {
    pub prompt: String,
    pub attachments: Vec<RawAttachment>,
}

impl RecommendationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<RawAttachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Loads every attachment concurrently so the request is ready to dispatch.
    pub async fn prepare(self) -> ProviderResult<PreparedRequest> {
        let reads = self.attachments.iter().map(|attachment| async move {
            let bytes = attachment.read_bytes().await.context(ReadAttachmentSnafu {
                stage: "prepare-request",
                file_name: attachment.file_name.clone(),
            })?;

            Ok::<_, ProviderError>(PreparedAttachment {
                file_name: attachment.file_name.clone(),
                content_type: attachment.content_type(),
                bytes,
            })
        });

        let attachments = futures::future::try_join_all(reads).await?;
        Ok(PreparedRequest {
            prompt: self.prompt,
            attachments,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub prompt: String,
    pub attachments: Vec<PreparedAttachment>,
}

/// One item of a recommendation stream.
///
/// `Completed` and `Failed` are terminal: the stream yields nothing after them.
#[derive(Debug)]
pub enum StreamEvent {
    /// The server accepted the request and the body is about to stream.
    Opened,
    Chunk(String),
    Completed,
    Failed(ProviderError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type RecommendationStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'static>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read attachment '{file_name}' on `{stage}`: {source}"))]
    ReadAttachment {
        stage: &'static str,
        file_name: String,
        source: std::io::Error,
    },
    #[snafu(display(
        "attachment '{file_name}' has unusable content type '{content_type}': {source}"
    ))]
    InvalidContentType {
        stage: &'static str,
        file_name: String,
        content_type: String,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} failed on `{stage}`: {source}"))]
    SendRequest {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("endpoint returned status {status}: {body}"))]
    UnexpectedStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to read response stream on `{stage}`: {source}"))]
    ReadStream {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("no response within {after:?} on `{stage}`"))]
    TimedOut {
        stage: &'static str,
        after: Duration,
    },
    #[snafu(display("failed to decode health payload on `{stage}`: {source}"))]
    HealthPayload {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("response stream ended before a terminal event"))]
    StreamEndedEarly { stage: &'static str },
}

impl ProviderError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::BuildClient { stage, .. }
            | Self::ReadAttachment { stage, .. }
            | Self::InvalidContentType { stage, .. }
            | Self::SendRequest { stage, .. }
            | Self::UnexpectedStatus { stage, .. }
            | Self::ReadStream { stage, .. }
            | Self::TimedOut { stage, .. }
            | Self::HealthPayload { stage, .. }
            | Self::StreamEndedEarly { stage } => stage,
        }
    }

    /// True when the failure came from reading or describing a local attachment.
    pub fn is_attachment_read(&self) -> bool {
        matches!(
            self,
            Self::ReadAttachment { .. } | Self::InvalidContentType { .. }
        )
    }
}

pub trait RecommendationProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Issues exactly one request. The returned stream is lazy: nothing is sent
    /// until it is first polled.
    fn recommend(&self, request: PreparedRequest) -> RecommendationStream;

    fn health<'a>(&'a self) -> BoxFuture<'a, ProviderResult<HealthStatus>>;
}
