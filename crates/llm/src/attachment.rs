use std::path::{Path, PathBuf};

use bytes::Bytes;

/// Fallback content type when neither the caller nor the file name tells us more.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Where the raw bytes of an attachment live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    Bytes(Bytes),
    Path(PathBuf),
}

/// A file picked by the user, not yet read or encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub source: AttachmentSource,
}

impl RawAttachment {
    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            source: AttachmentSource::Bytes(bytes.into()),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            file_name,
            content_type: None,
            source: AttachmentSource::Path(path),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into().trim().to_ascii_lowercase();
        self.content_type = (!content_type.is_empty()).then_some(content_type);
        self
    }

    /// Declared content type, otherwise a guess from the file extension.
    pub fn content_type(&self) -> String {
        if let Some(content_type) = &self.content_type {
            return content_type.clone();
        }

        let guessed = match &self.source {
            AttachmentSource::Path(path) => guess_content_type(path),
            AttachmentSource::Bytes(_) => guess_content_type(Path::new(&self.file_name)),
        };
        guessed.unwrap_or(OCTET_STREAM).to_string()
    }

    pub fn is_image(&self) -> bool {
        self.content_type().starts_with("image/")
    }

    pub async fn read_bytes(&self) -> std::io::Result<Bytes> {
        match &self.source {
            AttachmentSource::Bytes(bytes) => Ok(bytes.clone()),
            AttachmentSource::Path(path) => tokio::fs::read(path).await.map(Bytes::from),
        }
    }
}

fn guess_content_type(path: &Path) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}
