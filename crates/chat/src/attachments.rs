use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use corki_llm::RawAttachment;
use snafu::{ResultExt, Snafu};

use crate::chat::ImagePreview;

/// Previews for the image attachments of one send, in the order supplied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedPreviews {
    pub previews: Vec<ImagePreview>,
    /// File names of attachments that were not images and got no preview.
    pub skipped: Vec<String>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AttachmentError {
    #[snafu(display("failed to read attachment '{file_name}' on `{stage}`: {source}"))]
    ReadFile {
        stage: &'static str,
        file_name: String,
        source: std::io::Error,
    },
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

/// Encodes every image attachment into a `data:` URI preview.
///
/// Reads run concurrently. The first failure fails the whole batch and no partial
/// result is returned. Non-image attachments are skipped and reported in
/// [`EncodedPreviews::skipped`].
pub async fn encode_previews(attachments: &[RawAttachment]) -> AttachmentResult<EncodedPreviews> {
    let mut skipped = Vec::new();
    let mut eligible = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        if attachment.is_image() {
            eligible.push(attachment);
        } else {
            tracing::warn!(
                file_name = %attachment.file_name,
                content_type = %attachment.content_type(),
                "skipping preview for non-image attachment"
            );
            skipped.push(attachment.file_name.clone());
        }
    }

    let previews = futures::future::try_join_all(eligible.into_iter().map(encode_preview)).await?;

    Ok(EncodedPreviews { previews, skipped })
}

pub async fn encode_preview(attachment: &RawAttachment) -> AttachmentResult<ImagePreview> {
    let bytes = attachment.read_bytes().await.context(ReadFileSnafu {
        stage: "encode-preview",
        file_name: attachment.file_name.clone(),
    })?;
    let content_type = attachment.content_type();

    Ok(ImagePreview {
        file_name: attachment.file_name.clone(),
        data_url: data_url(&content_type, &bytes),
        content_type,
    })
}

pub fn data_url(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{content_type};base64,{}", STANDARD.encode(bytes))
}
