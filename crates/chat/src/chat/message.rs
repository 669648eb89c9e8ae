use std::fmt;

/// Stable identifier for one transcript entry. Never reused within a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "msg-{}", self.0)
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Author {
    User,
    Assistant,
}

/// Lifecycle status for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    /// Assistant placeholder still receiving chunks.
    Streaming,
    Done,
    /// The call failed and the text was replaced with the apology.
    Failed,
}

/// Inline-displayable image, rendered as a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImagePreview {
    pub file_name: String,
    pub content_type: String,
    pub data_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub author: Author,
    pub text: String,
    pub attachments: Vec<ImagePreview>,
    pub status: MessageStatus,
}

impl Message {
    /// Creates a message with explicit status.
    pub fn new(
        id: MessageId,
        author: Author,
        text: impl Into<String>,
        attachments: Vec<ImagePreview>,
        status: MessageStatus,
    ) -> Self {
        Self {
            id,
            author,
            text: text.into(),
            attachments,
            status,
        }
    }

    /// Creates a finished user message.
    pub fn user(id: MessageId, text: impl Into<String>, attachments: Vec<ImagePreview>) -> Self {
        Self::new(id, Author::User, text, attachments, MessageStatus::Done)
    }

    /// Creates a finished assistant message, such as the greeting.
    pub fn assistant(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, Author::Assistant, text, Vec::new(), MessageStatus::Done)
    }

    /// Creates an empty assistant placeholder while streaming.
    pub fn assistant_placeholder(id: MessageId) -> Self {
        Self::new(
            id,
            Author::Assistant,
            String::new(),
            Vec::new(),
            MessageStatus::Streaming,
        )
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self.status, MessageStatus::Streaming)
    }
}
