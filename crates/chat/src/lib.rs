#![deny(unsafe_code)]

//! Corki chat client core.
//!
//! Owns the conversation transcript and the single in-flight recommendation
//! call. A presentation layer renders [`chat::TranscriptSnapshot`]s and disables
//! input while [`ConversationController::in_flight`] is true.

/// Inline image previews for attachments.
pub mod attachments;
/// Transcript domain types, the per-call state machine and the store.
pub mod chat;
pub mod controller;
pub mod logging;
/// Layered settings: defaults, JSON file, `CORKI_*` environment.
pub mod settings;

pub use attachments::{AttachmentError, EncodedPreviews, encode_previews};
pub use controller::{
    CallFailure, CallOutcome, ConversationController, FailureKind, PendingInput, SendError,
    SendReport, SendResult, UPLOAD_PROMPT,
};
pub use corki_llm::{AttachmentSource, RawAttachment};
pub use settings::Settings;
