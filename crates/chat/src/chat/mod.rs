/// Per-call lifecycle state machine.
pub mod call_state;
/// Domain entities for transcript entries.
pub mod message;
pub mod transcript;

pub use call_state::{CallState, CallTransition, CallTransitionRejection, CallTransitionResult};
pub use message::{Author, ImagePreview, Message, MessageId, MessageStatus};
pub use transcript::{MessageUpdate, Transcript, TranscriptSnapshot};
