use std::sync::Arc;

use tokio::sync::watch;

use crate::chat::message::{Message, MessageId, MessageStatus};

/// Immutable view of the transcript after one mutation.
///
/// Messages are shared with the store, so publishing a snapshot copies pointers
/// only. An update clones just the message it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSnapshot {
    /// Bumped on every append or accepted update.
    pub revision: u64,
    pub messages: Arc<[Arc<Message>]>,
}

/// The parts of a message that may change while it is in progress.
pub struct MessageUpdate<'a> {
    pub text: &'a mut String,
    pub status: &'a mut MessageStatus,
}

/// Append-only, insertion-ordered message store with a single writer.
///
/// Every mutation publishes a fresh [`TranscriptSnapshot`] to subscribers, so a
/// renderer that redraws from the latest snapshot always shows the latest state.
pub struct Transcript {
    messages: Vec<Arc<Message>>,
    next_message_id: u64,
    revision: u64,
    snapshot_tx: watch::Sender<TranscriptSnapshot>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(TranscriptSnapshot {
            revision: 0,
            messages: Arc::from(Vec::new()),
        });

        Self {
            messages: Vec::new(),
            next_message_id: 1,
            revision: 0,
            snapshot_tx,
        }
    }

    /// Appends a fully formed message built around a freshly minted id.
    pub fn append(&mut self, build: impl FnOnce(MessageId) -> Message) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id = self.next_message_id.saturating_add(1);

        let mut message = build(id);
        message.id = id;

        tracing::debug!(
            message_id = %id,
            author = ?message.author,
            status = ?message.status,
            attachment_count = message.attachments.len(),
            "appending transcript message"
        );

        self.messages.push(Arc::new(message));
        self.publish();
        id
    }

    /// Applies `mutator` to the in-progress message with `id`.
    ///
    /// Unknown ids and finalized messages are logged and ignored; returns whether
    /// the update was applied.
    pub fn update_by_id(&mut self, id: MessageId, mutator: impl FnOnce(MessageUpdate<'_>)) -> bool {
        let Some(entry) = self.messages.iter_mut().find(|message| message.id == id) else {
            tracing::warn!(message_id = %id, "ignoring update for unknown message");
            return false;
        };

        if !entry.is_in_progress() {
            tracing::warn!(
                message_id = %id,
                status = ?entry.status,
                "ignoring update for finalized message"
            );
            return false;
        }

        let message = Arc::make_mut(entry);
        mutator(MessageUpdate {
            text: &mut message.text,
            status: &mut message.status,
        });

        self.publish();
        true
    }

    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages
            .iter()
            .find(|message| message.id == id)
            .map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn in_progress_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.is_in_progress())
            .count()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TranscriptSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn publish(&mut self) {
        self.revision = self.revision.saturating_add(1);
        self.snapshot_tx.send_replace(TranscriptSnapshot {
            revision: self.revision,
            messages: Arc::from(self.messages.as_slice()),
        });
    }
}
