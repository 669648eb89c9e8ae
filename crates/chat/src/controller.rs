use std::sync::Arc;

use corki_llm::{
    HealthStatus, PreparedRequest, ProviderError, ProviderResult, RawAttachment,
    RecommendationProvider, RecommendationRequest, StreamEvent,
};
use futures::StreamExt;
use snafu::{ResultExt, Snafu, ensure};
use tokio::sync::watch;

use crate::attachments::{AttachmentError, encode_previews};
use crate::chat::{
    CallState, CallTransition, Message, MessageId, MessageStatus, Transcript, TranscriptSnapshot,
};
use crate::settings::Settings;

/// Prompt sent upstream when the user attaches files without typing anything.
pub const UPLOAD_PROMPT: &str = "File upload initiated";

/// What the user staged in the input box when they hit send.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingInput {
    pub text: String,
    pub attachments: Vec<RawAttachment>,
}

impl PendingInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn attachments(attachments: Vec<RawAttachment>) -> Self {
        Self {
            text: String::new(),
            attachments,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<RawAttachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn is_blank(&self) -> bool {
        !self.has_text() && self.attachments.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A local attachment could not be read or described.
    AttachmentRead,
    /// The request never produced a readable stream.
    Transport,
    /// The stream opened and then broke.
    StreamRead,
    /// The send future was dropped before the call finished.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CallFailure {
    fn from_provider(error: &ProviderError, state: CallState) -> Self {
        let kind = if error.is_attachment_read() {
            FailureKind::AttachmentRead
        } else if state == CallState::Streaming {
            FailureKind::StreamRead
        } else {
            FailureKind::Transport
        };

        Self {
            kind,
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Completed,
    Failed(CallFailure),
}

/// Result of one accepted send action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
    pub outcome: CallOutcome,
    /// Attachments that were uploaded but got no inline preview.
    pub skipped_attachments: Vec<String>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SendError {
    #[snafu(display("a recommendation request is already in flight"))]
    RequestInFlight { stage: &'static str },
    #[snafu(display("nothing to send: text is blank and no files are attached"))]
    EmptyInput { stage: &'static str },
    #[snafu(display("attachments sent without text must include at least one image"))]
    NoImageAttachments { stage: &'static str },
    #[snafu(display("failed to build attachment previews on `{stage}`: {source}"))]
    PreviewAttachments {
        stage: &'static str,
        source: AttachmentError,
    },
    #[snafu(display("failed to load attachments for upload on `{stage}`: {source}"))]
    PrepareAttachments {
        stage: &'static str,
        source: ProviderError,
    },
}

impl SendError {
    pub fn is_attachment_read(&self) -> bool {
        matches!(
            self,
            Self::PreviewAttachments { .. } | Self::PrepareAttachments { .. }
        )
    }
}

pub type SendResult<T> = Result<T, SendError>;

/// Orchestrates one conversation: transcript writes, attachment previews,
/// dispatch and streaming.
///
/// This is the only writer of the transcript and of the in-flight flag. One call
/// may be in flight at a time.
pub struct ConversationController {
    provider: Arc<dyn RecommendationProvider>,
    transcript: Transcript,
    apology: String,
    call_state: CallState,
    active_assistant_id: Option<MessageId>,
    in_flight_tx: watch::Sender<bool>,
}

impl ConversationController {
    pub fn new(provider: Arc<dyn RecommendationProvider>, settings: &Settings) -> Self {
        let mut transcript = Transcript::new();
        if !settings.greeting.is_empty() {
            transcript.append(|id| Message::assistant(id, settings.greeting.clone()));
        }

        let (in_flight_tx, _) = watch::channel(false);

        Self {
            provider,
            transcript,
            apology: settings.apology.clone(),
            call_state: CallState::Idle,
            active_assistant_id: None,
            in_flight_tx,
        }
    }

    pub fn from_settings(settings: &Settings) -> ProviderResult<Self> {
        let provider = corki_llm::create_provider(settings.to_provider_config())?;
        Ok(Self::new(provider, settings))
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn subscribe(&self) -> watch::Receiver<TranscriptSnapshot> {
        self.transcript.subscribe()
    }

    pub fn in_flight(&self) -> bool {
        self.call_state.is_active()
    }

    /// The presentation disables input while this reads `true`.
    pub fn subscribe_in_flight(&self) -> watch::Receiver<bool> {
        self.in_flight_tx.subscribe()
    }

    /// State of the most recent call, `Idle` before the first one.
    pub fn call_state(&self) -> CallState {
        self.call_state
    }

    pub async fn check_health(&self) -> ProviderResult<HealthStatus> {
        self.provider.health().await
    }

    /// Runs one send action to completion.
    ///
    /// Attachment failures abort before the transcript is touched. Call failures
    /// are reported in the transcript through the apology text and in the
    /// returned report.
    pub async fn send(&mut self, input: PendingInput) -> SendResult<SendReport> {
        ensure!(
            !self.in_flight(),
            RequestInFlightSnafu {
                stage: "send-gate"
            }
        );
        ensure!(
            !input.is_blank(),
            EmptyInputSnafu {
                stage: "send-gate"
            }
        );
        ensure!(
            input.has_text() || input.attachments.iter().any(RawAttachment::is_image),
            NoImageAttachmentsSnafu {
                stage: "send-gate"
            }
        );

        let PendingInput { text, attachments } = input;
        let text = text.trim().to_string();
        let prompt = if text.is_empty() {
            UPLOAD_PROMPT.to_string()
        } else {
            text.clone()
        };

        tracing::info!(
            provider_id = %self.provider.id(),
            attachment_count = attachments.len(),
            "starting send action"
        );

        let request = RecommendationRequest::new(prompt).with_attachments(attachments.clone());
        let (previews, prepared) =
            futures::future::join(encode_previews(&attachments), request.prepare()).await;

        let previews = previews
            .context(PreviewAttachmentsSnafu {
                stage: "encode-previews",
            })
            .inspect_err(|error| {
                tracing::error!(error = %error, "aborting send, previews failed");
            })?;
        let prepared = prepared
            .context(PrepareAttachmentsSnafu {
                stage: "prepare-request",
            })
            .inspect_err(|error| {
                tracing::error!(error = %error, "aborting send, upload payload failed");
            })?;

        let user_text = if text.is_empty() {
            upload_summary(previews.previews.len())
        } else {
            text
        };
        let user_message_id = self
            .transcript
            .append(|id| Message::user(id, user_text, previews.previews));

        let assistant_message_id = self.begin_call();
        let outcome = self.stream_reply(assistant_message_id, prepared).await;
        self.finish_call(assistant_message_id, &outcome);

        Ok(SendReport {
            user_message_id,
            assistant_message_id,
            outcome,
            skipped_attachments: previews.skipped,
        })
    }

    /// Finalizes a call whose `send` future was dropped before it finished.
    ///
    /// Returns `false` when nothing was in flight.
    pub fn abandon_in_flight(&mut self) -> bool {
        let Some(assistant_message_id) = self.active_assistant_id else {
            return false;
        };

        let outcome = CallOutcome::Failed(CallFailure {
            kind: FailureKind::Interrupted,
            message: "send action dropped before the call finished".to_string(),
        });
        self.finish_call(assistant_message_id, &outcome);
        true
    }

    fn begin_call(&mut self) -> MessageId {
        self.call_state = CallState::Idle;
        self.apply_call_transition(CallTransition::Dispatch);
        self.in_flight_tx.send_replace(true);

        let assistant_message_id = self.transcript.append(Message::assistant_placeholder);
        self.active_assistant_id = Some(assistant_message_id);
        assistant_message_id
    }

    async fn stream_reply(
        &mut self,
        assistant_message_id: MessageId,
        request: PreparedRequest,
    ) -> CallOutcome {
        let mut stream = self.provider.recommend(request);

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Opened => {
                    self.apply_call_transition(CallTransition::Open);
                }
                StreamEvent::Chunk(chunk) => {
                    self.ensure_streaming();
                    self.transcript
                        .update_by_id(assistant_message_id, |update| update.text.push_str(&chunk));
                }
                StreamEvent::Completed => {
                    self.ensure_streaming();
                    return CallOutcome::Completed;
                }
                StreamEvent::Failed(error) => {
                    return CallOutcome::Failed(CallFailure::from_provider(
                        &error,
                        self.call_state,
                    ));
                }
            }
        }

        let error = ProviderError::StreamEndedEarly {
            stage: "consume-stream",
        };
        CallOutcome::Failed(CallFailure::from_provider(&error, self.call_state))
    }

    fn finish_call(&mut self, assistant_message_id: MessageId, outcome: &CallOutcome) {
        match outcome {
            CallOutcome::Completed => {
                self.transcript.update_by_id(assistant_message_id, |update| {
                    *update.status = MessageStatus::Done;
                });
                self.apply_call_transition(CallTransition::Complete);

                tracing::info!(message_id = %assistant_message_id, "recommendation completed");
            }
            CallOutcome::Failed(failure) => {
                tracing::error!(
                    message_id = %assistant_message_id,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "recommendation failed"
                );

                let apology = self.apology.clone();
                self.transcript.update_by_id(assistant_message_id, |update| {
                    *update.text = apology;
                    *update.status = MessageStatus::Failed;
                });
                self.apply_call_transition(CallTransition::Fail);
            }
        }

        self.active_assistant_id = None;
        self.in_flight_tx.send_replace(false);
    }

    fn ensure_streaming(&mut self) {
        // Providers may skip `Opened`; the first chunk or completion implies it.
        if self.call_state == CallState::Sending {
            self.apply_call_transition(CallTransition::Open);
        }
    }

    fn apply_call_transition(&mut self, transition: CallTransition) {
        match self.call_state.apply(transition) {
            Ok(next_state) => self.call_state = next_state,
            Err(rejection) => {
                tracing::warn!(
                    state = ?self.call_state,
                    transition = ?transition,
                    rejection = ?rejection,
                    "ignoring illegal call transition"
                );
            }
        }
    }
}

fn upload_summary(count: usize) -> String {
    if count == 1 {
        "Uploaded 1 image.".to_string()
    } else {
        format!("Uploaded {count} images.")
    }
}
