/// Lifecycle of one recommendation call.
///
/// `Idle → Sending → Streaming → {Completed | Failed}`. `Sending` covers request
/// construction and the wait for response headers; `Streaming` covers chunk
/// delivery. Both terminal states are final for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallState {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

/// State transition input for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTransition {
    Dispatch,
    Open,
    Complete,
    Fail,
}

/// Rejection reason for illegal call transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTransitionRejection {
    /// The call already reached a terminal state; a new call is required.
    Finished { state: CallState },
    Illegal {
        from: CallState,
        transition: CallTransition,
    },
}

/// Result type for call transition application.
pub type CallTransitionResult = Result<CallState, CallTransitionRejection>;

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// True while the call holds the in-flight slot.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }

    /// Applies one transition deterministically.
    pub fn apply(self, transition: CallTransition) -> CallTransitionResult {
        if self.is_terminal() {
            return Err(CallTransitionRejection::Finished { state: self });
        }

        match (self, transition) {
            (Self::Idle, CallTransition::Dispatch) => Ok(Self::Sending),
            (Self::Sending, CallTransition::Open) => Ok(Self::Streaming),
            (Self::Streaming, CallTransition::Complete) => Ok(Self::Completed),
            (Self::Sending | Self::Streaming, CallTransition::Fail) => Ok(Self::Failed),
            (from, transition) => Err(CallTransitionRejection::Illegal { from, transition }),
        }
    }
}
