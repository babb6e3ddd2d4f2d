use crate::error::EngineError;
use crate::transcript::EntryId;

pub type SendId = u64;

/// One logical user submission, possibly spanning several network attempts.
///
/// Created by [`crate::transcript::TranscriptStore::begin_send`]. The session
/// id is fixed for the lifetime of the record; the entry handles are the only
/// way the send refers to transcript entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAttempt {
    pub(crate) send_id: SendId,
    pub(crate) session_id: String,
    pub(crate) message_text: String,
    pub(crate) model_override: Option<String>,
    pub(crate) attempt_number: u32,
    pub(crate) user_entry: EntryId,
    pub(crate) assistant_entry: Option<EntryId>,
}

impl SendAttempt {
    pub fn send_id(&self) -> SendId {
        self.send_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn message_text(&self) -> &str {
        &self.message_text
    }

    pub fn model_override(&self) -> Option<&str> {
        self.model_override.as_deref()
    }

    /// 1-based; bumped only after a retryable conflict.
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    pub fn user_entry(&self) -> EntryId {
        self.user_entry
    }

    pub fn assistant_entry(&self) -> Option<EntryId> {
        self.assistant_entry
    }

    pub(crate) fn advance(&mut self) {
        self.attempt_number += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendState {
    Idle,
    Sending,
    Streaming,
    Fallback,
    ConflictWait,
    Succeeded,
    FailedTerminal,
    FailedExhausted,
    Cancelled,
}

impl SendState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::FailedTerminal | Self::FailedExhausted | Self::Cancelled
        )
    }

    pub fn can_transition_to(self, next: SendState) -> bool {
        use SendState::*;

        if next == Cancelled {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Idle, Sending)
                | (Sending, Streaming)
                | (Sending, Fallback)
                | (Streaming, Fallback)
                | (Sending | Streaming | Fallback, Succeeded)
                | (Sending | Streaming | Fallback, ConflictWait)
                | (Sending | Streaming | Fallback, FailedTerminal)
                | (ConflictWait, Sending)
                | (ConflictWait, FailedExhausted)
        )
    }
}

/// Guards the send lifecycle; illegal transitions are reported and not applied.
#[derive(Debug, Clone)]
pub struct AttemptMachine {
    state: SendState,
}

impl Default for AttemptMachine {
    fn default() -> Self {
        Self {
            state: SendState::Idle,
        }
    }
}

impl AttemptMachine {
    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn transition(&mut self, next: SendState) -> Result<SendState, EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_with_fallback() {
        let mut machine = AttemptMachine::default();
        for next in [
            SendState::Sending,
            SendState::Streaming,
            SendState::Fallback,
            SendState::Succeeded,
        ] {
            machine.transition(next).expect("legal transition");
        }
        assert_eq!(machine.state(), SendState::Succeeded);
    }

    #[test]
    fn conflict_loops_back_to_sending() {
        let mut machine = AttemptMachine::default();
        machine.transition(SendState::Sending).expect("send");
        machine.transition(SendState::ConflictWait).expect("conflict");
        machine.transition(SendState::Sending).expect("retry");
        machine.transition(SendState::ConflictWait).expect("conflict");
        machine
            .transition(SendState::FailedExhausted)
            .expect("exhausted");
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn illegal_transition_is_rejected_and_not_applied() {
        let mut machine = AttemptMachine::default();
        let error = machine
            .transition(SendState::Streaming)
            .expect_err("idle cannot stream");
        assert!(matches!(
            error,
            EngineError::InvalidTransition {
                from: SendState::Idle,
                to: SendState::Streaming
            }
        ));
        assert_eq!(machine.state(), SendState::Idle);

        machine.transition(SendState::Sending).expect("send");
        assert!(machine.transition(SendState::FailedExhausted).is_err());
    }

    #[test]
    fn cancellation_only_from_live_states() {
        assert!(SendState::Idle.can_transition_to(SendState::Cancelled));
        assert!(SendState::ConflictWait.can_transition_to(SendState::Cancelled));
        assert!(SendState::Streaming.can_transition_to(SendState::Cancelled));
        assert!(!SendState::Succeeded.can_transition_to(SendState::Cancelled));
        assert!(!SendState::Cancelled.can_transition_to(SendState::Cancelled));
    }
}
