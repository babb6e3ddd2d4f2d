use std::time::Duration;

use chat_api::ChatApiError;

use crate::attempt::{SendId, SendState};

/// How a logical send ended.
#[derive(Debug)]
pub enum SendOutcome {
    Succeeded {
        send_id: SendId,
        attempts: u32,
        reply: String,
    },
    FailedTerminal {
        send_id: SendId,
        attempts: u32,
        error: ChatApiError,
    },
    /// Every attempt hit the session lock.
    FailedExhausted {
        send_id: SendId,
        attempts: u32,
        last_error: ChatApiError,
    },
    Cancelled {
        send_id: SendId,
        attempts: u32,
    },
}

impl SendOutcome {
    pub fn send_id(&self) -> SendId {
        match self {
            Self::Succeeded { send_id, .. }
            | Self::FailedTerminal { send_id, .. }
            | Self::FailedExhausted { send_id, .. }
            | Self::Cancelled { send_id, .. } => *send_id,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::FailedTerminal { attempts, .. }
            | Self::FailedExhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn state(&self) -> SendState {
        match self {
            Self::Succeeded { .. } => SendState::Succeeded,
            Self::FailedTerminal { .. } => SendState::FailedTerminal,
            Self::FailedExhausted { .. } => SendState::FailedExhausted,
            Self::Cancelled { .. } => SendState::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Progress notifications for front ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendEvent {
    Started {
        send_id: SendId,
        session_id: String,
    },
    Token {
        send_id: SendId,
        text: String,
    },
    /// The session was locked; the next attempt fires after `delay`.
    Retrying {
        send_id: SendId,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        reason: String,
    },
    Completed {
        send_id: SendId,
        reply: String,
    },
    Failed {
        send_id: SendId,
        attempts: u32,
        exhausted: bool,
        error: String,
    },
    Cancelled {
        send_id: SendId,
    },
}

impl SendEvent {
    pub fn send_id(&self) -> SendId {
        match self {
            Self::Started { send_id, .. }
            | Self::Token { send_id, .. }
            | Self::Retrying { send_id, .. }
            | Self::Completed { send_id, .. }
            | Self::Failed { send_id, .. }
            | Self::Cancelled { send_id } => *send_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}
