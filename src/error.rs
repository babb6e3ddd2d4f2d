use chat_api::ChatApiError;
use thiserror::Error;

use crate::attempt::SendState;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] ChatApiError),

    #[error("no session is open")]
    NoActiveSession,

    #[error("session {requested} is not the open session ({active})")]
    SessionNotActive { requested: String, active: String },

    #[error("message is empty")]
    EmptyMessage,

    #[error("invalid send transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SendState, to: SendState },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
