//! Transport-only client primitives for the chat backend.
//!
//! This crate owns request building, response classification and stream
//! decoding for the chat endpoints. It has no notion of transcripts, retries
//! or sessions beyond the ids carried on the wire; those live in the engine
//! crate that consumes it.
//!
//! The streaming endpoint answers with newline-delimited `data:` frames that
//! carry either a `content` delta, an `error`, or the `[DONE]` sentinel. See
//! [`frames`] for the decoding rules and [`conflict`] for how the
//! "session locked" condition is recognized.

pub mod client;
pub mod config;
pub mod conflict;
pub mod error;
pub mod frames;
pub mod headers;
pub mod payload;
pub mod url;

pub use client::ChatApiClient;
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use frames::{token_stream, Frame, FrameDecoder, TokenStream};
pub use payload::{
    sanitize_model, ChatReply, ChatRequest, HistoryMessage, MessageRole, ModelCatalog,
    ModelOption, SessionSummary,
};
pub use reqwest::StatusCode;
pub use url::normalize_base_url;
