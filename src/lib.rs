//! Send/stream/retry engine for a streamed chat backend.
//!
//! One user message becomes an optimistic transcript entry, then a streamed
//! assistant reply applied token by token, with bounded retries while the
//! backend reports the session as locked by another sender.
//!
//! # Public API Overview
//! - [`SendController`] drives sends, session switches and reloads.
//! - [`TranscriptStore`] owns the displayed transcript and its entry handles.
//! - [`RetryPolicy`] holds the backoff constants.
//! - [`ChatTransport`] is the seam to the HTTP client in `chat_api`.
//! - [`EngineConfig`] reads `CHAT_CLIENT_*` environment variables.
//!
//! The transcript store is the only writer of entries. Every send-driven
//! mutation goes through the handles recorded on its [`SendAttempt`], and is
//! dropped once the send's session is no longer displayed.

pub mod attempt;
pub mod config;
pub mod controller;
pub mod directory;
pub mod error;
pub mod events;
pub mod policy;
pub mod transcript;
pub mod transport;

pub use crate::attempt::{AttemptMachine, SendAttempt, SendId, SendState};
pub use crate::config::{ConfigError, EngineConfig};
pub use crate::controller::SendController;
pub use crate::directory::SessionDirectory;
pub use crate::error::EngineError;
pub use crate::events::{SendEvent, SendOutcome};
pub use crate::policy::RetryPolicy;
pub use crate::transcript::{ConversationEntry, EntryId, LifecycleTag, Role, TranscriptStore};
pub use crate::transport::ChatTransport;
