//! Ordered, in-memory transcript of the displayed session.
//!
//! The store is the only writer of conversation entries. Sends address
//! entries exclusively through the [`EntryId`] handles recorded on their
//! [`SendAttempt`], and every send-driven operation is a no-op once the send's
//! session is no longer the displayed one or its user entry was replaced by a
//! reload.

use std::fmt;

use chat_api::{HistoryMessage, MessageRole};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::attempt::{SendAttempt, SendId};
use crate::error::EngineError;

/// Stable entry handle. Never reused for the lifetime of a store, including
/// across reloads and session switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleTag {
    #[default]
    None,
    Optimistic,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub id: EntryId,
    pub role: Role,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub tag: LifecycleTag,
}

impl ConversationEntry {
    pub fn is_durable(&self) -> bool {
        self.tag == LifecycleTag::None
    }
}

#[derive(Debug)]
pub struct TranscriptStore {
    session_id: Option<String>,
    entries: Vec<ConversationEntry>,
    next_entry_id: u64,
    next_send_id: SendId,
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self {
            session_id: None,
            entries: Vec::new(),
            next_entry_id: 1,
            next_send_id: 1,
        }
    }
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store already showing `session_id` with an empty transcript.
    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> Option<&ConversationEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn is_displayed(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    /// Appends the optimistic user entry and opens a send bound to the
    /// displayed session.
    pub fn begin_send(
        &mut self,
        text: &str,
        model_override: Option<&str>,
    ) -> Result<SendAttempt, EngineError> {
        let session_id = self
            .session_id
            .clone()
            .ok_or(EngineError::NoActiveSession)?;

        let user_entry = self.push_entry(Role::User, text.to_string(), LifecycleTag::Optimistic);
        let send_id = self.next_send_id;
        self.next_send_id += 1;

        Ok(SendAttempt {
            send_id,
            session_id,
            message_text: text.to_string(),
            model_override: model_override.map(ToOwned::to_owned),
            attempt_number: 1,
            user_entry,
            assistant_entry: None,
        })
    }

    /// Binds a streaming assistant placeholder to `attempt`, reusing the one it
    /// already owns while that entry is still live.
    pub fn on_first_token(&mut self, attempt: &mut SendAttempt) -> Option<EntryId> {
        if !self.applies_to(attempt) {
            return None;
        }

        if let Some(existing) = attempt.assistant_entry {
            if self.entry(existing).is_some() {
                return Some(existing);
            }
        }

        let id = self.push_entry(Role::Assistant, String::new(), LifecycleTag::Streaming);
        attempt.assistant_entry = Some(id);
        Some(id)
    }

    pub fn on_token(&mut self, attempt: &SendAttempt, token: &str) {
        if !self.applies_to(attempt) {
            return;
        }

        if let Some(entry) = attempt
            .assistant_entry
            .and_then(|id| self.entry_mut(id))
        {
            entry.content.push_str(token);
        }
    }

    /// Finalizes the reply and makes both of the send's entries durable.
    pub fn on_success(&mut self, attempt: &mut SendAttempt, final_text: &str) {
        if !self.applies_to(attempt) {
            return;
        }

        self.settle_assistant(attempt, final_text);
        if let Some(user) = self.entry_mut(attempt.user_entry) {
            user.tag = LifecycleTag::None;
        }
    }

    /// Rolls back the send's in-progress artifacts.
    ///
    /// A terminal failure removes the optimistic user entry too; a mid-retry
    /// failure keeps it so the next attempt reuses it.
    pub fn on_failure(&mut self, attempt: &mut SendAttempt, terminal: bool) {
        let assistant = attempt.assistant_entry.take();
        if !self.applies_to(attempt) {
            return;
        }

        if let Some(assistant) = assistant {
            self.remove_if_tagged(assistant, LifecycleTag::Streaming);
        }

        if terminal {
            self.remove_if_tagged(attempt.user_entry, LifecycleTag::Optimistic);
        }
    }

    /// Installs a non-streamed reply, creating the assistant entry if the
    /// attempt never produced one.
    pub fn on_fallback_complete(&mut self, attempt: &mut SendAttempt, full_text: &str) {
        if !self.applies_to(attempt) {
            return;
        }

        self.settle_assistant(attempt, full_text);
    }

    pub fn on_cancelled(&mut self, attempt: &mut SendAttempt) {
        self.on_failure(attempt, true);
    }

    /// Displays another session, replacing the transcript with its history.
    pub fn switch_session(&mut self, session_id: impl Into<String>, history: &[HistoryMessage]) {
        self.session_id = Some(session_id.into());
        self.replace_with_history(history);
    }

    /// Replaces the transcript with a server-confirmed copy. Ignored when
    /// `session_id` is no longer displayed.
    pub fn reload(&mut self, session_id: &str, history: &[HistoryMessage]) -> bool {
        if !self.is_displayed(session_id) {
            return false;
        }

        self.replace_with_history(history);
        true
    }

    /// The send's session is displayed and its user entry has not been
    /// superseded by a reload.
    fn applies_to(&self, attempt: &SendAttempt) -> bool {
        self.is_displayed(&attempt.session_id) && self.entry(attempt.user_entry).is_some()
    }

    fn settle_assistant(&mut self, attempt: &mut SendAttempt, text: &str) {
        let live = attempt
            .assistant_entry
            .filter(|id| self.entry(*id).is_some());

        match live.and_then(|id| self.entry_mut(id)) {
            Some(entry) => {
                entry.content = text.to_string();
                entry.tag = LifecycleTag::None;
            }
            None => {
                let id = self.push_entry(Role::Assistant, text.to_string(), LifecycleTag::None);
                attempt.assistant_entry = Some(id);
            }
        }
    }

    fn replace_with_history(&mut self, history: &[HistoryMessage]) {
        let mut entries = Vec::with_capacity(history.len());
        for message in history {
            let role = match message.role {
                MessageRole::User => Role::User,
                MessageRole::Assistant => Role::Assistant,
                MessageRole::System | MessageRole::Other => continue,
            };

            entries.push(ConversationEntry {
                id: self.mint_id(),
                role,
                content: message.content.clone(),
                created_at: parse_timestamp(message.created_at.as_deref()),
                tag: LifecycleTag::None,
            });
        }
        self.entries = entries;
    }

    fn push_entry(&mut self, role: Role, content: String, tag: LifecycleTag) -> EntryId {
        let id = self.mint_id();
        self.entries.push(ConversationEntry {
            id,
            role,
            content,
            created_at: OffsetDateTime::now_utc(),
            tag,
        });
        id
    }

    fn remove_if_tagged(&mut self, id: EntryId, tag: LifecycleTag) {
        self.entries
            .retain(|entry| !(entry.id == id && entry.tag == tag));
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut ConversationEntry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    fn mint_id(&mut self) -> EntryId {
        let id = EntryId(self.next_entry_id);
        self.next_entry_id += 1;
        id
    }
}

/// Backend timestamps are ISO-8601, with or without an offset; offset-less
/// values are UTC.
fn parse_timestamp(raw: Option<&str>) -> OffsetDateTime {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return OffsetDateTime::now_utc();
    };

    OffsetDateTime::parse(raw, &Rfc3339)
        .or_else(|_| PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT).map(|value| value.assume_utc()))
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
}
