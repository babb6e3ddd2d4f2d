use chat_api::SessionSummary;
use time::OffsetDateTime;

/// Last known session list, refreshed after each finished send.
#[derive(Debug, Default, Clone)]
pub struct SessionDirectory {
    sessions: Vec<SessionSummary>,
    refreshed_at: Option<OffsetDateTime>,
    last_error: Option<String>,
}

impl SessionDirectory {
    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }

    pub fn refreshed_at(&self) -> Option<OffsetDateTime> {
        self.refreshed_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn find(&self, session_id: &str) -> Option<&SessionSummary> {
        self.sessions
            .iter()
            .find(|session| session.session_id == session_id)
    }

    pub fn replace(&mut self, sessions: Vec<SessionSummary>) {
        self.sessions = sessions;
        self.refreshed_at = Some(OffsetDateTime::now_utc());
        self.last_error = None;
    }

    /// Keeps the previous list; only the error is recorded.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}
