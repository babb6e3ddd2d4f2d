#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chat_api::{
    token_stream, ChatApiError, ChatRequest, HistoryMessage, MessageRole, ModelCatalog,
    SessionSummary, StatusCode, TokenStream,
};
use chat_client::{ChatTransport, RetryPolicy, SendController, SendEvent, TranscriptStore};
use futures_util::stream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// What the next `open_stream` call does.
pub enum StreamScript {
    /// `409` with a session-lock reason.
    Locked,
    /// `200` with these raw body chunks.
    Chunks(Vec<Vec<u8>>),
    /// Non-success status.
    Status(u16, &'static str),
    /// Never answers.
    Hang,
}

impl StreamScript {
    pub fn lines(lines: &[&str]) -> Self {
        Self::Chunks(vec![data_lines(lines)])
    }
}

pub fn data_lines(lines: &[&str]) -> Vec<u8> {
    lines
        .iter()
        .map(|line| format!("data: {line}\n"))
        .collect::<String>()
        .into_bytes()
}

pub fn locked_error() -> ChatApiError {
    ChatApiError::SessionLocked {
        reason: "session_locked".to_string(),
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    streams: Mutex<VecDeque<StreamScript>>,
    replies: Mutex<VecDeque<Result<String, ChatApiError>>>,
    history: Mutex<HashMap<String, Vec<HistoryMessage>>>,
    sessions: Mutex<Vec<SessionSummary>>,
    stream_requests: Mutex<Vec<ChatRequest>>,
    complete_requests: Mutex<Vec<ChatRequest>>,
    list_sessions_calls: AtomicUsize,
    fail_list_sessions: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(streams: Vec<StreamScript>) -> Self {
        Self {
            streams: Mutex::new(streams.into()),
            ..Self::default()
        }
    }

    pub fn with_reply(self, reply: Result<String, ChatApiError>) -> Self {
        lock_unpoisoned(&self.replies).push_back(reply);
        self
    }

    pub fn with_history(self, session_id: &str, history: Vec<HistoryMessage>) -> Self {
        lock_unpoisoned(&self.history).insert(session_id.to_string(), history);
        self
    }

    pub fn with_sessions(self, ids: &[&str]) -> Self {
        *lock_unpoisoned(&self.sessions) = ids.iter().map(|id| summary(id)).collect();
        self
    }

    pub fn fail_list_sessions(&self) {
        self.fail_list_sessions.store(true, Ordering::SeqCst);
    }

    pub fn stream_requests(&self) -> Vec<ChatRequest> {
        lock_unpoisoned(&self.stream_requests).clone()
    }

    pub fn complete_requests(&self) -> Vec<ChatRequest> {
        lock_unpoisoned(&self.complete_requests).clone()
    }

    pub fn list_sessions_calls(&self) -> usize {
        self.list_sessions_calls.load(Ordering::SeqCst)
    }

    fn next_stream(&self, request: &ChatRequest) -> Option<StreamScript> {
        lock_unpoisoned(&self.stream_requests).push(request.clone());
        lock_unpoisoned(&self.streams).pop_front()
    }
}

impl ChatTransport for ScriptedTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<TokenStream, ChatApiError> {
        match self.next_stream(request) {
            Some(StreamScript::Locked) => Err(locked_error()),
            Some(StreamScript::Chunks(chunks)) => Ok(token_stream(stream::iter(
                chunks.into_iter().map(Ok::<Vec<u8>, ChatApiError>),
            ))),
            Some(StreamScript::Status(status, message)) => Err(ChatApiError::Status {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                message: message.to_string(),
            }),
            Some(StreamScript::Hang) => futures_util::future::pending().await,
            None => Err(ChatApiError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "unexpected stream request".to_string(),
            }),
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatApiError> {
        lock_unpoisoned(&self.complete_requests).push(request.clone());
        let reply = lock_unpoisoned(&self.replies).pop_front();
        reply.unwrap_or_else(|| {
            Err(ChatApiError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "unexpected completion request".to_string(),
            })
        })
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ChatApiError> {
        self.list_sessions_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_sessions.load(Ordering::SeqCst) {
            return Err(ChatApiError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "sessions unavailable".to_string(),
            });
        }
        Ok(lock_unpoisoned(&self.sessions).clone())
    }

    async fn session_messages(&self, session_id: &str) -> Result<Vec<HistoryMessage>, ChatApiError> {
        let history = lock_unpoisoned(&self.history).get(session_id).cloned();
        Ok(history.unwrap_or_default())
    }

    async fn list_models(&self) -> Result<ModelCatalog, ChatApiError> {
        Ok(ModelCatalog {
            default: "deepseek-v3".to_string(),
            models: Vec::new(),
        })
    }
}

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub controller: SendController<ScriptedTransport>,
    pub events: UnboundedReceiver<SendEvent>,
}

impl Harness {
    pub fn new(transport: ScriptedTransport) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: ScriptedTransport, policy: RetryPolicy) -> Self {
        let transport = Arc::new(transport);
        let transcript = Arc::new(Mutex::new(TranscriptStore::with_session("s-1")));
        let (sender, events) = unbounded_channel();
        let controller =
            SendController::new(Arc::clone(&transport), transcript, policy).with_event_sink(sender);
        Self {
            transport,
            controller,
            events,
        }
    }

    pub fn drain_events(&mut self) -> Vec<SendEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// `(role, content, tag)` triples of the displayed transcript.
    pub fn snapshot(&self) -> Vec<(chat_client::Role, String, chat_client::LifecycleTag)> {
        let transcript = self.controller.transcript();
        let store = lock_unpoisoned(&transcript);
        let entries = store
            .entries()
            .iter()
            .map(|entry| (entry.role, entry.content.clone(), entry.tag))
            .collect();
        entries
    }
}

pub fn summary(id: &str) -> SessionSummary {
    SessionSummary {
        session_id: id.to_string(),
        character_id: None,
        character_name: None,
        created_at: None,
        last_active_at: None,
        title: None,
    }
}

pub fn history(pairs: &[(MessageRole, &str)]) -> Vec<HistoryMessage> {
    pairs
        .iter()
        .map(|(role, content)| HistoryMessage::new(*role, *content))
        .collect()
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
