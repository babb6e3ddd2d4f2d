use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chat_api::{ChatApiError, ChatRequest, HistoryMessage, ModelCatalog, SessionSummary};
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attempt::{AttemptMachine, SendAttempt, SendId, SendState};
use crate::directory::SessionDirectory;
use crate::error::EngineError;
use crate::events::{SendEvent, SendOutcome};
use crate::policy::RetryPolicy;
use crate::transcript::TranscriptStore;
use crate::transport::ChatTransport;

struct InFlightSend {
    send_id: SendId,
    cancel: CancellationToken,
}

enum AttemptError {
    Cancelled,
    Transport(ChatApiError),
    Engine(EngineError),
}

impl From<ChatApiError> for AttemptError {
    fn from(error: ChatApiError) -> Self {
        Self::Transport(error)
    }
}

impl From<EngineError> for AttemptError {
    fn from(error: EngineError) -> Self {
        Self::Engine(error)
    }
}

/// Drives sends for the displayed session.
///
/// Each [`SendController::send`] call runs one logical send to completion:
/// stream the reply into the transcript, fall back to the non-streaming
/// endpoint when the stream produced no text, and retry with backoff while the
/// backend reports the session as locked. At most one send per session is in
/// flight; a newer send for the same session, or opening another session,
/// cancels it.
pub struct SendController<T: ChatTransport> {
    transport: Arc<T>,
    transcript: Arc<Mutex<TranscriptStore>>,
    directory: Arc<Mutex<SessionDirectory>>,
    policy: RetryPolicy,
    /// Taken inside the transcript lock, never the other way round.
    in_flight: Mutex<HashMap<String, InFlightSend>>,
    events: Option<UnboundedSender<SendEvent>>,
}

impl<T: ChatTransport> SendController<T> {
    pub fn new(
        transport: Arc<T>,
        transcript: Arc<Mutex<TranscriptStore>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            transcript,
            directory: Arc::new(Mutex::new(SessionDirectory::default())),
            policy,
            in_flight: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    pub fn with_event_sink(mut self, events: UnboundedSender<SendEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn transcript(&self) -> Arc<Mutex<TranscriptStore>> {
        Arc::clone(&self.transcript)
    }

    pub fn directory(&self) -> Arc<Mutex<SessionDirectory>> {
        Arc::clone(&self.directory)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sends `text` to `session_id`, which must be the displayed session.
    ///
    /// Transport failures are reported through the returned [`SendOutcome`];
    /// `Err` is reserved for sends that could not start.
    pub async fn send(
        &self,
        session_id: &str,
        text: &str,
        model: Option<&str>,
    ) -> Result<SendOutcome, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        let registered = {
            let mut transcript = lock_unpoisoned(&self.transcript);
            match transcript.session_id() {
                None => return Err(EngineError::NoActiveSession),
                Some(active) if active != session_id => {
                    return Err(EngineError::SessionNotActive {
                        requested: session_id.to_string(),
                        active: active.to_string(),
                    });
                }
                Some(_) => {}
            }
            let attempt = transcript.begin_send(text, model)?;
            // Registered under the transcript lock so a concurrent switch or
            // newer send always observes it.
            let cancel = self.register_in_flight(&attempt);
            (attempt, cancel)
        };
        let (mut attempt, cancel) = registered;

        info!(
            session_id = %attempt.session_id(),
            send_id = attempt.send_id(),
            "send started"
        );
        self.emit(SendEvent::Started {
            send_id: attempt.send_id(),
            session_id: attempt.session_id().to_string(),
        });

        let result = self.drive(&mut attempt, &cancel).await;
        self.clear_in_flight(&attempt);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => {
                self.abort_send(&mut attempt, &error).await;
                return Err(error);
            }
        };

        self.emit(terminal_event(&outcome));
        if !matches!(outcome, SendOutcome::Cancelled { .. }) {
            self.refresh_after_send().await;
        }

        Ok(outcome)
    }

    /// Displays `session_id` with `history` and cancels in-flight sends for
    /// every other session.
    pub fn switch_session(&self, session_id: &str, history: &[HistoryMessage]) {
        let mut transcript = lock_unpoisoned(&self.transcript);
        transcript.switch_session(session_id, history);
        self.cancel_other_sessions(session_id);
    }

    /// Switches to `session_id` (when not already displayed) and loads its
    /// persisted history. Returns whether the history was applied.
    pub async fn open_session(&self, session_id: &str) -> Result<bool, EngineError> {
        let displayed = lock_unpoisoned(&self.transcript).is_displayed(session_id);
        if !displayed {
            self.switch_session(session_id, &[]);
        }

        self.reload_session(session_id).await
    }

    /// Re-fetches the displayed session's history.
    pub async fn reload_transcript(&self) -> Result<bool, EngineError> {
        let session_id = lock_unpoisoned(&self.transcript)
            .session_id()
            .map(ToOwned::to_owned)
            .ok_or(EngineError::NoActiveSession)?;

        self.reload_session(&session_id).await
    }

    pub async fn refresh_sessions(&self) -> Result<Vec<SessionSummary>, EngineError> {
        match self.transport.list_sessions().await {
            Ok(sessions) => {
                lock_unpoisoned(&self.directory).replace(sessions.clone());
                Ok(sessions)
            }
            Err(error) => {
                lock_unpoisoned(&self.directory).record_failure(error.to_string());
                Err(error.into())
            }
        }
    }

    pub async fn list_models(&self) -> Result<ModelCatalog, EngineError> {
        Ok(self.transport.list_models().await?)
    }

    /// Number of sends currently in flight across all sessions.
    pub fn in_flight_count(&self) -> usize {
        lock_unpoisoned(&self.in_flight).len()
    }

    async fn reload_session(&self, session_id: &str) -> Result<bool, EngineError> {
        let history = self.transport.session_messages(session_id).await?;
        let applied = lock_unpoisoned(&self.transcript).reload(session_id, &history);
        if !applied {
            debug!(session_id, "history arrived after session switch; dropped");
        }
        Ok(applied)
    }

    async fn drive(
        &self,
        attempt: &mut SendAttempt,
        cancel: &CancellationToken,
    ) -> Result<SendOutcome, EngineError> {
        let mut machine = AttemptMachine::default();

        loop {
            machine.transition(SendState::Sending)?;
            debug!(
                send_id = attempt.send_id(),
                attempt = attempt.attempt_number(),
                "attempt started"
            );

            let error = match self.run_attempt(attempt, &mut machine, cancel).await {
                Ok(reply) => {
                    machine.transition(SendState::Succeeded)?;
                    lock_unpoisoned(&self.transcript).on_success(attempt, &reply);
                    info!(
                        send_id = attempt.send_id(),
                        attempts = attempt.attempt_number(),
                        "send completed"
                    );
                    return Ok(SendOutcome::Succeeded {
                        send_id: attempt.send_id(),
                        attempts: attempt.attempt_number(),
                        reply,
                    });
                }
                Err(AttemptError::Cancelled) => return self.cancel_attempt(&mut machine, attempt),
                Err(AttemptError::Engine(error)) => return Err(error),
                Err(AttemptError::Transport(error)) => error,
            };

            if !error.is_retryable() {
                machine.transition(SendState::FailedTerminal)?;
                lock_unpoisoned(&self.transcript).on_failure(attempt, true);
                warn!(
                    send_id = attempt.send_id(),
                    attempt = attempt.attempt_number(),
                    %error,
                    "send failed"
                );
                return Ok(SendOutcome::FailedTerminal {
                    send_id: attempt.send_id(),
                    attempts: attempt.attempt_number(),
                    error,
                });
            }

            machine.transition(SendState::ConflictWait)?;
            lock_unpoisoned(&self.transcript).on_failure(attempt, false);

            let attempts = attempt.attempt_number();
            if !self.policy.allows_retry_after(attempts) {
                machine.transition(SendState::FailedExhausted)?;
                lock_unpoisoned(&self.transcript).on_failure(attempt, true);
                warn!(
                    send_id = attempt.send_id(),
                    attempts,
                    "session still locked; giving up"
                );
                return Ok(SendOutcome::FailedExhausted {
                    send_id: attempt.send_id(),
                    attempts,
                    last_error: error,
                });
            }

            let delay = self.policy.delay_after_attempt(attempts);
            info!(
                send_id = attempt.send_id(),
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "session locked; retry scheduled"
            );
            self.emit(SendEvent::Retrying {
                send_id: attempt.send_id(),
                attempt: attempts + 1,
                max_attempts: self.policy.max_attempts,
                delay,
                reason: error.to_string(),
            });

            if cancellable(cancel, sleep(delay)).await.is_err() {
                return self.cancel_attempt(&mut machine, attempt);
            }
            attempt.advance();
        }
    }

    /// One network attempt: stream, or fall back when the stream carried no
    /// text. Returns the full reply.
    async fn run_attempt(
        &self,
        attempt: &mut SendAttempt,
        machine: &mut AttemptMachine,
        cancel: &CancellationToken,
    ) -> Result<String, AttemptError> {
        let request = ChatRequest::new(attempt.session_id(), attempt.message_text())
            .with_model(attempt.model_override());

        let mut tokens = cancellable(cancel, self.transport.open_stream(&request)).await??;
        let mut reply = String::new();

        while let Some(token) = cancellable(cancel, tokens.next()).await? {
            let token = token?;
            if machine.state() == SendState::Sending {
                machine.transition(SendState::Streaming)?;
                lock_unpoisoned(&self.transcript).on_first_token(attempt);
            }

            lock_unpoisoned(&self.transcript).on_token(attempt, &token);
            reply.push_str(&token);
            self.emit(SendEvent::Token {
                send_id: attempt.send_id(),
                text: token,
            });
        }
        drop(tokens);

        if !reply.is_empty() {
            return Ok(reply);
        }

        machine.transition(SendState::Fallback)?;
        debug!(send_id = attempt.send_id(), "stream produced no text; using fallback");
        let full = cancellable(cancel, self.transport.complete(&request)).await??;
        lock_unpoisoned(&self.transcript).on_fallback_complete(attempt, &full);
        if !full.is_empty() {
            self.emit(SendEvent::Token {
                send_id: attempt.send_id(),
                text: full.clone(),
            });
        }

        Ok(full)
    }

    fn cancel_attempt(
        &self,
        machine: &mut AttemptMachine,
        attempt: &mut SendAttempt,
    ) -> Result<SendOutcome, EngineError> {
        machine.transition(SendState::Cancelled)?;
        lock_unpoisoned(&self.transcript).on_cancelled(attempt);
        info!(send_id = attempt.send_id(), "send cancelled");
        Ok(SendOutcome::Cancelled {
            send_id: attempt.send_id(),
            attempts: attempt.attempt_number(),
        })
    }

    /// Terminal handling for a send the engine itself could not drive.
    async fn abort_send(&self, attempt: &mut SendAttempt, error: &EngineError) {
        lock_unpoisoned(&self.transcript).on_failure(attempt, true);
        warn!(send_id = attempt.send_id(), %error, "send aborted");
        self.emit(SendEvent::Failed {
            send_id: attempt.send_id(),
            attempts: attempt.attempt_number(),
            exhausted: false,
            error: error.to_string(),
        });
        self.refresh_after_send().await;
    }

    async fn refresh_after_send(&self) {
        if let Err(error) = self.refresh_sessions().await {
            warn!(%error, "session list refresh failed");
        }
    }

    fn register_in_flight(&self, attempt: &SendAttempt) -> CancellationToken {
        let cancel = CancellationToken::new();
        let previous = lock_unpoisoned(&self.in_flight).insert(
            attempt.session_id().to_string(),
            InFlightSend {
                send_id: attempt.send_id(),
                cancel: cancel.clone(),
            },
        );

        if let Some(previous) = previous {
            debug!(
                superseded = previous.send_id,
                send_id = attempt.send_id(),
                "newer send supersedes in-flight send"
            );
            previous.cancel.cancel();
        }

        cancel
    }

    fn clear_in_flight(&self, attempt: &SendAttempt) {
        let mut in_flight = lock_unpoisoned(&self.in_flight);
        let owned = in_flight
            .get(attempt.session_id())
            .map(|active| active.send_id)
            == Some(attempt.send_id());
        if owned {
            in_flight.remove(attempt.session_id());
        }
    }

    fn cancel_other_sessions(&self, keep: &str) {
        let mut in_flight = lock_unpoisoned(&self.in_flight);
        in_flight.retain(|session_id, active| {
            if session_id == keep {
                return true;
            }
            debug!(session_id = %session_id, send_id = active.send_id, "cancelling send for hidden session");
            active.cancel.cancel();
            false
        });
    }

    fn emit(&self, event: SendEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

fn terminal_event(outcome: &SendOutcome) -> SendEvent {
    match outcome {
        SendOutcome::Succeeded { send_id, reply, .. } => SendEvent::Completed {
            send_id: *send_id,
            reply: reply.clone(),
        },
        SendOutcome::FailedTerminal {
            send_id,
            attempts,
            error,
        } => SendEvent::Failed {
            send_id: *send_id,
            attempts: *attempts,
            exhausted: false,
            error: error.to_string(),
        },
        SendOutcome::FailedExhausted {
            send_id,
            attempts,
            last_error,
        } => SendEvent::Failed {
            send_id: *send_id,
            attempts: *attempts,
            exhausted: true,
            error: last_error.to_string(),
        },
        SendOutcome::Cancelled { send_id, .. } => SendEvent::Cancelled { send_id: *send_id },
    }
}

async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, AttemptError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AttemptError::Cancelled),
        output = future => Ok(output),
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
