use chat_client::SendEvent;

/// What the terminal should show for one send event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Reply text, written to stdout without a newline.
    Reply(String),
    /// Ends the reply line.
    EndReply,
    /// Status line for stderr.
    Status(String),
}

pub fn render(event: &SendEvent) -> Option<Output> {
    match event {
        SendEvent::Started { .. } => None,
        SendEvent::Token { text, .. } => Some(Output::Reply(text.clone())),
        SendEvent::Retrying {
            attempt,
            max_attempts,
            delay,
            ..
        } => Some(Output::Status(format!(
            "[session locked, retrying in {:.1}s (attempt {attempt}/{max_attempts})]",
            delay.as_secs_f64()
        ))),
        SendEvent::Completed { .. } => Some(Output::EndReply),
        SendEvent::Failed {
            attempts,
            exhausted: true,
            ..
        } => Some(Output::Status(format!(
            "[send failed: session still locked after {attempts} attempts]"
        ))),
        SendEvent::Failed { error, .. } => Some(Output::Status(format!("[send failed: {error}]"))),
        SendEvent::Cancelled { .. } => Some(Output::Status("[send cancelled]".to_string())),
    }
}
