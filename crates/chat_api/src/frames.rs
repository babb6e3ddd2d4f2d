use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::error::ChatApiError;

/// Marker every event line starts with.
pub const DATA_PREFIX: &str = "data:";
/// Payload that ends a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Lazy sequence of content tokens decoded from one streamed response.
pub type TokenStream = BoxStream<'static, Result<String, ChatApiError>>;

/// One decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Content(String),
    Done,
    Error(String),
}

impl Frame {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Content(_))
    }
}

/// Incremental line decoder for the chat event stream.
///
/// Bytes are buffered until a full line is available, so a chunk boundary can
/// fall anywhere, including inside a multi-byte UTF-8 sequence. Once a
/// [`Frame::Done`] or [`Frame::Error`] has been produced the decoder is
/// finished and ignores further input.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl FrameDecoder {
    /// Feed arbitrary bytes into the decoder and drain complete frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        if self.finished {
            return Vec::new();
        }

        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let Some(frame) = parse_line(&line) else {
                continue;
            };

            let terminal = frame.is_terminal();
            frames.push(frame);
            if terminal {
                self.finished = true;
                self.buffer.clear();
                break;
            }
        }

        frames
    }

    /// Signal end of input. An unterminated trailing line is decoded as a
    /// final line.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.finished {
            return Vec::new();
        }

        self.finished = true;
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest).into_iter().collect()
    }

    /// Decode a complete body in one shot.
    pub fn decode_all(input: &[u8]) -> Vec<Frame> {
        let mut decoder = Self::default();
        let mut frames = decoder.feed(input);
        frames.extend(decoder.finish());
        frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[cfg(test)]
    fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn parse_line(line: &[u8]) -> Option<Frame> {
    let text = String::from_utf8_lossy(line);
    let payload = text.trim().strip_prefix(DATA_PREFIX)?.trim();

    if payload == DONE_SENTINEL {
        return Some(Frame::Done);
    }

    // Noise and partial frames are dropped, not reported.
    let value = serde_json::from_str::<Value>(payload).ok()?;

    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        return Some(Frame::Error(error_text(error)));
    }

    value
        .get("content")
        .and_then(Value::as_str)
        .map(|content| Frame::Content(content.to_owned()))
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
    exhausted: bool,
}

/// Turn a byte-chunk stream into a lazy stream of content tokens.
///
/// The returned stream owns `bytes`; it is dropped as soon as the sentinel or
/// an error frame is seen, when input runs out, or when the caller drops the
/// token stream early.
pub fn token_stream<S, B, E>(bytes: S) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatApiError> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: FrameDecoder::default(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                match frame {
                    Frame::Content(token) => return Some((Ok(token), state)),
                    Frame::Done => return None,
                    Frame::Error(message) => {
                        state.pending.clear();
                        state.exhausted = true;
                        return Some((Err(ChatApiError::StreamFailed { message }), state));
                    }
                }
            }

            if state.exhausted {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.feed(chunk.as_ref());
                    state.pending.extend(frames);
                }
                Some(Err(error)) => {
                    state.exhausted = true;
                    return Some((Err(error.into()), state));
                }
                None => {
                    state.exhausted = true;
                    let frames = state.decoder.finish();
                    state.pending.extend(frames);
                }
            }
        }
    })
    .boxed()
}
