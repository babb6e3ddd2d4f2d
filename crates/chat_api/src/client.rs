use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ChatApiConfig;
use crate::conflict::lock_reason;
use crate::error::{parse_error_message, ChatApiError};
use crate::frames::{token_stream, TokenStream};
use crate::headers::{build_headers, ACCEPT_EVENT_STREAM, ACCEPT_JSON};
use crate::payload::{ChatReply, ChatRequest, HistoryMessage, ModelCatalog, SessionSummary};
use crate::url::{
    endpoint_url, session_messages_url, CHAT_SEGMENTS, CHAT_STREAM_SEGMENTS, MODELS_SEGMENTS,
    SESSIONS_SEGMENTS,
};

#[derive(Debug, Clone)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn header_map(&self, accept: &str) -> Result<HeaderMap, ChatApiError> {
        let mut out = HeaderMap::new();
        for (key, value) in build_headers(&self.config, accept) {
            let name =
                HeaderName::from_bytes(key.as_bytes()).map_err(|error| ChatApiError::InvalidHeader {
                    name: key.clone(),
                    message: error.to_string(),
                })?;
            let value = HeaderValue::from_str(&value).map_err(|error| ChatApiError::InvalidHeader {
                name: key.clone(),
                message: error.to_string(),
            })?;
            out.insert(name, value);
        }
        Ok(out)
    }

    pub fn build_stream_request(&self, request: &ChatRequest) -> Result<RequestBuilder, ChatApiError> {
        let url = endpoint_url(&self.config.base_url, CHAT_STREAM_SEGMENTS)?;
        Ok(self
            .http
            .post(url)
            .headers(self.header_map(ACCEPT_EVENT_STREAM)?)
            .json(request))
    }

    pub fn build_chat_request(&self, request: &ChatRequest) -> Result<RequestBuilder, ChatApiError> {
        let url = endpoint_url(&self.config.base_url, CHAT_SEGMENTS)?;
        Ok(self
            .http
            .post(url)
            .headers(self.header_map(ACCEPT_JSON)?)
            .json(request))
    }

    /// `POST /chat/stream`: returns the lazily decoded token sequence once
    /// response headers arrive with a success status.
    pub async fn open_stream(&self, request: &ChatRequest) -> Result<TokenStream, ChatApiError> {
        debug!(session_id = %request.session_id, "opening chat stream");
        let response = self.build_stream_request(request)?.send().await?;
        let response = ensure_success(response).await?;
        Ok(token_stream(response.bytes_stream()))
    }

    /// `POST /chat`: the whole reply in one body.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String, ChatApiError> {
        debug!(session_id = %request.session_id, "requesting non-streaming reply");
        let response = self.build_chat_request(request)?.send().await?;
        let reply: ChatReply = read_json(ensure_success(response).await?).await?;
        Ok(reply.reply)
    }

    /// `GET /sessions`.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ChatApiError> {
        let url = endpoint_url(&self.config.base_url, SESSIONS_SEGMENTS)?;
        self.get_json(url).await
    }

    /// `GET /sessions/{id}/messages`, oldest first.
    pub async fn session_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<HistoryMessage>, ChatApiError> {
        let url = session_messages_url(&self.config.base_url, session_id, self.config.history_limit)?;
        self.get_json(url).await
    }

    /// `GET /models`.
    pub async fn list_models(&self) -> Result<ModelCatalog, ChatApiError> {
        let url = endpoint_url(&self.config.base_url, MODELS_SEGMENTS)?;
        self.get_json(url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ChatApiError> {
        let response = self
            .http
            .get(url)
            .headers(self.header_map(ACCEPT_JSON)?)
            .send()
            .await?;
        read_json(ensure_success(response).await?).await
    }
}

/// Map non-2xx responses onto the error taxonomy. A `409` naming the session
/// lock becomes [`ChatApiError::SessionLocked`]; everything else is
/// [`ChatApiError::Status`].
async fn ensure_success(response: Response) -> Result<Response, ChatApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if let Some(reason) = lock_reason(status, &body) {
        debug!(%status, %reason, "session locked");
        return Err(ChatApiError::SessionLocked { reason });
    }

    Err(ChatApiError::Status {
        status,
        message: parse_error_message(status, &body),
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ChatApiError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
