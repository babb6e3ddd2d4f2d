use std::future::Future;

use chat_api::{
    ChatApiClient, ChatApiError, ChatRequest, HistoryMessage, ModelCatalog, SessionSummary,
    TokenStream,
};

/// The backend calls the engine depends on.
///
/// [`ChatApiClient`] is the production implementation; tests script their own.
pub trait ChatTransport: Send + Sync + 'static {
    /// Opens the streaming endpoint. A "session locked" refusal surfaces here,
    /// before any token.
    fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<TokenStream, ChatApiError>> + Send;

    /// Non-streaming fallback.
    fn complete(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<String, ChatApiError>> + Send;

    fn list_sessions(
        &self,
    ) -> impl Future<Output = Result<Vec<SessionSummary>, ChatApiError>> + Send;

    fn session_messages(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<Vec<HistoryMessage>, ChatApiError>> + Send;

    fn list_models(&self) -> impl Future<Output = Result<ModelCatalog, ChatApiError>> + Send;
}

impl ChatTransport for ChatApiClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<TokenStream, ChatApiError> {
        ChatApiClient::open_stream(self, request).await
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatApiError> {
        ChatApiClient::complete(self, request).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ChatApiError> {
        ChatApiClient::list_sessions(self).await
    }

    async fn session_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<HistoryMessage>, ChatApiError> {
        ChatApiClient::session_messages(self, session_id).await
    }

    async fn list_models(&self) -> Result<ModelCatalog, ChatApiError> {
        ChatApiClient::list_models(self).await
    }
}
