use async_trait::async_trait;

use crate::client::{CancelSignal, ChatApiClient, DeltaStream};
use crate::error::ChatApiError;
use crate::payload::ChatCompletionMessage;

/// Completion backend seen by conversation state.
///
/// Implementations perform exactly one request per call. Streams returned by
/// [`CompletionTransport::stream_completion`] must stop promptly once `cancel`
/// is raised.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn stream_completion(
        &self,
        messages: Vec<ChatCompletionMessage>,
        model: &str,
        cancel: CancelSignal,
    ) -> Result<DeltaStream, ChatApiError>;

    async fn complete(
        &self,
        messages: Vec<ChatCompletionMessage>,
        model: &str,
    ) -> Result<String, ChatApiError>;

    async fn list_models(&self) -> Result<Vec<String>, ChatApiError>;
}

#[async_trait]
impl CompletionTransport for ChatApiClient {
    async fn stream_completion(
        &self,
        messages: Vec<ChatCompletionMessage>,
        model: &str,
        cancel: CancelSignal,
    ) -> Result<DeltaStream, ChatApiError> {
        ChatApiClient::stream_completion(self, messages, model, cancel).await
    }

    async fn complete(
        &self,
        messages: Vec<ChatCompletionMessage>,
        model: &str,
    ) -> Result<String, ChatApiError> {
        ChatApiClient::complete(self, messages, model).await
    }

    async fn list_models(&self) -> Result<Vec<String>, ChatApiError> {
        ChatApiClient::list_models(self).await
    }
}
