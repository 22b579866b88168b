use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Response};
use tracing::debug;

use crate::config::ChatApiConfig;
use crate::error::ChatApiError;
use crate::events::{ChatCompletionResponse, ModelListResponse};
use crate::payload::{ChatCompletionMessage, ChatCompletionRequest};
use crate::sse::EventStreamParser;
use crate::url::{completions_url, models_url, normalize_base_url};

/// Cancellation flag shared between a request owner and its stream loop.
pub type CancelSignal = Arc<AtomicBool>;

/// Ordered, finite sequence of text deltas for one streamed completion.
///
/// Dropping the stream releases the underlying response body.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, ChatApiError>> + Send>>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);
const EVENT_STREAM_MIME: &str = "text/event-stream";

#[derive(Debug, Clone)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let base_url = normalize_base_url(&config.base_url);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ChatApiError::InvalidBaseUrl(config.base_url));
        }

        let mut builder = Client::builder().default_headers(build_headers(&config)?);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn completions_endpoint(&self) -> String {
        completions_url(&self.config.base_url)
    }

    pub fn models_endpoint(&self) -> String {
        models_url(&self.config.base_url)
    }

    pub fn build_request(&self, request: &ChatCompletionRequest) -> reqwest::RequestBuilder {
        let builder = self.http.post(self.completions_endpoint()).json(request);
        if request.stream {
            builder.header(ACCEPT, EVENT_STREAM_MIME)
        } else {
            builder
        }
    }

    /// Issues one completion request. Non-success statuses become
    /// [`ChatApiError::Status`] carrying the server's error message and body.
    pub async fn send(
        &self,
        request: &ChatCompletionRequest,
        cancel: Option<&CancelSignal>,
    ) -> Result<Response, ChatApiError> {
        if is_cancelled(cancel) {
            return Err(ChatApiError::Cancelled);
        }

        let response = await_or_cancel(self.build_request(request).send(), cancel).await??;
        ensure_success(response, cancel).await
    }

    /// Starts a streamed completion and exposes its text deltas in arrival order.
    pub async fn stream_completion(
        &self,
        messages: Vec<ChatCompletionMessage>,
        model: &str,
        cancel: CancelSignal,
    ) -> Result<DeltaStream, ChatApiError> {
        let request = ChatCompletionRequest::new(model, messages, true);
        let response = self.send(&request, Some(&cancel)).await?;
        Ok(decode_delta_stream(response.bytes_stream(), Some(cancel)))
    }

    /// Runs a non-streaming completion and returns the first choice's text.
    pub async fn complete(
        &self,
        messages: Vec<ChatCompletionMessage>,
        model: &str,
    ) -> Result<String, ChatApiError> {
        let request = ChatCompletionRequest::new(model, messages, false);
        let response = self.send(&request, None).await?;
        let body = response.bytes().await?;
        let parsed: ChatCompletionResponse = serde_json::from_slice(&body)?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(ChatApiError::EmptyResponse)?;
        Ok(choice.message.content.unwrap_or_default())
    }

    /// Fetches the model identifiers offered by the backend.
    pub async fn list_models(&self) -> Result<Vec<String>, ChatApiError> {
        let response = self.http.get(self.models_endpoint()).send().await?;
        let response = ensure_success(response, None).await?;
        let body = response.bytes().await?;
        let parsed: ModelListResponse = serde_json::from_slice(&body)?;
        Ok(parsed.data.unwrap_or_default())
    }
}

fn build_headers(config: &ChatApiConfig) -> Result<HeaderMap, ChatApiError> {
    let mut headers = HeaderMap::new();
    if let Some(user_agent) = config.user_agent.as_deref() {
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|_| ChatApiError::InvalidHeader("user-agent".to_string()))?,
        );
    }
    Ok(headers)
}

async fn ensure_success(
    response: Response,
    cancel: Option<&CancelSignal>,
) -> Result<Response, ChatApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = await_or_cancel(response.text(), cancel)
        .await?
        .unwrap_or_default();
    Err(ChatApiError::from_status_body(status, body))
}

struct DeltaState<S> {
    body: Pin<Box<S>>,
    parser: EventStreamParser,
    pending: VecDeque<String>,
    cancel: Option<CancelSignal>,
    finished: bool,
}

/// Adapts a raw response body into a [`DeltaStream`].
///
/// The stream ends at the termination sentinel or at end of body, whichever
/// comes first. When `cancel` is raised the stream yields
/// [`ChatApiError::Cancelled`] once and then ends, without waiting for the
/// next body chunk.
pub fn decode_delta_stream<S, B, E>(body: S, cancel: Option<CancelSignal>) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatApiError> + Send + 'static,
{
    let state = DeltaState {
        body: Box::pin(body),
        parser: EventStreamParser::default(),
        pending: VecDeque::new(),
        cancel,
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if is_cancelled(state.cancel.as_ref()) {
                state.finished = true;
                return Some((Err(ChatApiError::Cancelled), state));
            }
            if let Some(delta) = state.pending.pop_front() {
                return Some((Ok(delta), state));
            }
            if state.parser.is_done() {
                state.finished = true;
                return None;
            }

            let cancel = state.cancel.clone();
            match await_or_cancel(state.body.next(), cancel.as_ref()).await {
                Err(error) => {
                    state.finished = true;
                    return Some((Err(error), state));
                }
                Ok(None) => {
                    let discarded = state.parser.finish();
                    if discarded > 0 {
                        debug!(discarded, "discarding unterminated trailing event-stream bytes");
                    }
                    state.finished = true;
                    return None;
                }
                Ok(Some(Err(error))) => {
                    state.finished = true;
                    return Some((Err(error.into()), state));
                }
                Ok(Some(Ok(chunk))) => {
                    let deltas = state.parser.feed(chunk.as_ref());
                    state.pending.extend(deltas);
                }
            }
        }
    }))
}

fn is_cancelled(cancel: Option<&CancelSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancel: Option<&CancelSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancel.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancel) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancel) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use futures_util::{stream, StreamExt};

    use super::decode_delta_stream;
    use crate::error::ChatApiError;

    fn chunks(parts: &[&'static str]) -> Vec<Result<&'static [u8], ChatApiError>> {
        parts
            .iter()
            .copied()
            .map(|part: &'static str| Ok(part.as_bytes()))
            .collect()
    }

    #[tokio::test]
    async fn deltas_are_yielded_in_order_and_stop_at_done() {
        let body = stream::iter(chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\ndata: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]));

        let deltas: Vec<String> = decode_delta_stream(body, None)
            .map(|item| item.expect("delta"))
            .collect()
            .await;
        assert_eq!(deltas, vec!["Hi", " there"]);
    }

    #[tokio::test]
    async fn raised_cancel_yields_cancelled_once_then_ends() {
        let cancel = Arc::new(AtomicBool::new(false));
        let body = stream::iter(chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
        ]));
        let mut deltas = decode_delta_stream(body, Some(Arc::clone(&cancel)));

        assert_eq!(deltas.next().await.expect("first").expect("delta"), "a");
        cancel.store(true, Ordering::Release);
        assert!(matches!(deltas.next().await, Some(Err(ChatApiError::Cancelled))));
        assert!(deltas.next().await.is_none());
    }

    #[tokio::test]
    async fn body_errors_end_the_stream() {
        let body = stream::iter(vec![
            Ok::<_, ChatApiError>(&b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n"[..]),
            Err(ChatApiError::EmptyResponse),
        ]);
        let mut deltas = decode_delta_stream(body, None);

        assert_eq!(deltas.next().await.expect("first").expect("delta"), "a");
        assert!(matches!(deltas.next().await, Some(Err(ChatApiError::EmptyResponse))));
        assert!(deltas.next().await.is_none());
    }
}
