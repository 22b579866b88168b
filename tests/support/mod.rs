#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chat_api::{
    decode_delta_stream, CancelSignal, ChatApiError, ChatCompletionMessage, CompletionTransport,
    DeltaStream, StatusCode,
};
use mxln_chat::{ConversationEvent, GenerationController};
use session_api::{
    AddMessageRequest, ConversationHistory, CreateSessionRequest, HistoryRole, Session,
    SessionApiError, SessionBackend, SessionDetail, SessionPage, StoredContent, StoredMessage,
    UpdateSessionRequest,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

/// Event-stream frame carrying one content delta.
pub fn delta_frame(text: &str) -> Vec<u8> {
    let payload = serde_json::json!({
        "choices": [{ "delta": { "content": text } }]
    });
    format!("data: {payload}\n\n").into_bytes()
}

pub fn done_frame() -> Vec<u8> {
    b"data: [DONE]\n\n".to_vec()
}

pub enum Reply {
    /// Body chunks decoded by the production event-stream decoder.
    Body(Vec<Vec<u8>>),
    /// Body chunks followed by a transport failure.
    BodyThenError(Vec<Vec<u8>>, &'static str),
    /// Body chunks pushed by the test while the generation runs.
    Live(mpsc::UnboundedReceiver<Vec<u8>>),
    /// Request rejected with an HTTP status before any body arrives.
    Status(u16, &'static str),
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionMessage>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    models: Mutex<Option<Vec<String>>>,
    models_delay: Option<Duration>,
    model_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// Model listing returned by `list_models`. Without one, listing fails.
    pub fn with_models(self, models: &[&str]) -> Self {
        *self.models.lock().expect("models lock") =
            Some(models.iter().map(|model| model.to_string()).collect());
        self
    }

    pub fn with_models_delay(mut self, delay: Duration) -> Self {
        self.models_delay = Some(delay);
        self
    }

    pub fn push_reply(&self, reply: Reply) {
        self.replies.lock().expect("replies lock").push_back(reply);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn model_calls(&self) -> usize {
        self.model_calls.load(Ordering::SeqCst)
    }
}

fn live_body(
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
) -> impl futures_util::Stream<Item = Result<Vec<u8>, ChatApiError>> + Send + 'static {
    futures_util::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|chunk| (Ok(chunk), receiver))
    })
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn stream_completion(
        &self,
        messages: Vec<ChatCompletionMessage>,
        model: &str,
        cancel: CancelSignal,
    ) -> Result<DeltaStream, ChatApiError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(RecordedRequest {
                model: model.to_string(),
                messages,
            });

        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .expect("a scripted reply for every request");

        match reply {
            Reply::Body(chunks) => {
                let body =
                    futures_util::stream::iter(chunks.into_iter().map(Ok::<_, ChatApiError>));
                Ok(decode_delta_stream(body, Some(cancel)))
            }
            Reply::BodyThenError(chunks, message) => {
                let items = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(ChatApiError::from_status_body(
                        StatusCode::BAD_GATEWAY,
                        message,
                    ))))
                    .collect::<Vec<Result<Vec<u8>, ChatApiError>>>();
                Ok(decode_delta_stream(
                    futures_util::stream::iter(items),
                    Some(cancel),
                ))
            }
            Reply::Live(receiver) => Ok(decode_delta_stream(live_body(receiver), Some(cancel))),
            Reply::Status(code, message) => Err(ChatApiError::from_status_body(
                StatusCode::from_u16(code).expect("valid status code"),
                message,
            )),
        }
    }

    async fn complete(
        &self,
        _messages: Vec<ChatCompletionMessage>,
        _model: &str,
    ) -> Result<String, ChatApiError> {
        Err(ChatApiError::EmptyResponse)
    }

    async fn list_models(&self) -> Result<Vec<String>, ChatApiError> {
        self.model_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.models_delay {
            tokio::time::sleep(delay).await;
        }
        self.models
            .lock()
            .expect("models lock")
            .clone()
            .ok_or_else(|| {
                ChatApiError::from_status_body(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "models unavailable",
                )
            })
    }
}

#[derive(Default)]
pub struct RecordingHistory {
    saved: Mutex<Vec<(HistoryRole, String)>>,
    titles: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingHistory {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<(HistoryRole, String)> {
        self.saved.lock().expect("saved lock").clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.titles.lock().expect("titles lock").clone()
    }
}

#[async_trait]
impl ConversationHistory for RecordingHistory {
    async fn save_message(&self, role: HistoryRole, text: &str) -> Result<(), SessionApiError> {
        self.saved
            .lock()
            .expect("saved lock")
            .push((role, text.to_string()));
        if self.fail {
            return Err(SessionApiError::rejected("adding message", "storage offline"));
        }
        Ok(())
    }

    async fn update_title(&self, first_message: &str) -> Result<(), SessionApiError> {
        self.titles
            .lock()
            .expect("titles lock")
            .push(first_message.to_string());
        if self.fail {
            return Err(SessionApiError::rejected("updating session", "storage offline"));
        }
        Ok(())
    }
}

/// In-memory session service.
#[derive(Default)]
pub struct MemoryBackend {
    sessions: Mutex<Vec<Session>>,
    messages: Mutex<BTreeMap<String, Vec<StoredMessage>>>,
    next_id: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl MemoryBackend {
    pub fn with_sessions(sessions: Vec<Session>) -> Self {
        Self {
            sessions: Mutex::new(sessions),
            ..Self::default()
        }
    }

    pub fn seed_messages(&self, session_id: &str, messages: Vec<StoredMessage>) {
        self.messages
            .lock()
            .expect("messages lock")
            .insert(session_id.to_string(), messages);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn stored(&self, session_id: &str) -> Vec<StoredMessage> {
        self.messages
            .lock()
            .expect("messages lock")
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.sessions
            .lock()
            .expect("sessions lock")
            .iter()
            .find(|session| session.id == id)
            .cloned()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn not_found(operation: &'static str, id: &str) -> SessionApiError {
        SessionApiError::rejected(operation, format!("session {id} not found"))
    }
}

pub fn session(id: &str, title: &str, updated_at: &str) -> Session {
    Session {
        id: id.to_string(),
        title: title.to_string(),
        model: "m1".to_string(),
        message_count: 0,
        total_tokens: 0,
        created_at: updated_at.to_string(),
        updated_at: updated_at.to_string(),
    }
}

pub fn stored(id: &str, role: &str, content: StoredContent) -> StoredMessage {
    StoredMessage {
        id: id.to_string(),
        session_id: String::new(),
        role: role.to_string(),
        content,
        prompt_tokens: 0,
        completion_tokens: 0,
        created_at: "2026-03-01T10:00:00Z".to_string(),
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn list_sessions(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<SessionPage, SessionApiError> {
        self.record(format!("list {limit} {offset}"));
        let sessions = self.sessions.lock().expect("sessions lock").clone();
        Ok(SessionPage {
            total: sessions.len() as u64,
            sessions: sessions.into_iter().skip(offset).take(limit).collect(),
        })
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<Session, SessionApiError> {
        self.record(format!("create {} {}", request.title, request.model));
        let id = format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut created = session(&id, &request.title, "2026-04-01T00:00:00Z");
        created.model = request.model.clone();
        self.sessions
            .lock()
            .expect("sessions lock")
            .push(created.clone());
        Ok(created)
    }

    async fn get_session(&self, id: &str) -> Result<SessionDetail, SessionApiError> {
        self.record(format!("get {id}"));
        let session = self
            .session(id)
            .ok_or_else(|| Self::not_found("loading session", id))?;
        Ok(SessionDetail {
            session,
            messages: self.stored(id),
        })
    }

    async fn update_session(
        &self,
        id: &str,
        request: &UpdateSessionRequest,
    ) -> Result<Option<Session>, SessionApiError> {
        self.record(format!("update {id}"));
        let mut sessions = self.sessions.lock().expect("sessions lock");
        let session = sessions
            .iter_mut()
            .find(|session| session.id == id)
            .ok_or_else(|| Self::not_found("updating session", id))?;
        if let Some(title) = &request.title {
            session.title = title.clone();
        }
        if let Some(model) = &request.model {
            session.model = model.clone();
        }
        Ok(Some(session.clone()))
    }

    async fn delete_session(&self, id: &str) -> Result<(), SessionApiError> {
        self.record(format!("delete {id}"));
        self.sessions
            .lock()
            .expect("sessions lock")
            .retain(|session| session.id != id);
        self.messages.lock().expect("messages lock").remove(id);
        Ok(())
    }

    async fn add_message(
        &self,
        session_id: &str,
        request: &AddMessageRequest,
    ) -> Result<Option<StoredMessage>, SessionApiError> {
        self.record(format!("add {session_id} {}", request.role.as_str()));
        if self.session(session_id).is_none() {
            return Err(Self::not_found("adding message", session_id));
        }
        let id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut message = stored(
            &id,
            request.role.as_str(),
            StoredContent::Text(request.content.clone()),
        );
        message.session_id = session_id.to_string();
        self.messages
            .lock()
            .expect("messages lock")
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(Some(message))
    }
}

/// Waits for the first event matching `predicate`.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<ConversationEvent>,
    predicate: impl Fn(&ConversationEvent) -> bool,
) -> ConversationEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event within timeout")
}

pub fn texts(controller: &GenerationController) -> Vec<String> {
    controller
        .messages()
        .into_iter()
        .map(|message| message.text)
        .collect()
}
