//! Single-flight generation state machine over the in-memory conversation.
//!
//! `Idle -> Sending -> Idle`. At most one generation session exists; a send
//! while one is active is rejected without touching the conversation. State
//! lives behind std mutexes that are never held across an await, so `stop`
//! can flip the controller back to `Idle` synchronously while the send task
//! is suspended inside the transport.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chat_api::{CancelSignal, ChatApiError, ChatCompletionMessage, CompletionTransport};
use futures_util::StreamExt;
use session_api::{ConversationHistory, StoredMessage};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::events::{ConversationEvent, GenerationEnd, GenerationId};
use crate::media::{
    MediaFile, MediaStagingArea, MediaSummary, PreparedMedia, StageError, DEFAULT_MAX_MEDIA_BYTES,
};
use crate::message::{Message, MessageId, Role};
use crate::models::{persist_model, ModelListing, ModelSelection};
use crate::preferences::{MemoryPreferenceStore, PreferenceStore};

const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejection {
    /// A generation is already in flight.
    Busy,
    /// The content was empty after trimming.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Rejected(SendRejection),
    Completed { message_id: MessageId },
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Sending {
        generation: GenerationId,
        target: MessageId,
    },
}

#[derive(Debug)]
struct GenerationSession {
    id: GenerationId,
    cancel: CancelSignal,
    target: MessageId,
}

#[derive(Debug, Default)]
struct ConversationState {
    messages: Vec<Message>,
    session: Option<GenerationSession>,
    error: Option<String>,
    last_generation: GenerationId,
}

struct GenerationStart {
    generation: GenerationId,
    cancel: CancelSignal,
    target: MessageId,
    model: String,
    user_text: String,
    first_message: bool,
}

struct Inner {
    state: Mutex<ConversationState>,
    media: Mutex<MediaStagingArea>,
    models: Mutex<ModelSelection>,
    transport: Arc<dyn CompletionTransport>,
    history: Option<Arc<dyn ConversationHistory>>,
    preferences: Arc<dyn PreferenceStore>,
    events: broadcast::Sender<ConversationEvent>,
}

pub struct GenerationControllerBuilder {
    transport: Arc<dyn CompletionTransport>,
    history: Option<Arc<dyn ConversationHistory>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    max_media_bytes: u64,
    event_capacity: usize,
}

impl GenerationControllerBuilder {
    pub fn history(mut self, history: Arc<dyn ConversationHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn max_media_bytes(mut self, max_media_bytes: u64) -> Self {
        self.max_media_bytes = max_media_bytes;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> GenerationController {
        let (events, _) = broadcast::channel(self.event_capacity);
        GenerationController {
            inner: Arc::new(Inner {
                state: Mutex::new(ConversationState::default()),
                media: Mutex::new(MediaStagingArea::new(self.max_media_bytes)),
                models: Mutex::new(ModelSelection::default()),
                transport: self.transport,
                history: self.history,
                preferences: self
                    .preferences
                    .unwrap_or_else(|| Arc::new(MemoryPreferenceStore::default())),
                events,
            }),
        }
    }
}

/// Cheap to clone; clones share one conversation.
#[derive(Clone)]
pub struct GenerationController {
    inner: Arc<Inner>,
}

impl GenerationController {
    pub fn builder(transport: Arc<dyn CompletionTransport>) -> GenerationControllerBuilder {
        GenerationControllerBuilder {
            transport,
            history: None,
            preferences: None,
            max_media_bytes: DEFAULT_MAX_MEDIA_BYTES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn new(transport: Arc<dyn CompletionTransport>) -> Self {
        Self::builder(transport).build()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: ConversationEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    // ---- conversation -------------------------------------------------------

    /// Sends `content` with the staged media and streams the reply into a new
    /// assistant message.
    ///
    /// `model` overrides the selected model for this send only.
    pub async fn send(&self, content: &str, model: Option<&str>) -> SendOutcome {
        let (start, outbound) = match self.begin_generation(content, model) {
            Ok(started) => started,
            Err(rejection) => return SendOutcome::Rejected(rejection),
        };
        debug!(
            generation = start.generation,
            model = %start.model,
            "generation started"
        );

        self.record_user_turn(&start).await;

        let end = if is_cancelled(&start.cancel) {
            GenerationEnd::Cancelled
        } else {
            self.stream_reply(&start, outbound).await
        };

        self.finish_generation(start, end).await
    }

    fn begin_generation(
        &self,
        content: &str,
        model: Option<&str>,
    ) -> Result<(GenerationStart, Vec<ChatCompletionMessage>), SendRejection> {
        let text = content.trim();
        let model = model
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.current_model());

        let mut state = lock_unpoisoned(&self.inner.state);
        if state.session.is_some() {
            return Err(SendRejection::Busy);
        }
        if text.is_empty() {
            return Err(SendRejection::Empty);
        }

        state.error = None;
        let first_message = state.messages.is_empty();
        let media = lock_unpoisoned(&self.inner.media).take_all();
        let user = Message::new(Role::User, text, media);
        let placeholder = Message::assistant_placeholder();
        let target = placeholder.id.clone();

        self.emit(ConversationEvent::MessageAppended {
            id: user.id.clone(),
            role: Role::User,
        });
        state.messages.push(user);

        let outbound = state
            .messages
            .iter()
            .map(Message::to_completion_message)
            .collect();

        self.emit(ConversationEvent::MessageAppended {
            id: target.clone(),
            role: Role::Assistant,
        });
        state.messages.push(placeholder);

        state.last_generation += 1;
        let generation = state.last_generation;
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        state.session = Some(GenerationSession {
            id: generation,
            cancel: Arc::clone(&cancel),
            target: target.clone(),
        });
        self.emit(ConversationEvent::GenerationStarted {
            generation,
            model: model.clone(),
            target: target.clone(),
        });

        Ok((
            GenerationStart {
                generation,
                cancel,
                target,
                model,
                user_text: text.to_string(),
                first_message,
            },
            outbound,
        ))
    }

    async fn record_user_turn(&self, start: &GenerationStart) {
        let Some(history) = self.inner.history.as_ref() else {
            return;
        };

        let role = Role::User.history_role();
        if let Err(error) = history.save_message(role, &start.user_text).await {
            warn!(%error, generation = start.generation, "failed to save user message");
        }
        if start.first_message {
            if let Err(error) = history.update_title(&start.user_text).await {
                warn!(%error, generation = start.generation, "failed to update conversation title");
            }
        }
    }

    async fn stream_reply(
        &self,
        start: &GenerationStart,
        outbound: Vec<ChatCompletionMessage>,
    ) -> GenerationEnd {
        let mut deltas = match self
            .inner
            .transport
            .stream_completion(outbound, &start.model, Arc::clone(&start.cancel))
            .await
        {
            Ok(deltas) => deltas,
            Err(error) => return failure_end(error, &start.cancel),
        };

        loop {
            if is_cancelled(&start.cancel) {
                return GenerationEnd::Cancelled;
            }
            match deltas.next().await {
                None => return GenerationEnd::Completed,
                Some(Ok(delta)) => {
                    if !self.apply_delta(start.generation, &start.target, &delta) {
                        return GenerationEnd::Cancelled;
                    }
                }
                Some(Err(error)) => return failure_end(error, &start.cancel),
            }
        }
    }

    /// Appends one delta to the generation's target message. Returns `false`
    /// once the generation is no longer the active one.
    fn apply_delta(&self, generation: GenerationId, target: &str, delta: &str) -> bool {
        let mut state = lock_unpoisoned(&self.inner.state);
        if state.session.as_ref().map(|session| session.id) != Some(generation) {
            return false;
        }
        let Some(message) = state.messages.iter_mut().find(|message| message.id == target) else {
            return false;
        };

        message.text.push_str(delta);
        self.emit(ConversationEvent::DeltaApplied {
            id: target.to_string(),
            delta: delta.to_string(),
        });
        true
    }

    async fn finish_generation(&self, start: GenerationStart, end: GenerationEnd) -> SendOutcome {
        let end = match end {
            GenerationEnd::Completed if is_cancelled(&start.cancel) => GenerationEnd::Cancelled,
            other => other,
        };

        let final_text = {
            let mut state = lock_unpoisoned(&self.inner.state);
            if state
                .session
                .as_ref()
                .is_some_and(|session| session.id == start.generation)
            {
                state.session = None;
            }

            let position = state
                .messages
                .iter()
                .position(|message| message.id == start.target);
            let final_text = position
                .map(|index| state.messages[index].text.clone())
                .unwrap_or_default();

            if let GenerationEnd::Failed(message) = &end {
                state.error = Some(message.clone());
                if let Some(index) = position.filter(|_| final_text.is_empty()) {
                    state.messages.remove(index);
                    self.emit(ConversationEvent::MessageRemoved {
                        id: start.target.clone(),
                    });
                }
            }
            final_text
        };

        debug!(
            generation = start.generation,
            outcome = ?end,
            chars = final_text.chars().count(),
            "generation finished"
        );
        self.emit(ConversationEvent::GenerationEnded {
            generation: start.generation,
            end: end.clone(),
        });

        match end {
            GenerationEnd::Completed => {
                if !final_text.is_empty() {
                    self.save_assistant_reply(start.generation, &final_text).await;
                }
                SendOutcome::Completed {
                    message_id: start.target,
                }
            }
            GenerationEnd::Cancelled => SendOutcome::Cancelled,
            GenerationEnd::Failed(message) => SendOutcome::Failed(message),
        }
    }

    async fn save_assistant_reply(&self, generation: GenerationId, text: &str) {
        let Some(history) = self.inner.history.as_ref() else {
            return;
        };
        let role = Role::Assistant.history_role();
        if let Err(error) = history.save_message(role, text).await {
            warn!(%error, generation, "failed to save assistant message");
        }
    }

    /// Cancels the active generation, if any, and returns to `Idle` at once.
    pub fn stop(&self) -> bool {
        let session = lock_unpoisoned(&self.inner.state).session.take();
        match session {
            Some(session) => {
                session.cancel.store(true, Ordering::Release);
                debug!(generation = session.id, "generation stop requested");
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> GenerationState {
        match lock_unpoisoned(&self.inner.state).session.as_ref() {
            Some(session) => GenerationState::Sending {
                generation: session.id,
                target: session.target.clone(),
            },
            None => GenerationState::Idle,
        }
    }

    pub fn is_sending(&self) -> bool {
        lock_unpoisoned(&self.inner.state).session.is_some()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock_unpoisoned(&self.inner.state).messages.clone()
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        lock_unpoisoned(&self.inner.state)
            .messages
            .iter()
            .find(|message| message.id == id)
            .cloned()
    }

    pub fn error(&self) -> Option<String> {
        lock_unpoisoned(&self.inner.state).error.clone()
    }

    pub fn clear_error(&self) {
        lock_unpoisoned(&self.inner.state).error = None;
    }

    /// Stops any active generation and empties the conversation.
    pub fn clear_messages(&self) {
        self.stop();
        {
            let mut state = lock_unpoisoned(&self.inner.state);
            state.messages.clear();
            state.error = None;
        }
        self.emit(ConversationEvent::Cleared);
    }

    /// Replaces the conversation with stored history.
    ///
    /// Only user and assistant turns are kept; structured content that is not
    /// plain text loads as an empty message.
    pub fn load_from_session(&self, stored: &[StoredMessage]) {
        self.stop();
        let messages: Vec<Message> = stored
            .iter()
            .filter_map(|record| {
                let role = Role::from_stored(&record.role)?;
                let text = record.content.as_text().unwrap_or_default();
                Some(Message::restored(
                    record.id.clone(),
                    role,
                    text,
                    &record.created_at,
                ))
            })
            .collect();
        let count = messages.len();
        {
            let mut state = lock_unpoisoned(&self.inner.state);
            state.messages = messages;
            state.error = None;
        }
        self.emit(ConversationEvent::Loaded { count });
    }

    // ---- media --------------------------------------------------------------

    pub fn stage_media(
        &self,
        display_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<MediaSummary, StageError> {
        let max_bytes = lock_unpoisoned(&self.inner.media).max_bytes();
        let prepared = PreparedMedia::encode(display_name, mime_type, bytes, max_bytes)?;
        Ok(lock_unpoisoned(&self.inner.media).push(prepared).summary())
    }

    /// Reads a file and stages it. Reading and encoding run on the blocking
    /// pool; the staging lock is only taken to queue the finished item.
    pub async fn stage_path(&self, path: &Path) -> Result<MediaSummary, StageError> {
        let max_bytes = lock_unpoisoned(&self.inner.media).max_bytes();
        let file = MediaFile::read(path, max_bytes).await?;
        let name = file.display_name.clone();
        let encode = move || PreparedMedia::from_file(file, max_bytes);
        let prepared = tokio::task::spawn_blocking(encode)
            .await
            .map_err(|error| {
                warn!(%error, media = %name, "media encoding task failed");
                StageError::Encode { name }
            })??;
        Ok(lock_unpoisoned(&self.inner.media).push(prepared).summary())
    }

    pub fn unstage_media(&self, index: usize) -> bool {
        lock_unpoisoned(&self.inner.media).unstage(index)
    }

    pub fn clear_media(&self) {
        lock_unpoisoned(&self.inner.media).clear();
    }

    pub fn staged_media(&self) -> Vec<MediaSummary> {
        lock_unpoisoned(&self.inner.media)
            .items()
            .iter()
            .map(|item| item.summary())
            .collect()
    }

    /// Preview handles currently held by staged media.
    pub fn live_previews(&self) -> usize {
        lock_unpoisoned(&self.inner.media).previews().live()
    }

    // ---- models -------------------------------------------------------------

    pub fn current_model(&self) -> String {
        lock_unpoisoned(&self.inner.models).current().to_string()
    }

    pub fn available_models(&self) -> Vec<String> {
        lock_unpoisoned(&self.inner.models).available().to_vec()
    }

    pub fn is_loading_models(&self) -> bool {
        lock_unpoisoned(&self.inner.models).is_loading()
    }

    /// Restores the persisted model selection. Returns `true` when one was found.
    pub fn restore_model_preference(&self) -> bool {
        let restored = lock_unpoisoned(&self.inner.models).restore(self.inner.preferences.as_ref());
        if restored {
            self.emit(ConversationEvent::ModelChanged {
                model: self.current_model(),
            });
        }
        restored
    }

    /// Refreshes the model list from the backend, falling back to the
    /// built-in list when listing fails. Overlapping calls are skipped.
    pub async fn load_models(&self) -> ModelListing {
        if !lock_unpoisoned(&self.inner.models).begin_load() {
            return ModelListing::Skipped;
        }
        let _loading = LoadingGuard {
            models: &self.inner.models,
        };

        let result = self.inner.transport.list_models().await;

        let (listing, persisted, changed) = {
            let mut models = lock_unpoisoned(&self.inner.models);
            let before = models.current().to_string();
            match result {
                Ok(listed) => {
                    let replaced = models.apply_listing(listed);
                    (ModelListing::Remote, replaced, models.current() != before)
                }
                Err(error) => {
                    warn!(%error, "model listing failed, using built-in model list");
                    models.apply_fallback();
                    (ModelListing::Fallback, false, models.current() != before)
                }
            }
        };

        let current = self.current_model();
        if persisted {
            persist_model(self.inner.preferences.as_ref(), &current);
        }
        if changed {
            self.emit(ConversationEvent::ModelChanged { model: current });
        }
        listing
    }

    /// Selects `model` and persists the choice.
    pub fn set_model(&self, model: &str) {
        let model = model.trim().to_string();
        lock_unpoisoned(&self.inner.models).select(model.clone());
        persist_model(self.inner.preferences.as_ref(), &model);
        self.emit(ConversationEvent::ModelChanged { model });
    }
}

struct LoadingGuard<'a> {
    models: &'a Mutex<ModelSelection>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        lock_unpoisoned(self.models).end_load();
    }
}

fn failure_end(error: ChatApiError, cancel: &CancelSignal) -> GenerationEnd {
    if error.is_cancelled() || is_cancelled(cancel) {
        GenerationEnd::Cancelled
    } else {
        GenerationEnd::Failed(error.to_string())
    }
}

fn is_cancelled(cancel: &CancelSignal) -> bool {
    cancel.load(Ordering::Acquire)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
