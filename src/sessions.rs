//! Session bookkeeping on top of the history service.
//!
//! [`SessionManager`] tracks the session list and the current session, and
//! implements [`ConversationHistory`] against whichever session is current.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use session_api::{
    title_from_message, AddMessageRequest, ConversationHistory, CreateSessionRequest,
    HistoryRole, Session, SessionApiError, SessionBackend, SessionDetail, UpdateSessionRequest,
    DEFAULT_PAGE_SIZE,
};
use tracing::{debug, warn};

use crate::preferences::PreferenceStore;

/// Preference key holding the id of the last active session.
pub const CURRENT_SESSION_KEY: &str = "mxln_current_session_id";
pub const NEW_SESSION_TITLE: &str = "New Chat";

#[derive(Debug, Default)]
struct SessionState {
    sessions: Vec<Session>,
    current: Option<Session>,
    initialized: bool,
}

pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    preferences: Arc<dyn PreferenceStore>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn SessionBackend>, preferences: Arc<dyn PreferenceStore>) -> Self {
        Self {
            backend,
            preferences,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Picks the session to resume: the remembered one if it still exists,
    /// else the most recent, else a fresh one.
    ///
    /// Runs once. Later calls return `Ok(None)`.
    pub async fn initialize(&self, model: &str) -> Result<Option<SessionDetail>, SessionApiError> {
        {
            let mut state = lock_unpoisoned(&self.state);
            if state.initialized {
                return Ok(None);
            }
            state.initialized = true;
        }

        let result = self.resume_or_create(model).await;
        if result.is_err() {
            lock_unpoisoned(&self.state).initialized = false;
        }
        result.map(Some)
    }

    async fn resume_or_create(&self, model: &str) -> Result<SessionDetail, SessionApiError> {
        let sessions = self.refresh_sessions().await?;
        let remembered = self.preferences.get(CURRENT_SESSION_KEY);
        let resume = remembered
            .as_deref()
            .and_then(|id| sessions.iter().find(|session| session.id == id))
            .or_else(|| sessions.first())
            .map(|session| session.id.clone());

        match resume {
            Some(id) => {
                debug!(session = %id, "resuming session");
                self.open(&id).await
            }
            None => self.create_session(model).await.map(|session| SessionDetail {
                session,
                messages: Vec::new(),
            }),
        }
    }

    /// Reloads the first page of sessions, newest first.
    pub async fn refresh_sessions(&self) -> Result<Vec<Session>, SessionApiError> {
        let mut page = self.backend.list_sessions(DEFAULT_PAGE_SIZE, 0).await?;
        Session::sort_newest_first(&mut page.sessions);
        lock_unpoisoned(&self.state).sessions = page.sessions.clone();
        Ok(page.sessions)
    }

    pub async fn create_session(&self, model: &str) -> Result<Session, SessionApiError> {
        let request = CreateSessionRequest {
            title: NEW_SESSION_TITLE.to_string(),
            model: model.to_string(),
        };
        let session = self.backend.create_session(&request).await?;
        {
            let mut state = lock_unpoisoned(&self.state);
            state.sessions.retain(|existing| existing.id != session.id);
            state.sessions.insert(0, session.clone());
            state.current = Some(session.clone());
        }
        self.remember_current(&session.id);
        Ok(session)
    }

    /// Makes `id` current and returns its stored messages. Switching to the
    /// session that is already current returns `Ok(None)`.
    pub async fn switch_session(&self, id: &str) -> Result<Option<SessionDetail>, SessionApiError> {
        if self.current_session_id().as_deref() == Some(id) {
            return Ok(None);
        }
        self.open(id).await.map(Some)
    }

    /// Deletes `id`. When it was current, moves to the most recent remaining
    /// session or creates a new one, and returns what is now current.
    pub async fn delete_session(
        &self,
        id: &str,
        model: &str,
    ) -> Result<Option<SessionDetail>, SessionApiError> {
        self.backend.delete_session(id).await?;

        let (was_current, next) = {
            let mut state = lock_unpoisoned(&self.state);
            state.sessions.retain(|session| session.id != id);
            let was_current = state
                .current
                .as_ref()
                .is_some_and(|session| session.id == id);
            if was_current {
                state.current = None;
            }
            (was_current, state.sessions.first().map(|session| session.id.clone()))
        };
        if !was_current {
            return Ok(None);
        }

        match next {
            Some(next) => self.open(&next).await.map(Some),
            None => {
                if let Err(error) = self.preferences.remove(CURRENT_SESSION_KEY) {
                    warn!(%error, "failed to clear current session preference");
                }
                let session = self.create_session(model).await?;
                Ok(Some(SessionDetail {
                    session,
                    messages: Vec::new(),
                }))
            }
        }
    }

    async fn open(&self, id: &str) -> Result<SessionDetail, SessionApiError> {
        let detail = self.backend.get_session(id).await?;
        {
            let mut state = lock_unpoisoned(&self.state);
            if let Some(listed) = state
                .sessions
                .iter_mut()
                .find(|session| session.id == detail.session.id)
            {
                *listed = detail.session.clone();
            }
            state.current = Some(detail.session.clone());
        }
        self.remember_current(&detail.session.id);
        Ok(detail)
    }

    fn remember_current(&self, id: &str) {
        if let Err(error) = self.preferences.set(CURRENT_SESSION_KEY, id) {
            warn!(%error, session = id, "failed to persist current session");
        }
    }

    pub fn sessions(&self) -> Vec<Session> {
        lock_unpoisoned(&self.state).sessions.clone()
    }

    pub fn current_session(&self) -> Option<Session> {
        lock_unpoisoned(&self.state).current.clone()
    }

    pub fn current_session_id(&self) -> Option<String> {
        lock_unpoisoned(&self.state)
            .current
            .as_ref()
            .map(|session| session.id.clone())
    }

    fn update_local(&self, id: &str, update: impl Fn(&mut Session)) {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(current) = state.current.as_mut().filter(|session| session.id == id) {
            update(current);
        }
        if let Some(listed) = state.sessions.iter_mut().find(|session| session.id == id) {
            update(listed);
        }
    }
}

#[async_trait]
impl ConversationHistory for SessionManager {
    async fn save_message(&self, role: HistoryRole, text: &str) -> Result<(), SessionApiError> {
        let Some(id) = self.current_session_id() else {
            debug!(role = role.as_str(), "no current session; message not saved");
            return Ok(());
        };

        let request = AddMessageRequest {
            role,
            content: text.to_string(),
        };
        self.backend.add_message(&id, &request).await?;
        self.update_local(&id, |session| session.message_count += 1);
        Ok(())
    }

    async fn update_title(&self, first_message: &str) -> Result<(), SessionApiError> {
        let Some(id) = self.current_session_id() else {
            return Ok(());
        };

        let title = title_from_message(first_message);
        let request = UpdateSessionRequest {
            title: Some(title.clone()),
            model: None,
        };
        let echoed = self.backend.update_session(&id, &request).await?;
        match echoed {
            Some(updated) => self.update_local(&id, |session| *session = updated.clone()),
            None => self.update_local(&id, |session| session.title = title.clone()),
        }
        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
