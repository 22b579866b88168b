use async_trait::async_trait;

use crate::error::SessionApiError;
use crate::schema::{
    AddMessageRequest, CreateSessionRequest, Session, StoredMessage, UpdateSessionRequest,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionDetail {
    pub session: Session,
    pub messages: Vec<StoredMessage>,
}

/// Session CRUD surface of the history service.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn list_sessions(&self, limit: usize, offset: usize)
        -> Result<SessionPage, SessionApiError>;

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<Session, SessionApiError>;

    async fn get_session(&self, id: &str) -> Result<SessionDetail, SessionApiError>;

    /// Returns the updated session when the service echoes it back.
    async fn update_session(
        &self,
        id: &str,
        request: &UpdateSessionRequest,
    ) -> Result<Option<Session>, SessionApiError>;

    async fn delete_session(&self, id: &str) -> Result<(), SessionApiError>;

    async fn add_message(
        &self,
        session_id: &str,
        request: &AddMessageRequest,
    ) -> Result<Option<StoredMessage>, SessionApiError>;
}
