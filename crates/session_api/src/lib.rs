//! Client-side contract with the conversation history service.
//!
//! [`ConversationHistory`] is the narrow save/title contract the generation
//! flow depends on. [`SessionBackend`] is the wider session CRUD surface, with
//! [`SessionApiClient`] as its REST implementation.

mod backend;
mod client;
mod error;
mod history;
mod schema;

pub use backend::{SessionBackend, SessionDetail, SessionPage};
pub use client::{SessionApiClient, DEFAULT_PAGE_SIZE};
pub use error::SessionApiError;
pub use history::{title_from_message, ConversationHistory, MAX_TITLE_CHARS, TITLE_ELLIPSIS};
pub use schema::{
    AddMessageRequest, ApiEnvelope, ApiErrorBody, CreateSessionRequest, DeleteResponse,
    HistoryRole, Session, SessionDetailResponse, SessionListResponse, StoredContent,
    StoredMessage, UpdateSessionRequest,
};
