//! Conversation core for a streaming chat client.
//!
//! Invariant: single flight. A [`GenerationController`] owns at most one
//! generation session, and every delta it applies lands on that session's
//! placeholder message.
//!
//! # Public API Overview
//! - Drive sends, cancellation and conversation state through
//!   [`GenerationController`].
//! - Queue attachments for the next message with [`MediaStagingArea`] (owned by
//!   the controller, exposed through its `stage_*` methods).
//! - Persist turns and titles through [`SessionManager`], the
//!   [`session_api::ConversationHistory`] implementation over the session REST
//!   service.
//! - Observe changes with [`ConversationEvent`] subscriptions.
//! - Load configuration with [`ChatConfig`] and install logging with
//!   [`init_logging`].

pub mod config;
pub mod controller;
pub mod events;
pub mod logging;
pub mod media;
pub mod message;
pub mod models;
pub mod preferences;
pub mod sessions;

pub use crate::config::{ChatConfig, ConfigError};
pub use crate::controller::{
    GenerationController, GenerationControllerBuilder, GenerationState, SendOutcome,
    SendRejection,
};
pub use crate::events::{ConversationEvent, GenerationEnd, GenerationId};
pub use crate::logging::{init_logging, LoggingError};
pub use crate::media::{
    MediaFile, MediaItem, MediaKind, MediaStagingArea, MediaSummary, PreparedMedia,
    PreviewHandle, PreviewRegistry, StageError, DEFAULT_MAX_MEDIA_BYTES,
};
pub use crate::message::{MediaAttachment, Message, MessageId, Role};
pub use crate::models::{
    ModelListing, ModelSelection, DEFAULT_MODEL, FALLBACK_MODELS, PREFERRED_MODEL_KEY,
};
pub use crate::preferences::{
    FilePreferenceStore, MemoryPreferenceStore, PreferenceError, PreferenceStore,
};
pub use crate::sessions::{SessionManager, CURRENT_SESSION_KEY, NEW_SESSION_TITLE};
