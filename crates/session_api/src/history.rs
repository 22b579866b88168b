use async_trait::async_trait;

use crate::error::SessionApiError;
use crate::schema::HistoryRole;

/// Maximum number of characters kept from the first message in a title.
pub const MAX_TITLE_CHARS: usize = 20;
pub const TITLE_ELLIPSIS: &str = "...";

/// Persistence contract for the active conversation.
///
/// Callers treat both operations as best effort: failures are logged by the
/// caller and never interrupt a generation.
#[async_trait]
pub trait ConversationHistory: Send + Sync {
    async fn save_message(&self, role: HistoryRole, text: &str) -> Result<(), SessionApiError>;

    /// Derives the conversation title from its first user message.
    async fn update_title(&self, first_message: &str) -> Result<(), SessionApiError>;
}

/// Builds a display title from a first message.
///
/// Counts Unicode scalar values, so multi-byte text is never cut mid-character.
#[must_use]
pub fn title_from_message(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let head: String = chars.by_ref().take(MAX_TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}{TITLE_ELLIPSIS}")
    } else {
        head
    }
}
