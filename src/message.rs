use chat_api::{ChatCompletionMessage, ChatRole, ContentPart};
use session_api::HistoryRole;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::media::MediaKind;

pub type MessageId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Parses a stored role. Roles the conversation view does not show yield
    /// `None`.
    #[must_use]
    pub fn from_stored(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    /// Role the turn is persisted under.
    #[must_use]
    pub fn history_role(self) -> HistoryRole {
        match self {
            Self::User => HistoryRole::User,
            Self::Assistant => HistoryRole::Assistant,
        }
    }

    #[must_use]
    pub fn chat_role(self) -> ChatRole {
        match self {
            Self::User => ChatRole::User,
            Self::Assistant => ChatRole::Assistant,
        }
    }
}

/// Media that has left the staging area and belongs to a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub display_name: String,
    pub kind: MediaKind,
    pub mime_type: String,
    /// `data:<mime>;base64,<payload>` URI sent to the completion endpoint.
    pub data_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub media: Vec<MediaAttachment>,
    pub created_at: OffsetDateTime,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>, media: Vec<MediaAttachment>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            media,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Empty assistant turn that deltas are appended to while generating.
    #[must_use]
    pub fn assistant_placeholder() -> Self {
        Self::new(Role::Assistant, String::new(), Vec::new())
    }

    /// Rebuilds a message from stored history, keeping its id and timestamp.
    #[must_use]
    pub fn restored(
        id: impl Into<String>,
        role: Role,
        text: impl Into<String>,
        created_at: &str,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            text: text.into(),
            media: Vec::new(),
            created_at: OffsetDateTime::parse(created_at, &Rfc3339)
                .unwrap_or_else(|_| OffsetDateTime::now_utc()),
        }
    }

    /// Renders the message for the completion endpoint. Messages carrying
    /// media become multimodal: media parts first, then the text part.
    #[must_use]
    pub fn to_completion_message(&self) -> ChatCompletionMessage {
        if self.media.is_empty() {
            return ChatCompletionMessage::text(self.role.chat_role(), self.text.clone());
        }

        let mut parts: Vec<ContentPart> = self
            .media
            .iter()
            .map(|media| ContentPart::image_url(media.data_uri.clone()))
            .collect();
        if !self.text.is_empty() {
            parts.push(ContentPart::text(self.text.clone()));
        }
        ChatCompletionMessage::parts(self.role.chat_role(), parts)
    }
}
