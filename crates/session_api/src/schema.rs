use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Author of a persisted conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

impl HistoryRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Session {
    /// Parsed `updated_at`, when it is a valid RFC3339 timestamp.
    #[must_use]
    pub fn last_activity(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.updated_at, &Rfc3339).ok()
    }

    /// Sorts newest activity first. Unparsable timestamps sort last.
    pub fn sort_newest_first(sessions: &mut [Session]) {
        sessions.sort_by(|left, right| right.last_activity().cmp(&left.last_activity()));
    }
}

/// Stored message content: plain text, or the raw multimodal part list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredContent {
    Text(String),
    Parts(Vec<Value>),
}

impl StoredContent {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Parts(_) => None,
        }
    }
}

impl Default for StoredContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    /// Kept as text; stored history may hold roles the conversation view skips.
    pub role: String,
    #[serde(default)]
    pub content: StoredContent,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub title: String,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMessageRequest {
    pub role: HistoryRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Generic `{success, data, error, message}` response wrapper.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Failure description for `success: false` responses.
    #[must_use]
    pub fn rejection(&self) -> Option<String> {
        (!self.success).then(|| rejection_message(self.error.as_ref(), self.message.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SessionListResponse {
    #[must_use]
    pub fn rejection(&self) -> Option<String> {
        (!self.success).then(|| rejection_message(self.error.as_ref(), self.message.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionDetailResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SessionDetailResponse {
    #[must_use]
    pub fn rejection(&self) -> Option<String> {
        (!self.success).then(|| rejection_message(self.error.as_ref(), self.message.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

impl DeleteResponse {
    #[must_use]
    pub fn rejection(&self) -> Option<String> {
        (!self.success).then(|| rejection_message(self.error.as_ref(), self.message.as_deref()))
    }
}

fn rejection_message(error: Option<&ApiErrorBody>, message: Option<&str>) -> String {
    error
        .map(|error| error.message.trim())
        .filter(|text| !text.is_empty())
        .or_else(|| message.map(str::trim).filter(|text| !text.is_empty()))
        .unwrap_or("request failed")
        .to_string()
}
