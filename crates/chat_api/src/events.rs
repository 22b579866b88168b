use serde::{Deserialize, Serialize};

/// One classified line of an event stream. Lives for a single parse step.
#[derive(Debug, Clone, PartialEq)]
pub enum EventFrame {
    /// A `data:` line whose payload parsed as a completion chunk.
    Data(ChatCompletionChunk),
    /// The `data: [DONE]` termination sentinel.
    Done,
}

/// Streaming completion chunk (`chat.completion.chunk`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// Text fragment carried by the first choice, when present and non-empty.
    pub fn first_delta_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Non-streaming completion response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub message: CompletionMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Model listing response (`{"data": ["model-a", ...]}`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelListResponse {
    #[serde(default)]
    pub data: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delta_text_ignores_missing_and_empty_content() {
        let empty: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":""}}]}"#).expect("chunk");
        let missing: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)
                .expect("chunk");
        let no_choices: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[]}"#).expect("chunk");

        assert_eq!(empty.first_delta_text(), None);
        assert_eq!(missing.first_delta_text(), None);
        assert_eq!(no_choices.first_delta_text(), None);
    }

    #[test]
    fn first_delta_text_reads_only_the_first_choice() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hi"}},{"index":1,"delta":{"content":"other"}}]}"#,
        )
        .expect("chunk");

        assert_eq!(chunk.first_delta_text(), Some("Hi"));
    }
}
