//! Transport-only client primitives for an OpenAI-compatible chat completion API.
//!
//! This crate owns request building, response-body framing and event-stream
//! parsing for the completion and model-listing endpoints. It intentionally
//! contains no conversation state and no persistence coupling.
//!
//! Streaming bodies flow through [`FrameDecoder`] (bytes to lines) and
//! [`EventStreamParser`] (lines to text deltas) and are exposed to callers as a
//! cancellable [`DeltaStream`]. Malformed data frames are dropped with a warning
//! instead of failing the stream.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod payload;
pub mod sse;
pub mod transport;
pub mod url;

pub use client::{decode_delta_stream, CancelSignal, ChatApiClient, DeltaStream};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::EventFrame;
pub use frame::FrameDecoder;
pub use payload::{
    ChatCompletionMessage, ChatCompletionRequest, ChatRole, ContentPart, MessageContent,
};
pub use sse::EventStreamParser;
pub use transport::CompletionTransport;
pub use url::{completions_url, models_url, normalize_base_url};

pub use reqwest::StatusCode;
