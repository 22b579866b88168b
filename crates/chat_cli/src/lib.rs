//! Line-oriented terminal front end for the chat core.
//!
//! ## Configuration
//!
//! Settings come from built-in defaults, then the JSON file named by
//! `MXLN_CONFIG_PATH`, then environment variables:
//!
//! - `MXLN_BASE_URL`: chat and session service origin
//! - `MXLN_TIMEOUT_SEC`: request timeout, must be > 0
//! - `MXLN_MAX_MEDIA_BYTES`: largest attachment accepted by `/attach`
//! - `MXLN_PREFERENCES_PATH`: where the selected model and session are kept
//! - `MXLN_LOG` or `RUST_LOG`: tracing filter; logs go to stderr
//!
//! Ctrl-C stops a streaming reply; the partial text stays in the conversation.

pub mod commands;
pub mod repl;
