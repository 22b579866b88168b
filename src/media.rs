//! Attachments queued for the next outgoing message.
//!
//! Every staged item owns a [`PreviewHandle`]. The handle is released when the
//! item is dropped, whether that happens through [`MediaStagingArea::unstage`],
//! [`MediaStagingArea::clear`] or by consuming the queue into a message, so a
//! handle can never be released twice.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;
use tracing::trace;

use crate::message::MediaAttachment;

/// Largest attachment accepted by default (1 GiB).
pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    #[must_use]
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if mime_type.starts_with("image/") {
            Some(Self::Image)
        } else if mime_type.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("{name} is {size} bytes, which exceeds the {limit} byte limit")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error(
        "{name} has unsupported media type '{mime_type}'; only images and videos can be attached"
    )]
    UnsupportedType { name: String, mime_type: String },

    #[error("encoding {name} did not complete")]
    Encode { name: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Default)]
struct PreviewCounters {
    next_id: AtomicU64,
    live: AtomicUsize,
    released: AtomicUsize,
}

/// Issues preview handles and tracks how many are still live.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    counters: Arc<PreviewCounters>,
}

impl PreviewRegistry {
    fn acquire(&self) -> PreviewHandle {
        let id = self.counters.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.counters.live.fetch_add(1, Ordering::AcqRel);
        PreviewHandle {
            id,
            counters: Arc::clone(&self.counters),
        }
    }

    /// Handles acquired and not yet released.
    #[must_use]
    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::Acquire)
    }

    /// Total releases since the registry was created.
    #[must_use]
    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::Acquire)
    }
}

/// Local-only preview resource for one staged item. Released on drop.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    counters: Arc<PreviewCounters>,
}

impl PreviewHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::AcqRel);
        self.counters.released.fetch_add(1, Ordering::AcqRel);
        trace!(preview = self.id, "released media preview");
    }
}

#[derive(Debug)]
pub struct MediaItem {
    pub display_name: String,
    pub kind: MediaKind,
    pub mime_type: String,
    pub size: u64,
    /// Transport-safe `data:` URI.
    pub encoded_payload: String,
    preview: PreviewHandle,
}

/// Owned description of a staged item, without its payload or preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSummary {
    pub display_name: String,
    pub kind: MediaKind,
    pub mime_type: String,
    pub size: u64,
}

impl MediaItem {
    #[must_use]
    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    #[must_use]
    pub fn summary(&self) -> MediaSummary {
        MediaSummary {
            display_name: self.display_name.clone(),
            kind: self.kind,
            mime_type: self.mime_type.clone(),
            size: self.size,
        }
    }

    /// Consumes the item, releasing its preview.
    #[must_use]
    pub fn into_attachment(self) -> MediaAttachment {
        MediaAttachment {
            display_name: self.display_name,
            kind: self.kind,
            mime_type: self.mime_type,
            data_uri: self.encoded_payload,
        }
    }
}

/// A validated and encoded attachment that has not been queued yet.
///
/// Building one is the expensive part of staging, so it can happen off the
/// async executor and outside any lock guarding the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMedia {
    pub display_name: String,
    pub kind: MediaKind,
    pub mime_type: String,
    pub size: u64,
    pub encoded_payload: String,
}

impl PreparedMedia {
    /// Checks size then type against `max_bytes` and encodes `bytes` as a
    /// `data:` URI.
    pub fn encode(
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
        max_bytes: u64,
    ) -> Result<Self, StageError> {
        let display_name = display_name.into();
        let mime_type = mime_type.into();

        let size = bytes.len() as u64;
        if size > max_bytes {
            return Err(StageError::TooLarge {
                name: display_name,
                size,
                limit: max_bytes,
            });
        }

        let Some(kind) = MediaKind::from_mime(&mime_type) else {
            return Err(StageError::UnsupportedType {
                name: display_name,
                mime_type,
            });
        };

        let encoded_payload = data_uri(&mime_type, bytes);
        Ok(Self {
            display_name,
            kind,
            mime_type,
            size,
            encoded_payload,
        })
    }

    pub fn from_file(file: MediaFile, max_bytes: u64) -> Result<Self, StageError> {
        Self::encode(file.display_name, file.mime_type, &file.bytes, max_bytes)
    }
}

/// `data:{mime};base64,{payload}` written into a single exactly sized buffer.
fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    const PREFIX: &str = "data:";
    const SEPARATOR: &str = ";base64,";

    let encoded_len = bytes.len().div_ceil(3) * 4;
    let mut uri =
        String::with_capacity(PREFIX.len() + mime_type.len() + SEPARATOR.len() + encoded_len);
    uri.push_str(PREFIX);
    uri.push_str(mime_type);
    uri.push_str(SEPARATOR);
    general_purpose::STANDARD.encode_string(bytes, &mut uri);
    uri
}

/// File contents read from disk, not yet validated for staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub display_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl MediaFile {
    /// Reads `path`, inferring the MIME type from its extension.
    ///
    /// The size is checked against `max_bytes` from metadata before anything
    /// is read.
    pub async fn read(path: &Path, max_bytes: u64) -> Result<Self, StageError> {
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| StageError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if metadata.len() > max_bytes {
            return Err(StageError::TooLarge {
                name: display_name,
                size: metadata.len(),
                limit: max_bytes,
            });
        }

        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        if MediaKind::from_mime(&mime_type).is_none() {
            return Err(StageError::UnsupportedType {
                name: display_name,
                mime_type,
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| StageError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            display_name,
            mime_type,
            bytes,
        })
    }
}

#[derive(Debug)]
pub struct MediaStagingArea {
    items: Vec<MediaItem>,
    max_bytes: u64,
    previews: PreviewRegistry,
}

impl Default for MediaStagingArea {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MEDIA_BYTES)
    }
}

impl MediaStagingArea {
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            items: Vec::new(),
            max_bytes,
            previews: PreviewRegistry::default(),
        }
    }

    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Validates, encodes and queues one attachment.
    ///
    /// Size is checked before type. Nothing is queued on error.
    pub fn stage(
        &mut self,
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
    ) -> Result<&MediaItem, StageError> {
        let prepared = PreparedMedia::encode(display_name, mime_type, bytes, self.max_bytes)?;
        Ok(self.push(prepared))
    }

    pub fn stage_file(&mut self, file: MediaFile) -> Result<&MediaItem, StageError> {
        let prepared = PreparedMedia::from_file(file, self.max_bytes)?;
        Ok(self.push(prepared))
    }

    /// Queues an already encoded attachment and acquires its preview.
    ///
    /// `prepared` is expected to have been checked against this area's limit.
    pub fn push(&mut self, prepared: PreparedMedia) -> &MediaItem {
        let index = self.items.len();
        self.items.push(MediaItem {
            display_name: prepared.display_name,
            kind: prepared.kind,
            mime_type: prepared.mime_type,
            size: prepared.size,
            encoded_payload: prepared.encoded_payload,
            preview: self.previews.acquire(),
        });
        &self.items[index]
    }

    /// Reads a file from disk and stages it.
    pub async fn stage_path(&mut self, path: &Path) -> Result<&MediaItem, StageError> {
        let file = MediaFile::read(path, self.max_bytes).await?;
        self.stage_file(file)
    }

    /// Removes the item at `index`, releasing its preview. Returns `false`
    /// when the index is out of range.
    pub fn unstage(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        drop(self.items.remove(index));
        true
    }

    /// Releases every preview and empties the queue. Safe to call repeatedly.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Empties the queue into message attachments, releasing every preview.
    pub fn take_all(&mut self) -> Vec<MediaAttachment> {
        self.items
            .drain(..)
            .map(MediaItem::into_attachment)
            .collect()
    }

    #[must_use]
    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }
}
