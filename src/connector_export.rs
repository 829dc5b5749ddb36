//! Chat export history source.
//!
//! Serves a Telegram Desktop JSON export (`result.json`) through the
//! [`HistorySource`] interface so the pipeline can run against a real
//! history without a live session. The export holds one chat; message ids
//! missing from the export are served as tombstones, since the positions of
//! deleted messages still exist in the history.
//!
//! Exports carry no provider file ids. The content-addressable id is a
//! SHA-256 over the file's name, size and MIME type, which is stable across
//! re-exports and across chats re-posting the same file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

use crate::error::FetchError;
use crate::models::{Attachment, AttachmentKind, ChatRef, FileInfo, RawMessage};
use crate::traits::HistorySource;

#[derive(Debug, Deserialize)]
struct ExportFile {
    #[serde(default)]
    name: Option<String>,
    id: i64,
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    id: i64,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Value,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    duration_seconds: Option<u32>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    photo: Option<String>,
    #[serde(default)]
    photo_file_size: Option<u64>,
}

/// One exported chat, newest message first.
#[derive(Debug)]
pub struct ExportHistory {
    chat_id: i64,
    name: Option<String>,
    messages: Vec<RawMessage>,
}

impl ExportHistory {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chat export: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse chat export: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let export: ExportFile = serde_json::from_str(content)?;

        let mut messages: Vec<RawMessage> = export.messages.iter().map(to_raw).collect();
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages.dedup_by_key(|m| m.id);

        debug!(chat_id = export.id, messages = messages.len(), "chat export loaded");

        Ok(Self {
            chat_id: export.id,
            name: export.name,
            messages,
        })
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether `source` addresses this export. Exports store channel ids
    /// without the `-100` prefix and carry no public handle, so handles are
    /// always accepted.
    pub fn serves(&self, source: &ChatRef) -> bool {
        match source {
            ChatRef::Id(id) => {
                *id == self.chat_id
                    || format!("-100{}", self.chat_id).parse::<i64>().ok() == Some(*id)
            }
            ChatRef::Username(_) => true,
        }
    }

    /// Map any reference this export serves onto its own chat id, so resume
    /// markers are shared by every way of naming the chat.
    pub fn canonical(&self, source: &ChatRef) -> Option<ChatRef> {
        self.serves(source).then_some(ChatRef::Id(self.chat_id))
    }

    /// Up to `max_count` positions at or below `cursor`, newest first.
    /// Positions between the oldest and newest exported message that have
    /// no message are served as tombstones.
    fn page(&self, cursor: i64, max_count: usize) -> Vec<RawMessage> {
        let (Some(newest), Some(oldest)) = (self.messages.first(), self.messages.last()) else {
            return Vec::new();
        };
        let mut idx = self.messages.partition_point(|m| m.id > cursor);
        let mut position = cursor.min(newest.id);
        let mut page = Vec::with_capacity(max_count.min(self.messages.len()));

        while page.len() < max_count && position >= oldest.id {
            match self.messages.get(idx) {
                Some(msg) if msg.id == position => {
                    page.push(msg.clone());
                    idx += 1;
                }
                _ => page.push(RawMessage::tombstone(position)),
            }
            position -= 1;
        }
        page
    }

    fn check(&self, source: &ChatRef) -> Result<(), FetchError> {
        if self.serves(source) {
            Ok(())
        } else {
            Err(FetchError::Fatal(format!(
                "chat {} is not in the export (export holds chat {})",
                source, self.chat_id
            )))
        }
    }
}

#[async_trait]
impl HistorySource for ExportHistory {
    async fn fetch(
        &self,
        source: &ChatRef,
        cursor: i64,
        max_count: usize,
    ) -> Result<Vec<RawMessage>, FetchError> {
        self.check(source)?;
        Ok(self.page(cursor, max_count))
    }

    async fn latest_position(&self, source: &ChatRef) -> Result<Option<i64>, FetchError> {
        self.check(source)?;
        Ok(self.messages.first().map(|m| m.id))
    }
}

fn to_raw(msg: &ExportMessage) -> RawMessage {
    let caption = flatten_text(&msg.text).filter(|t| !t.trim().is_empty());
    RawMessage {
        id: msg.id,
        empty: false,
        caption,
        media: if msg.kind == "service" {
            None
        } else {
            attachment(msg)
        },
    }
}

fn attachment(msg: &ExportMessage) -> Option<Attachment> {
    if let Some(photo) = &msg.photo {
        let file_size = msg.photo_file_size.unwrap_or(0);
        return Some(Attachment {
            kind: AttachmentKind::Photo,
            file: Some(FileInfo {
                file_id: photo.clone(),
                file_unique_id: content_id(Some(photo), file_size, Some("image/jpeg")),
                file_size,
                file_name: None,
                mime_type: Some("image/jpeg".to_string()),
                duration: None,
                width: msg.width,
                height: msg.height,
            }),
        });
    }

    let kind = match msg.media_type.as_deref() {
        Some("video_file") => AttachmentKind::Video,
        Some("audio_file") => AttachmentKind::Audio,
        Some("voice_message") => AttachmentKind::Voice,
        Some("video_message") => AttachmentKind::VideoNote,
        Some("animation") => AttachmentKind::Animation,
        Some("sticker") => AttachmentKind::Sticker,
        Some(other) => AttachmentKind::Other(other.to_string()),
        None if msg.file.is_some() => AttachmentKind::Document,
        None => return None,
    };

    // A media entry without any file reference has no payload to index
    let file = msg.file.as_ref().map(|path| {
        let file_name = msg.file_name.clone().or_else(|| file_name_of(path));
        let file_size = msg.file_size.unwrap_or(0);
        FileInfo {
            file_id: path.clone(),
            file_unique_id: content_id(file_name.as_deref(), file_size, msg.mime_type.as_deref()),
            file_size,
            file_name,
            mime_type: msg.mime_type.clone(),
            duration: msg.duration_seconds,
            width: msg.width,
            height: msg.height,
        }
    });

    Some(Attachment { kind, file })
}

fn file_name_of(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
}

fn content_id(name: Option<&str>, size: u64, mime: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.unwrap_or_default().as_bytes());
    hasher.update(size.to_le_bytes());
    hasher.update(mime.unwrap_or_default().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

/// Exported text is either a plain string or a list of plain strings and
/// entity objects carrying a `text` field.
fn flatten_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let joined: String = parts
                .iter()
                .filter_map(|p| match p {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(o) => o.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect();
            Some(joined)
        }
        _ => None,
    }
}
