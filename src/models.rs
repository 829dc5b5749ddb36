//! Core data models used throughout mediadex.
//!
//! These types represent the raw history items handed over by a
//! [`HistorySource`](crate::traits::HistorySource), the normalized
//! [`MediaRecord`]s that reach the store, and the counters and summaries
//! produced by an indexing job.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Identifier of a message stream: a numeric chat id or a public handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Id(i64),
    Username(String),
}

impl ChatRef {
    /// Key used for resume markers and the `source` column.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{}", id),
            ChatRef::Username(name) => write!(f, "@{}", name),
        }
    }
}

impl FromStr for ChatRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            return Ok(ChatRef::Id(id));
        }
        let name = trimmed.trim_start_matches('@');
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            anyhow::bail!("invalid chat reference: '{}'", s);
        }
        Ok(ChatRef::Username(name.to_string()))
    }
}

/// Attachment kinds as reported by the upstream history API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentKind {
    Video,
    Audio,
    Document,
    Photo,
    Voice,
    VideoNote,
    Animation,
    Sticker,
    Other(String),
}

/// File payload of an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub file_id: String,
    pub file_unique_id: String,
    pub file_size: u64,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub duration: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// An attachment on a history item. `file` is `None` when the upstream
/// announced a media kind but delivered no payload for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub file: Option<FileInfo>,
}

/// One item of a message history, as fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Position (message id) in the stream.
    pub id: i64,
    /// Placeholder for a deleted message.
    pub empty: bool,
    pub caption: Option<String>,
    pub media: Option<Attachment>,
}

impl RawMessage {
    pub fn tombstone(id: i64) -> Self {
        Self {
            id,
            empty: true,
            caption: None,
            media: None,
        }
    }
}

/// The closed set of media kinds that are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }
}

/// Normalized metadata of an accepted attachment, handed to the store once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaRecord {
    pub kind: MediaKind,
    pub file_id: String,
    pub file_unique_id: String,
    pub file_size: u64,
    pub file_name: Option<String>,
    /// File name with separators collapsed to spaces, for search.
    pub search_name: Option<String>,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub duration: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub message_id: i64,
}

/// Per-job outcome counters. Every processed item lands in exactly one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub saved: u64,
    pub duplicate: u64,
    pub errors: u64,
    pub deleted: u64,
    pub no_media: u64,
    pub unsupported: u64,
}

impl Counters {
    pub fn total(&self) -> u64 {
        self.saved + self.duplicate + self.errors + self.deleted + self.no_media + self.unsupported
    }
}

/// Lifecycle status of a job, as shown on the progress surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of one indexing job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub source: String,
    pub status: JobStatus,
    /// Items processed before the loop exited.
    pub fetched: u64,
    pub counters: Counters,
    /// Position of the next item that would have been fetched.
    pub cursor: i64,
    /// Description of the terminating failure for `error` jobs.
    pub failure: Option<String>,
}
