//! Indexing progress reporting.
//!
//! Reports observable progress during `mdx index` so the operator sees how
//! many messages were scanned and where each one went. Progress is emitted
//! on **stderr** so stdout remains parseable for scripts.
//!
//! The coordinator pushes a `running` snapshot every few dozen items and
//! exactly one terminal snapshot (`completed`, `cancelled` or `error`).
//! Reporter failures never abort a job: the coordinator logs and drops them.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;

use crate::models::{Counters, JobStatus};

/// A point-in-time view of a job, as sent to a [`ProgressReporter`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub fetched_count: u64,
    pub saved: u64,
    pub duplicate: u64,
    pub deleted: u64,
    /// `no_media + unsupported`.
    pub non_media: u64,
    pub unsupported: u64,
    pub errors: u64,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProgressSnapshot {
    pub fn new(fetched: u64, counters: &Counters, status: JobStatus) -> Self {
        Self {
            fetched_count: fetched,
            saved: counters.saved,
            duplicate: counters.duplicate,
            deleted: counters.deleted,
            non_media: counters.no_media + counters.unsupported,
            unsupported: counters.unsupported,
            errors: counters.errors,
            status,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Sink for progress snapshots (a terminal, a chat message being edited, ...).
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, snapshot: &ProgressSnapshot) -> Result<()>;
}

/// Human-friendly progress on stderr.
pub struct StderrProgress;

#[async_trait]
impl ProgressReporter for StderrProgress {
    async fn report(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        let mut err = std::io::stderr().lock();
        err.write_all(render_human(snapshot).as_bytes())?;
        err.flush()?;
        Ok(())
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

#[async_trait]
impl ProgressReporter for JsonProgress {
    async fn report(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        let line = serde_json::to_string(snapshot)?;
        let mut err = std::io::stderr().lock();
        writeln!(err, "{}", line)?;
        err.flush()?;
        Ok(())
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

#[async_trait]
impl ProgressReporter for NoProgress {
    async fn report(&self, _snapshot: &ProgressSnapshot) -> Result<()> {
        Ok(())
    }
}

/// Render a snapshot the way it is shown to a moderator.
pub fn render_human(s: &ProgressSnapshot) -> String {
    let headline = match s.status {
        JobStatus::Running => format!(
            "index  running  {} messages fetched",
            format_number(s.fetched_count)
        ),
        JobStatus::Completed => format!(
            "index  completed  saved {} files",
            format_number(s.saved)
        ),
        JobStatus::Cancelled => format!(
            "index  cancelled  saved {} files",
            format_number(s.saved)
        ),
        JobStatus::Error => format!(
            "index  error  {}",
            s.detail.as_deref().unwrap_or("unknown failure")
        ),
    };
    format!(
        "{}\n  duplicates skipped: {}\n  deleted skipped: {}\n  non-media skipped: {} (unsupported: {})\n  errors: {}\n",
        headline,
        format_number(s.duplicate),
        format_number(s.deleted),
        format_number(s.non_media),
        format_number(s.unsupported),
        format_number(s.errors),
    )
}

/// Thousands-separated count for human-readable lines.
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the `--progress` flag value. `auto` defers to the TTY check.
    pub fn from_flag(flag: &str) -> Result<Self> {
        match flag {
            "auto" => Ok(Self::default_for_tty()),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            "off" => Ok(ProgressMode::Off),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Must be auto, human, json, or off.",
                other
            ),
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
