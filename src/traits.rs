//! Collaborator traits of the indexing core.
//!
//! The coordinator never talks to a transport or a database directly. It is
//! handed implementations of these traits:
//!
//! ```text
//! ┌───────────────┐   ┌─────────────────────┐   ┌─────────────┐
//! │ HistorySource │──▶│ IndexingCoordinator │──▶│  Persister  │
//! │ export / API  │   │ classify + backoff  │   │  SQLite     │
//! └───────────────┘   └──────────┬──────────┘   └─────────────┘
//!                                ▼
//!                  ┌──────────────────────────┐
//!                  │ CheckpointStore (resume) │
//!                  └──────────────────────────┘
//! ```
//!
//! Implementations are responsible for translating whatever their transport
//! reports into the typed errors of [`crate::error`]; in particular a rate
//! limit must arrive as `RateLimited { retry_after }` with the wait already
//! extracted.

use anyhow::Result;
use async_trait::async_trait;

use crate::error::{FetchError, PersistError};
use crate::models::{ChatRef, MediaRecord, RawMessage};

/// Raw access to a message history.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use mediadex::error::FetchError;
/// use mediadex::models::{ChatRef, RawMessage};
/// use mediadex::traits::HistorySource;
///
/// struct EmptyHistory;
///
/// #[async_trait]
/// impl HistorySource for EmptyHistory {
///     async fn fetch(
///         &self,
///         _source: &ChatRef,
///         _cursor: i64,
///         _max_count: usize,
///     ) -> Result<Vec<RawMessage>, FetchError> {
///         Ok(vec![])
///     }
///
///     async fn latest_position(&self, _source: &ChatRef) -> Result<Option<i64>, FetchError> {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Return up to `max_count` items with position `<= cursor`, newest first.
    ///
    /// A result shorter than `max_count` means the beginning of the history
    /// was reached.
    async fn fetch(
        &self,
        source: &ChatRef,
        cursor: i64,
        max_count: usize,
    ) -> Result<Vec<RawMessage>, FetchError>;

    /// Position of the newest item, or `None` for an empty history.
    async fn latest_position(&self, source: &ChatRef) -> Result<Option<i64>, FetchError>;
}

/// Whether a persisted record was new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Duplicate,
}

/// Durable store of media records.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Store `record`, or report that an equivalent record already exists.
    async fn save(&self, record: &MediaRecord) -> Result<SaveOutcome, PersistError>;
}

/// Storage for resume markers of unfinished jobs.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, source: &ChatRef) -> Result<Option<i64>>;
    async fn store(&self, source: &ChatRef, cursor: i64) -> Result<()>;
    async fn clear(&self, source: &ChatRef) -> Result<()>;
}
