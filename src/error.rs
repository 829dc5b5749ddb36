//! Error taxonomy of the indexing core.
//!
//! Upstream failures are always one of three kinds: a rate-limit signal with
//! a typed wait, a transient (network-ish) failure, or a fatal one. Any
//! parsing of loosely-typed transport errors belongs in the adapter that
//! produces these values.

use std::time::Duration;
use thiserror::Error;

/// Failure of a history fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("source not accessible: {0}")]
    Fatal(String),
}

/// Failure of a single persist call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("persist failed: {0}")]
    Failed(String),
}

/// Caller-facing rejections of the coordinator and link resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("an indexing job is already running; wait until it completes")]
    AlreadyRunning,

    #[error("could not determine the starting message for indexing")]
    NoStartingPoint,

    #[error("not a recognized chat link or forwarded message")]
    NotRecognized,

    #[error("indexing task failed: {0}")]
    Task(String),
}
