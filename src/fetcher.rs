//! Rate-limited batch fetching.
//!
//! [`RateLimitedFetcher`] wraps a [`HistorySource`] and applies the fetch
//! side of the backoff policy: batch sizes are capped at [`BATCH_CEILING`],
//! and a rate-limited fetch is repeated at the same cursor until the
//! upstream answers with data or a non-rate-limit failure. Skipping a batch
//! would silently lose history.

use std::sync::Arc;
use tracing::debug;

use crate::backoff::BackoffController;
use crate::error::FetchError;
use crate::models::{ChatRef, RawMessage};
use crate::traits::HistorySource;

/// Largest batch requested from the upstream in one call.
pub const BATCH_CEILING: usize = 100;

pub struct RateLimitedFetcher {
    source: Arc<dyn HistorySource>,
    backoff: BackoffController,
}

impl RateLimitedFetcher {
    pub fn new(source: Arc<dyn HistorySource>, backoff: BackoffController) -> Self {
        Self { source, backoff }
    }

    /// Effective batch size for a requested count.
    pub fn capped(max_count: usize) -> usize {
        max_count.clamp(1, BATCH_CEILING)
    }

    /// Fetch one batch ending at `cursor`, newest first.
    ///
    /// Never returns `RateLimited`: those are waited out and retried here.
    pub async fn fetch(
        &self,
        chat: &ChatRef,
        cursor: i64,
        max_count: usize,
    ) -> Result<Vec<RawMessage>, FetchError> {
        let limit = Self::capped(max_count);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.source.fetch(chat, cursor, limit).await {
                Ok(batch) => {
                    debug!(%chat, cursor, limit, got = batch.len(), attempt, "batch fetched");
                    return Ok(batch);
                }
                Err(FetchError::RateLimited { retry_after }) => {
                    self.backoff.await_retry(retry_after, "fetch").await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Position of the newest item, retrying through rate limits.
    pub async fn latest_position(&self, chat: &ChatRef) -> Result<Option<i64>, FetchError> {
        loop {
            match self.source.latest_position(chat).await {
                Err(FetchError::RateLimited { retry_after }) => {
                    self.backoff.await_retry(retry_after, "latest_position").await;
                }
                other => return other,
            }
        }
    }
}
