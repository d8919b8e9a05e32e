//! Content-source port.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Item, ItemId};

/// Classified fetch failure. Every variant is recoverable: the run loop treats
/// it as an empty batch and tries again on the next cycle.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Upstream content provider (timeline, news search, ...).
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Stable name used for logging and cursor keys.
    fn name(&self) -> &str;

    /// Items strictly newer than `since` if given, otherwise a bounded recent
    /// window. Returned in the provider's native order.
    async fn fetch(&self, since: Option<ItemId>) -> Result<Vec<Item>, FetchError>;
}
