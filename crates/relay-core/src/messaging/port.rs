use async_trait::async_trait;

use crate::{
    domain::{Destination, MessageRef},
    formatting::MarkupMode,
    messaging::types::{Membership, MessagingCapabilities},
    Result,
};

/// Cross-messenger port.
///
/// Implementations report provider failures as `Error::Destination` so the
/// delivery agent can classify them without seeing provider types.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(
        &self,
        dest: &Destination,
        text: &str,
        markup: MarkupMode,
    ) -> Result<MessageRef>;

    async fn send_photo(
        &self,
        dest: &Destination,
        photo_url: &str,
        caption: &str,
        markup: MarkupMode,
    ) -> Result<MessageRef>;

    /// Whether the agent itself can post in `dest`.
    async fn membership(&self, dest: &Destination) -> Result<Membership>;
}
