//! Delivery agent: send, classify failures, retry rate limits.

use std::{fmt, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    errors::{DestinationError, Error},
    formatting::OutboundMessage,
    messaging::port::MessagingPort,
};

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Result of one delivery. Only `Sent` permits cursor advancement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    RateLimited(Duration),
    PermissionDenied,
    DestinationNotFound,
    TransientError,
    FatalError,
}

impl DeliveryOutcome {
    pub fn is_sent(self) -> bool {
        matches!(self, DeliveryOutcome::Sent)
    }

    /// Destination-level problems that persist until an operator acts.
    pub fn is_destination_problem(self) -> bool {
        matches!(
            self,
            DeliveryOutcome::PermissionDenied | DeliveryOutcome::DestinationNotFound
        )
    }

    pub fn class(self) -> &'static str {
        match self {
            DeliveryOutcome::Sent => "sent",
            DeliveryOutcome::RateLimited(_) => "rate_limited",
            DeliveryOutcome::PermissionDenied => "permission_denied",
            DeliveryOutcome::DestinationNotFound => "destination_not_found",
            DeliveryOutcome::TransientError => "transient",
            DeliveryOutcome::FatalError => "fatal",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class())
    }
}

const NOT_FOUND_MARKERS: &[&str] = &[
    "chat not found",
    "user not found",
    "upgraded to a supergroup",
    "peer_id_invalid",
];

const PERMISSION_MARKERS: &[&str] = &[
    "not enough rights",
    "have no rights",
    "kicked",
    "blocked",
    "not a member",
    "chat_write_forbidden",
    "need administrator rights",
];

const MEDIA_MARKERS: &[&str] = &[
    "wrong file identifier",
    "failed to get http url content",
    "wrong type of the web page content",
    "wrong remote file",
];

/// Map a normalized provider error onto the outcome taxonomy.
pub fn classify(err: &DestinationError) -> DeliveryOutcome {
    let desc = err.description.to_lowercase();

    if err.retry_after.is_some() || err.status == Some(429) || desc.contains("too many requests")
    {
        return DeliveryOutcome::RateLimited(err.retry_after.unwrap_or(DEFAULT_RETRY_AFTER));
    }
    if err.network {
        return DeliveryOutcome::TransientError;
    }
    if NOT_FOUND_MARKERS.iter().any(|m| desc.contains(m)) {
        return DeliveryOutcome::DestinationNotFound;
    }
    if err.status == Some(403) || PERMISSION_MARKERS.iter().any(|m| desc.contains(m)) {
        return DeliveryOutcome::PermissionDenied;
    }
    match err.status {
        Some(401) | Some(404) => DeliveryOutcome::FatalError,
        Some(s) if s >= 500 => DeliveryOutcome::TransientError,
        Some(400) => DeliveryOutcome::FatalError,
        _ => DeliveryOutcome::TransientError,
    }
}

/// Classify any core error raised by a messaging port.
pub fn classify_error(err: &Error) -> DeliveryOutcome {
    match err {
        Error::Destination(e) => classify(e),
        Error::Config(_) => DeliveryOutcome::FatalError,
        _ => DeliveryOutcome::TransientError,
    }
}

fn is_media_rejection(err: &Error) -> bool {
    let Error::Destination(e) = err else {
        return false;
    };
    let desc = e.description.to_lowercase();
    MEDIA_MARKERS.iter().any(|m| desc.contains(m))
}

#[derive(Clone, Copy, Debug)]
pub struct DeliveryPolicy {
    /// Check the agent's membership before sending (group mode).
    pub verify_membership: bool,
    /// How many times a rate-limited send is retried before giving up.
    pub rate_limit_retries: usize,
    /// Upper bound on a single rate-limit wait.
    pub max_retry_wait: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            verify_membership: false,
            rate_limit_retries: 1,
            max_retry_wait: Duration::from_secs(60),
        }
    }
}

pub struct DeliveryAgent {
    messenger: Arc<dyn MessagingPort>,
    policy: DeliveryPolicy,
}

impl DeliveryAgent {
    pub fn new(messenger: Arc<dyn MessagingPort>, policy: DeliveryPolicy) -> Self {
        Self { messenger, policy }
    }

    pub fn messenger(&self) -> &Arc<dyn MessagingPort> {
        &self.messenger
    }

    /// Send one message. Never returns an error: every failure is classified.
    pub async fn deliver(&self, msg: &OutboundMessage) -> DeliveryOutcome {
        let dest = &msg.destination;

        if self.policy.verify_membership && self.messenger.capabilities().supports_membership_check
        {
            match self.messenger.membership(dest).await {
                Ok(m) if m.can_post() => {}
                Ok(m) => {
                    warn!(destination = %dest, membership = ?m, class = "permission_denied", "agent cannot post in destination; send skipped");
                    return DeliveryOutcome::PermissionDenied;
                }
                Err(e) => {
                    let outcome = classify_error(&e);
                    warn!(destination = %dest, class = outcome.class(), error = %e, "membership check failed");
                    return outcome;
                }
            }
        }

        let mut attempts = 0usize;
        loop {
            let outcome = match self.send_once(msg).await {
                Ok(()) => DeliveryOutcome::Sent,
                Err(e) => {
                    let outcome = classify_error(&e);
                    warn!(destination = %dest, class = outcome.class(), error = %e, attempt = attempts + 1, "delivery failed");
                    outcome
                }
            };

            match outcome {
                DeliveryOutcome::RateLimited(wait) if attempts < self.policy.rate_limit_retries => {
                    attempts += 1;
                    let wait = wait.min(self.policy.max_retry_wait);
                    info!(destination = %dest, wait_secs = wait.as_secs_f64(), "rate limited; retrying");
                    sleep(wait).await;
                }
                other => return other,
            }
        }
    }

    async fn send_once(&self, msg: &OutboundMessage) -> crate::Result<()> {
        let dest = &msg.destination;
        let photo = msg
            .media
            .as_ref()
            .filter(|_| self.messenger.capabilities().supports_photos);

        let Some(photo) = photo else {
            // Media the messenger cannot carry: send the text form instead.
            let text = match (&msg.media, &msg.fallback_text) {
                (Some(_), Some(fallback)) => fallback.as_str(),
                _ => msg.text.as_str(),
            };
            self.messenger.send_text(dest, text, msg.markup).await?;
            return Ok(());
        };

        match self
            .messenger
            .send_photo(dest, &photo.location, &msg.text, msg.markup)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_media_rejection(&e) => {
                debug!(destination = %dest, photo = %photo.location, error = %e, "photo rejected; sending as text");
                let text = msg.fallback_text.as_deref().unwrap_or(&msg.text);
                self.messenger.send_text(dest, text, msg.markup).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
