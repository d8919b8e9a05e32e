use std::{fmt, time::Duration};

/// Core error type for the relay.
///
/// Adapter crates map their provider-specific errors into this type so the
/// pipeline can classify failures without knowing which client produced them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("destination error: {0}")]
    Destination(DestinationError),

    #[error("external error: {0}")]
    External(String),
}

impl From<DestinationError> for Error {
    fn from(e: DestinationError) -> Self {
        Error::Destination(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A messaging-provider failure, normalized at the adapter boundary.
///
/// `description` is the provider's own error text (e.g. `Bad Request: chat not
/// found`); classification inspects it together with `status`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DestinationError {
    pub status: Option<u16>,
    pub description: String,
    pub retry_after: Option<Duration>,
    pub network: bool,
}

impl DestinationError {
    pub fn api(status: Option<u16>, description: impl Into<String>) -> Self {
        Self {
            status,
            description: description.into(),
            retry_after: None,
            network: false,
        }
    }

    pub fn network(description: impl Into<String>) -> Self {
        Self {
            status: None,
            description: description.into(),
            retry_after: None,
            network: true,
        }
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            status: Some(429),
            description: "Too Many Requests".to_string(),
            retry_after: Some(retry_after),
            network: false,
        }
    }
}

impl fmt::Display for DestinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{status}] {}", self.description),
            None => f.write_str(&self.description),
        }
    }
}
