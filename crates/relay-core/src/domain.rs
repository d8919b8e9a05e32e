use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a delivered message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Where outbound messages go: a numeric chat or a public `@channel`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    Chat(ChatId),
    Channel(String),
}

impl FromStr for Destination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            return Ok(Destination::Chat(ChatId(id)));
        }
        match s.strip_prefix('@') {
            Some(name) if !name.is_empty() && !name.contains(char::is_whitespace) => {
                Ok(Destination::Channel(s.to_string()))
            }
            _ => Err(Error::Config(format!(
                "invalid destination {s:?}: expected a numeric chat id or @channel"
            ))),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Chat(id) => write!(f, "{}", id.0),
            Destination::Channel(name) => f.write_str(name),
        }
    }
}

impl From<ChatId> for Destination {
    fn from(id: ChatId) -> Self {
        Destination::Chat(id)
    }
}

/// Source-scoped item identifier. Ordered; newer items have larger ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub location: String,
}

impl MediaRef {
    pub fn photo(location: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Photo,
            location: location.into(),
        }
    }
}

/// One unit of content from a source.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub title: Option<String>,
    pub body: String,
    pub source_name: String,
    pub url: String,
    pub media: Vec<MediaRef>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Item {
    /// First photo-type media reference. Additional media are not relayed.
    pub fn first_photo(&self) -> Option<&MediaRef> {
        self.media.iter().find(|m| m.kind == MediaKind::Photo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_destinations() {
        assert_eq!(
            "-1001234".parse::<Destination>().unwrap(),
            Destination::Chat(ChatId(-1001234))
        );
        assert_eq!(
            " @news_feed ".parse::<Destination>().unwrap(),
            Destination::Channel("@news_feed".to_string())
        );
        assert!("news_feed".parse::<Destination>().is_err());
        assert!("@".parse::<Destination>().is_err());
    }

    #[test]
    fn first_photo_skips_other_media() {
        let item = Item {
            id: ItemId(1),
            title: None,
            body: String::new(),
            source_name: "x".into(),
            url: String::new(),
            media: vec![
                MediaRef {
                    kind: MediaKind::Other,
                    location: "v.mp4".into(),
                },
                MediaRef::photo("a.jpg"),
                MediaRef::photo("b.jpg"),
            ],
            published_at: None,
        };
        assert_eq!(item.first_photo().unwrap().location, "a.jpg");
    }
}
