//! X (Twitter) API v2 user timeline.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use relay_core::{
    domain::{Item, ItemId, MediaKind, MediaRef},
    source::{ContentSource, FetchError},
    Result,
};

use crate::http;

const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

pub struct TwitterTimelineSource {
    http: reqwest::Client,
    bearer_token: String,
    account: String,
    /// `twitter:<account>`, so each account keeps its own cursor.
    name: String,
    page_size: u32,
    base_url: String,
    user_id: OnceCell<String>,
}

impl TwitterTimelineSource {
    pub fn new(bearer_token: impl Into<String>, account: &str, page_size: u32) -> Result<Self> {
        let account = account.trim_start_matches('@').to_string();
        Ok(Self {
            http: http::client()?,
            bearer_token: bearer_token.into(),
            name: format!("twitter:{account}"),
            account,
            page_size,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: OnceCell::new(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// The API accepts 5..=100.
    fn max_results(&self) -> u32 {
        self.page_size.clamp(5, 100)
    }

    async fn user_id(&self) -> std::result::Result<&str, FetchError> {
        let id = self
            .user_id
            .get_or_try_init(|| async {
                let url = format!("{}/2/users/by/username/{}", self.base_url, self.account);
                let resp = self
                    .http
                    .get(url)
                    .bearer_auth(&self.bearer_token)
                    .send()
                    .await
                    .map_err(http::network)?;
                let lookup: UserLookup = http::read_json(resp).await?;
                let id = user_id_from(lookup)?;
                info!(account = %self.account, user_id = %id, "resolved timeline account");
                Ok::<_, FetchError>(id)
            })
            .await?;
        Ok(id.as_str())
    }
}

#[async_trait]
impl ContentSource for TwitterTimelineSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, since: Option<ItemId>) -> std::result::Result<Vec<Item>, FetchError> {
        let user_id = self.user_id().await?;
        let url = format!("{}/2/users/{user_id}/tweets", self.base_url);

        let mut params = vec![
            ("max_results", self.max_results().to_string()),
            ("tweet.fields", "created_at,attachments".to_string()),
            ("expansions", "attachments.media_keys".to_string()),
            ("media.fields", "type,url,preview_image_url".to_string()),
        ];
        if let Some(id) = since {
            params.push(("since_id", id.to_string()));
        }
        debug!(account = %self.account, since = ?since.map(|s| s.0), "fetching timeline");

        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(&params)
            .send()
            .await
            .map_err(http::network)?;

        let page: TimelinePage = http::read_json(resp).await?;
        into_items(page, &self.account)
    }
}

#[derive(Debug, Deserialize)]
struct UserLookup {
    data: Option<User>,
    #[serde(default)]
    errors: Vec<ApiProblem>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiProblem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct TimelinePage {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: Option<String>,
    attachments: Option<Attachments>,
}

#[derive(Debug, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    media: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    media_key: String,
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    preview_image_url: Option<String>,
}

fn user_id_from(lookup: UserLookup) -> std::result::Result<String, FetchError> {
    if let Some(user) = lookup.data {
        return Ok(user.id);
    }
    let body = lookup
        .errors
        .first()
        .map(|p| format!("{}: {}", p.title, p.detail))
        .unwrap_or_else(|| "user lookup returned no data".to_string());
    Err(FetchError::Status {
        status: 404,
        body: http::snippet(&body),
    })
}

fn into_items(page: TimelinePage, account: &str) -> std::result::Result<Vec<Item>, FetchError> {
    let media: HashMap<&str, &Media> = page
        .includes
        .media
        .iter()
        .map(|m| (m.media_key.as_str(), m))
        .collect();

    page.data
        .iter()
        .map(|tweet| {
            let id = tweet
                .id
                .parse::<u64>()
                .map_err(|_| FetchError::Malformed(format!("non-numeric post id {:?}", tweet.id)))?;

            // Keep the post's own media order.
            let refs = tweet
                .attachments
                .iter()
                .flat_map(|a| a.media_keys.iter())
                .filter_map(|key| media.get(key.as_str()))
                .filter_map(|m| media_ref(m))
                .collect();

            Ok(Item {
                id: ItemId(id),
                title: None,
                body: tweet.text.clone(),
                source_name: account.to_string(),
                url: format!("https://x.com/{account}/status/{id}"),
                media: refs,
                published_at: tweet
                    .created_at
                    .as_deref()
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc)),
            })
        })
        .collect()
}

fn media_ref(m: &Media) -> Option<MediaRef> {
    if m.kind == "photo" {
        return m.url.clone().map(MediaRef::photo);
    }
    m.preview_image_url.clone().map(|location| MediaRef {
        kind: MediaKind::Other,
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::cursor;

    const PAGE: &str = r#"{
        "data": [
            {
                "id": "1790000000000000002",
                "text": "Second post with two photos",
                "created_at": "2024-05-13T12:00:00.000Z",
                "attachments": {"media_keys": ["3_b", "3_a"]}
            },
            {
                "id": "1790000000000000001",
                "text": "First post, a video",
                "created_at": "2024-05-13T11:00:00.000Z",
                "attachments": {"media_keys": ["7_v"]}
            }
        ],
        "includes": {
            "media": [
                {"media_key": "3_a", "type": "photo", "url": "https://pbs.twimg.com/a.jpg"},
                {"media_key": "3_b", "type": "photo", "url": "https://pbs.twimg.com/b.jpg"},
                {"media_key": "7_v", "type": "video", "preview_image_url": "https://pbs.twimg.com/v.jpg"}
            ]
        },
        "meta": {"result_count": 2, "newest_id": "1790000000000000002"}
    }"#;

    #[test]
    fn maps_timeline_page() {
        let page: TimelinePage = http::decode(PAGE).unwrap();
        let items = into_items(page, "relaybot").unwrap();
        assert_eq!(items.len(), 2);

        let newest = &items[0];
        assert_eq!(newest.id, ItemId(1_790_000_000_000_000_002));
        assert_eq!(newest.title, None);
        assert_eq!(newest.source_name, "relaybot");
        assert_eq!(
            newest.url,
            "https://x.com/relaybot/status/1790000000000000002"
        );
        let locations: Vec<_> = newest.media.iter().map(|m| m.location.as_str()).collect();
        assert_eq!(
            locations,
            vec!["https://pbs.twimg.com/b.jpg", "https://pbs.twimg.com/a.jpg"]
        );
        assert_eq!(
            newest.first_photo().map(|m| m.location.as_str()),
            Some("https://pbs.twimg.com/b.jpg")
        );
        assert!(newest.published_at.is_some());

        let video = &items[1];
        assert_eq!(video.media[0].kind, MediaKind::Other);
        assert!(video.first_photo().is_none());
    }

    #[test]
    fn empty_page_has_no_items() {
        let page: TimelinePage = http::decode(r#"{"meta":{"result_count":0}}"#).unwrap();
        assert!(into_items(page, "relaybot").unwrap().is_empty());
    }

    #[test]
    fn bad_ids_are_malformed() {
        let page: TimelinePage =
            http::decode(r#"{"data":[{"id":"abc","text":"x"}]}"#).unwrap();
        assert!(matches!(
            into_items(page, "relaybot"),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_user_is_status_error() {
        let lookup: UserLookup = http::decode(
            r#"{"errors":[{"title":"Not Found Error","detail":"Could not find user with username: [nobody]."}]}"#,
        )
        .unwrap();
        let err = user_id_from(lookup).unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, ref body } if body.starts_with("Not Found Error")));

        let lookup: UserLookup = http::decode(r#"{"data":{"id":"42","username":"x"}}"#).unwrap();
        assert_eq!(user_id_from(lookup).unwrap(), "42");
    }

    #[test]
    fn clamps_page_size() {
        let small = TwitterTimelineSource::new("t", "@a", 1).unwrap();
        assert_eq!(small.max_results(), 5);
        assert_eq!(small.account(), "a");
        let big = TwitterTimelineSource::new("t", "a", 500).unwrap();
        assert_eq!(big.max_results(), 100);
    }

    #[test]
    fn name_is_per_account() {
        let a = TwitterTimelineSource::new("t", "@rustlang", 10).unwrap();
        let b = TwitterTimelineSource::new("t", "tokio_rs", 10).unwrap();
        assert_eq!(a.name(), "twitter:rustlang");
        assert_ne!(
            cursor::cursor_key(a.name(), "@relay"),
            cursor::cursor_key(b.name(), "@relay")
        );
    }
}
