//! NewsAPI `/v2/everything` search.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use relay_core::{
    domain::{Item, ItemId, MediaRef},
    source::{ContentSource, FetchError},
    Result,
};

use crate::http;

const DEFAULT_BASE_URL: &str = "https://newsapi.org";

#[derive(Clone, Debug)]
pub struct NewsQuery {
    pub keywords: Vec<String>,
    pub language: String,
    pub lookback_days: u32,
    pub sort_by: String,
    pub page_size: u32,
}

impl NewsQuery {
    /// `AI OR "machine learning" OR ...`
    pub fn search_expression(&self) -> String {
        self.keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| {
                if k.contains(char::is_whitespace) {
                    format!("\"{k}\"")
                } else {
                    k.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

pub struct NewsApiSource {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    query: NewsQuery,
}

impl NewsApiSource {
    pub fn new(api_key: impl Into<String>, query: NewsQuery) -> Result<Self> {
        Ok(Self {
            http: http::client()?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            query,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Lower bound for `from`: the cursor's publish time, else the lookback window.
    fn from_param(&self, since: Option<ItemId>) -> String {
        let lookback = Utc::now() - ChronoDuration::days(i64::from(self.query.lookback_days));
        let from = since
            .and_then(|id| DateTime::<Utc>::from_timestamp_millis(id.0 as i64))
            .map_or(lookback, |t| t.max(lookback));
        from.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

#[async_trait]
impl ContentSource for NewsApiSource {
    fn name(&self) -> &str {
        "newsapi"
    }

    async fn fetch(&self, since: Option<ItemId>) -> std::result::Result<Vec<Item>, FetchError> {
        let url = format!("{}/v2/everything", self.base_url);
        let page_size = self.query.page_size.clamp(1, 100).to_string();
        let from = self.from_param(since);
        debug!(from = %from, "fetching news");

        let resp = self
            .http
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", self.query.search_expression().as_str()),
                ("language", self.query.language.as_str()),
                ("from", from.as_str()),
                ("sortBy", self.query.sort_by.as_str()),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(http::network)?;

        let payload: Everything = http::read_json(resp).await?;
        let items = into_items(payload)?;
        Ok(match since {
            Some(cur) => items.into_iter().filter(|it| it.id > cur).collect(),
            None => items,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Everything {
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    #[serde(default)]
    source: ArticleSource,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    url_to_image: Option<String>,
    published_at: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

fn into_items(payload: Everything) -> std::result::Result<Vec<Item>, FetchError> {
    if payload.status != "ok" {
        let code = payload.code.unwrap_or_default();
        let message = payload.message.unwrap_or_default();
        return Err(FetchError::Status {
            status: 200,
            body: http::snippet(&format!("{code}: {message}")),
        });
    }

    let mut used = HashSet::new();
    let mut items = Vec::with_capacity(payload.articles.len());
    for article in payload.articles {
        let Some(published) = article
            .published_at
            .as_deref()
            .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
            .map(|p| p.with_timezone(&Utc))
        else {
            warn!(url = ?article.url, "skipping article without a valid publishedAt");
            continue;
        };

        // Articles have no id; publish time in ms, nudged until unique.
        let mut id = published.timestamp_millis().max(0) as u64;
        while !used.insert(id) {
            id += 1;
        }

        let body = article
            .content
            .filter(|c| !c.trim().is_empty())
            .or(article.description)
            .map(|b| strip_truncation_marker(&b))
            .unwrap_or_default();

        items.push(Item {
            id: ItemId(id),
            title: article.title.filter(|t| !t.trim().is_empty()),
            body,
            source_name: article.source.name.unwrap_or_default(),
            url: article.url.unwrap_or_default(),
            media: article
                .url_to_image
                .filter(|u| !u.trim().is_empty())
                .map(MediaRef::photo)
                .into_iter()
                .collect(),
            published_at: Some(published),
        });
    }
    Ok(items)
}

/// Drop NewsAPI's trailing `[+1234 chars]`.
fn strip_truncation_marker(text: &str) -> String {
    let trimmed = text.trim_end();
    if let Some(start) = trimmed.rfind("[+") {
        let tail = &trimmed[start + 2..];
        if let Some(num) = tail.strip_suffix(" chars]") {
            if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) {
                return trimmed[..start].trim_end().to_string();
            }
        }
    }
    trimmed.to_string()
}
