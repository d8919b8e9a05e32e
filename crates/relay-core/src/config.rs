use std::{env, fs, path::Path, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    delivery::DeliveryPolicy,
    domain::Destination,
    errors::Error,
    filter::FilterCriteria,
    formatting::{DigestSettings, Formatter, MarkupMode, MessageLimits},
    pipeline::PipelineSettings,
    Result,
};

const DEFAULT_KEYWORDS: &str = "AI,artificial intelligence,machine learning,deep learning,\
neural networks,NLP,computer vision";
const DEFAULT_SOURCES: &str = "Forbes,TechCrunch,Wired,MIT Technology Review,VentureBeat";

/// What the process does once started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayMode {
    /// Poll the timeline and forward each new post.
    Forward,
    /// Send one news digest and exit.
    Digest,
    /// Answer chat commands.
    Bot,
}

impl FromStr for RelayMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "digest" => Ok(Self::Digest),
            "bot" => Ok(Self::Bot),
            other => Err(Error::Config(format!(
                "RELAY_MODE must be forward, digest or bot (got {other:?})"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TwitterConfig {
    pub bearer_token: String,
    /// Account name without the leading `@`.
    pub account: String,
    pub page_size: u32,
}

#[derive(Clone, Debug)]
pub struct NewsConfig {
    pub api_key: String,
    pub language: String,
    pub lookback_days: u32,
    pub sort_by: String,
    pub page_size: u32,
}

/// Typed process configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: RelayMode,

    // Telegram
    pub telegram_bot_token: String,
    pub channel: Option<Destination>,
    pub telegram_message_limit: usize,
    pub telegram_caption_limit: usize,
    pub markup: MarkupMode,

    // Sources
    pub twitter: Option<TwitterConfig>,
    pub news: Option<NewsConfig>,

    // Filtering and digest
    pub topic: String,
    pub keywords: Vec<String>,
    pub allowed_sources: Vec<String>,
    pub digest_max_items: usize,
    pub summary_sentences: usize,
    pub summary_char_cap: usize,

    // Run loop
    pub poll_interval: Duration,
    pub cursor_file: PathBuf,
    /// Forget the stored cursor once at startup.
    pub reset_cursor: bool,
    pub fatal_after: u32,

    // Delivery
    pub verify_membership: bool,
    pub rate_limit_retries: usize,
    pub max_retry_wait: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(&lookup);

        let mode = match vars.str("RELAY_MODE") {
            Some(m) => m.parse()?,
            None => RelayMode::Forward,
        };

        let telegram_bot_token = vars.required("TELEGRAM_BOT_TOKEN")?;

        let channel = match vars.str("TELEGRAM_CHANNEL") {
            Some(raw) => Some(raw.parse::<Destination>()?),
            None if mode != RelayMode::Bot => {
                return Err(missing("TELEGRAM_CHANNEL"));
            }
            None => None,
        };

        let twitter = if mode == RelayMode::Forward {
            Some(TwitterConfig {
                bearer_token: vars.required("TWITTER_BEARER_TOKEN")?,
                account: vars
                    .required("TWITTER_ACCOUNT")?
                    .trim_start_matches('@')
                    .to_string(),
                page_size: vars.num("TWITTER_PAGE_SIZE")?.unwrap_or(10),
            })
        } else {
            None
        };

        let news = if mode == RelayMode::Forward {
            None
        } else {
            Some(NewsConfig {
                api_key: vars.required("NEWS_API_KEY")?,
                language: vars.str("NEWS_LANGUAGE").unwrap_or_else(|| "en".to_string()),
                lookback_days: vars.num("NEWS_LOOKBACK_DAYS")?.unwrap_or(7),
                sort_by: vars
                    .str("NEWS_SORT_BY")
                    .unwrap_or_else(|| "relevancy".to_string()),
                page_size: vars.num("NEWS_PAGE_SIZE")?.unwrap_or(50),
            })
        };

        let markup = match vars.str("MARKUP_MODE") {
            Some(m) => m.parse()?,
            None => MarkupMode::Html,
        };

        Ok(Self {
            mode,
            telegram_bot_token,
            channel,
            telegram_message_limit: vars.num("TELEGRAM_MESSAGE_LIMIT")?.unwrap_or(4096),
            telegram_caption_limit: vars.num("TELEGRAM_CAPTION_LIMIT")?.unwrap_or(1024),
            markup,
            twitter,
            news,
            topic: vars.str("NEWS_TOPIC").unwrap_or_else(|| "AI".to_string()),
            keywords: parse_csv(
                &vars
                    .str("NEWS_KEYWORDS")
                    .unwrap_or_else(|| DEFAULT_KEYWORDS.to_string()),
            ),
            allowed_sources: parse_csv(
                &vars
                    .str("NEWS_ALLOWED_SOURCES")
                    .unwrap_or_else(|| DEFAULT_SOURCES.to_string()),
            ),
            digest_max_items: vars.num("DIGEST_MAX_ITEMS")?.unwrap_or(5),
            summary_sentences: vars.num("SUMMARY_SENTENCES")?.unwrap_or(2),
            summary_char_cap: vars.num("SUMMARY_CHAR_CAP")?.unwrap_or(200),
            poll_interval: Duration::from_secs(vars.num("POLL_INTERVAL_SECS")?.unwrap_or(300)),
            cursor_file: PathBuf::from(
                vars.str("CURSOR_FILE")
                    .unwrap_or_else(|| "/tmp/content-relay-cursors.json".to_string()),
            ),
            reset_cursor: vars.bool("RESET_CURSOR").unwrap_or(false),
            fatal_after: vars.num::<u32>("FATAL_AFTER")?.unwrap_or(3).max(1),
            verify_membership: vars.bool("VERIFY_MEMBERSHIP").unwrap_or(false),
            rate_limit_retries: vars.num("RATE_LIMIT_RETRIES")?.unwrap_or(1),
            max_retry_wait: Duration::from_secs(vars.num("MAX_RETRY_WAIT_SECS")?.unwrap_or(60)),
        })
    }

    pub fn formatter(&self) -> Formatter {
        Formatter::new(
            self.markup,
            MessageLimits {
                max_text_len: self.telegram_message_limit,
                max_caption_len: self.telegram_caption_limit,
            },
            DigestSettings {
                topic: self.topic.clone(),
                max_items: self.digest_max_items,
                summary_sentences: self.summary_sentences,
                summary_char_cap: self.summary_char_cap,
            },
        )
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            verify_membership: self.verify_membership,
            rate_limit_retries: self.rate_limit_retries,
            max_retry_wait: self.max_retry_wait,
        }
    }

    /// Forwarded posts carry no titles, so only news modes filter.
    pub fn filter_criteria(&self) -> FilterCriteria {
        match self.mode {
            RelayMode::Forward => FilterCriteria::allow_all(),
            RelayMode::Digest | RelayMode::Bot => {
                FilterCriteria::new(self.allowed_sources.clone(), self.keywords.clone())
            }
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            poll_interval: self.poll_interval,
            fatal_after: self.fatal_after,
        }
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Trimmed value; blank counts as unset.
    fn str(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.str(key).ok_or_else(|| missing(key))
    }

    fn num<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.str(key)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| Error::Config(format!("{key} must be a number (got {v:?})")))
            })
            .transpose()
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.str(key).map(|s| {
            matches!(
                s.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }
}

fn missing(key: &str) -> Error {
    Error::Config(format!("{key} environment variable is required"))
}

fn parse_csv(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        let mut val = v.trim();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }

        env::set_var(key, val);
    }
}
