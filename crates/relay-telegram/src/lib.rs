//! Telegram adapter (teloxide).
//!
//! Implements the `relay-core` MessagingPort over the Telegram Bot API and
//! hosts the command router for bot mode.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ChatMemberKind, InputFile, ParseMode, Recipient, UserId},
    ApiError, RequestError,
};
use tokio::sync::OnceCell;

pub mod router;

use relay_core::{
    domain::{ChatId, Destination, MessageId, MessageRef},
    errors::{DestinationError, Error},
    formatting::MarkupMode,
    messaging::{
        port::MessagingPort,
        types::{Membership, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    me: OnceCell<UserId>,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            me: OnceCell::new(),
        }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Bot::new(token))
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn recipient(dest: &Destination) -> Recipient {
        match dest {
            Destination::Chat(id) => Recipient::Id(teloxide::types::ChatId(id.0)),
            Destination::Channel(name) => Recipient::ChannelUsername(name.clone()),
        }
    }

    #[allow(deprecated)]
    fn parse_mode(markup: MarkupMode) -> Option<ParseMode> {
        match markup {
            MarkupMode::Plain => None,
            MarkupMode::Html => Some(ParseMode::Html),
            MarkupMode::Markdown => Some(ParseMode::Markdown),
        }
    }

    fn message_ref(msg: &Message) -> MessageRef {
        MessageRef {
            chat_id: ChatId(msg.chat.id.0),
            message_id: MessageId(msg.id.0),
        }
    }

    async fn my_id(&self) -> Result<UserId> {
        let id = self
            .me
            .get_or_try_init(|| async {
                let me = self.bot.get_me().await.map_err(map_err)?;
                Ok::<_, Error>(me.user.id)
            })
            .await?;
        Ok(*id)
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            supports_markdown: true,
            supports_photos: true,
            supports_membership_check: true,
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_text(
        &self,
        dest: &Destination,
        text: &str,
        markup: MarkupMode,
    ) -> Result<MessageRef> {
        let mut req = self
            .bot
            .send_message(Self::recipient(dest), text.to_string());
        if let Some(mode) = Self::parse_mode(markup) {
            req = req.parse_mode(mode);
        }
        let msg = req.await.map_err(map_err)?;
        Ok(Self::message_ref(&msg))
    }

    async fn send_photo(
        &self,
        dest: &Destination,
        photo_url: &str,
        caption: &str,
        markup: MarkupMode,
    ) -> Result<MessageRef> {
        let url = reqwest::Url::parse(photo_url).map_err(|e| {
            Error::Destination(DestinationError::api(
                Some(400),
                format!("Bad Request: wrong file identifier/HTTP URL specified ({e})"),
            ))
        })?;

        let mut req = self
            .bot
            .send_photo(Self::recipient(dest), InputFile::url(url))
            .caption(caption.to_string());
        if let Some(mode) = Self::parse_mode(markup) {
            req = req.parse_mode(mode);
        }
        let msg = req.await.map_err(map_err)?;
        Ok(Self::message_ref(&msg))
    }

    async fn membership(&self, dest: &Destination) -> Result<Membership> {
        let me = self.my_id().await?;
        let member = self
            .bot
            .get_chat_member(Self::recipient(dest), me)
            .await
            .map_err(map_err)?;

        Ok(membership_of(&member.kind))
    }
}

/// A restricted member may still be allowed to post text.
fn membership_of(kind: &ChatMemberKind) -> Membership {
    match kind {
        ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_) | ChatMemberKind::Member => {
            Membership::Present
        }
        ChatMemberKind::Restricted(r) if r.can_send_messages => Membership::Present,
        ChatMemberKind::Restricted(_) => Membership::Restricted,
        ChatMemberKind::Left | ChatMemberKind::Banned(_) => Membership::Absent,
    }
}

fn map_err(e: RequestError) -> Error {
    Error::Destination(destination_error(e))
}

/// Normalize a teloxide failure. Bot API descriptions start with the HTTP
/// reason ("Bad Request: ...", "Forbidden: ..."), which gives the status.
pub fn destination_error(e: RequestError) -> DestinationError {
    match e {
        RequestError::RetryAfter(wait) => DestinationError::rate_limited(wait),
        RequestError::Api(api) => api_error(&api),
        RequestError::Network(err) => DestinationError::network(err.to_string()),
        RequestError::Io(err) => DestinationError::network(err.to_string()),
        RequestError::MigrateToChatId(id) => DestinationError::api(
            Some(400),
            format!("Bad Request: group chat was upgraded to a supergroup chat ({id:?})"),
        ),
        other => DestinationError::api(None, other.to_string()),
    }
}

fn api_error(api: &ApiError) -> DestinationError {
    let description = api.to_string();
    DestinationError::api(status_from_description(&description), description)
}

fn status_from_description(description: &str) -> Option<u16> {
    const PREFIXES: &[(&str, u16)] = &[
        ("Bad Request", 400),
        ("Unauthorized", 401),
        ("Forbidden", 403),
        ("Not Found", 404),
        ("Conflict", 409),
        ("Too Many Requests", 429),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _)| description.starts_with(prefix))
        .map(|(_, status)| *status)
}
