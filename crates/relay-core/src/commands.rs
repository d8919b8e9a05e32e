//! Chat command dispatch table.
//!
//! Adapters hand raw message text to [`dispatch`]; every reply goes back
//! through the pipeline's delivery agent.

use std::{future::Future, pin::Pin, sync::Arc};

use tracing::{debug, info};

use crate::{delivery::DeliveryOutcome, domain::Destination, pipeline::Pipeline};

pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = DeliveryOutcome> + Send + 'a>>;
pub type CommandHandler = for<'a> fn(&'a CommandContext, Destination) -> CommandFuture<'a>;

pub struct Command {
    pub name: &'static str,
    pub description: &'static str,
    pub handler: CommandHandler,
}

pub struct CommandContext {
    pub pipeline: Arc<Pipeline>,
}

pub const COMMANDS: &[Command] = &[
    Command {
        name: "start",
        description: "Show the welcome message",
        handler: welcome,
    },
    Command {
        name: "help",
        description: "Show the welcome message",
        handler: welcome,
    },
    Command {
        name: "news",
        description: "Get the latest news digest",
        handler: news,
    },
    Command {
        name: "sources",
        description: "List the news sources",
        handler: sources,
    },
    Command {
        name: "keywords",
        description: "List the tracked keywords",
        handler: keywords,
    },
];

/// Split `/cmd@botname args` into a lowercase command name and its arguments.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();
    if cmd.is_empty() {
        return None;
    }
    Some((cmd, rest))
}

pub fn lookup(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// Run the command in `text`, if it names one. Unknown commands and plain
/// text return `None`.
pub async fn dispatch(
    ctx: &CommandContext,
    dest: Destination,
    text: &str,
) -> Option<DeliveryOutcome> {
    let (name, _args) = parse_command(text)?;
    let Some(cmd) = lookup(&name) else {
        debug!(command = %name, "ignoring unknown command");
        return None;
    };

    info!(command = cmd.name, destination = %dest, "handling command");
    Some((cmd.handler)(ctx, dest).await)
}

pub fn welcome_text(topic: &str) -> String {
    format!(
        "Welcome to the {topic} News Bot! 🤖📰\n\n\
         I'm here to keep you updated with the latest {topic} news. Here are the commands you can use:\n\n\
         /news - Get the latest {topic} news\n\
         /sources - See the list of news sources\n\
         /keywords - View the {topic}-related keywords I'm tracking\n\n\
         Feel free to ask for news anytime!"
    )
}

fn welcome(ctx: &CommandContext, dest: Destination) -> CommandFuture<'_> {
    Box::pin(async move {
        let text = welcome_text(&ctx.pipeline.formatter().digest.topic);
        reply(ctx, &dest, &text).await
    })
}

fn news(ctx: &CommandContext, dest: Destination) -> CommandFuture<'_> {
    Box::pin(async move {
        let topic = &ctx.pipeline.formatter().digest.topic;
        let ack = reply(
            ctx,
            &dest,
            &format!("Fetching the latest {topic} news... Please wait."),
        )
        .await;
        if ack.is_destination_problem() {
            return ack;
        }
        ctx.pipeline.digest_on_demand(&dest).await
    })
}

fn sources(ctx: &CommandContext, dest: Destination) -> CommandFuture<'_> {
    Box::pin(async move {
        let list = &ctx.pipeline.criteria().allowed_sources;
        let text = if list.is_empty() {
            "I'm currently accepting news from every source.".to_string()
        } else {
            format!(
                "I'm currently fetching news from these sources:\n\n{}",
                list.join("\n")
            )
        };
        reply(ctx, &dest, &text).await
    })
}

fn keywords(ctx: &CommandContext, dest: Destination) -> CommandFuture<'_> {
    Box::pin(async move {
        let topic = &ctx.pipeline.formatter().digest.topic;
        let list = &ctx.pipeline.criteria().keywords;
        let text = if list.is_empty() {
            "I'm not filtering by keyword right now.".to_string()
        } else {
            format!(
                "I'm tracking news related to these {topic} keywords:\n\n{}",
                list.join("\n")
            )
        };
        reply(ctx, &dest, &text).await
    })
}

async fn reply(ctx: &CommandContext, dest: &Destination, text: &str) -> DeliveryOutcome {
    let msg = ctx.pipeline.formatter().notice(text, dest);
    ctx.pipeline.agent().deliver(&msg).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cursor::MemoryCursorStore,
        delivery::{tests::FakeMessenger, DeliveryAgent, DeliveryPolicy},
        domain::{ChatId, Item, ItemId},
        filter::FilterCriteria,
        formatting::{DigestSettings, Formatter, MarkupMode, MessageLimits},
        pipeline::PipelineSettings,
        source::{ContentSource, FetchError},
    };
    use async_trait::async_trait;

    struct OneArticle;

    #[async_trait]
    impl ContentSource for OneArticle {
        fn name(&self) -> &str {
            "news"
        }

        async fn fetch(&self, _since: Option<ItemId>) -> Result<Vec<Item>, FetchError> {
            Ok(vec![Item {
                id: ItemId(1),
                title: Some("Machine learning beats chess".into()),
                body: "A model won. It was fast.".into(),
                source_name: "Wired".into(),
                url: "https://wired.com/a".into(),
                media: Vec::new(),
                published_at: None,
            }])
        }
    }

    fn context() -> (CommandContext, Arc<FakeMessenger>) {
        let messenger = Arc::new(FakeMessenger::default());
        let agent = Arc::new(DeliveryAgent::new(
            messenger.clone(),
            DeliveryPolicy::default(),
        ));
        let pipeline = Pipeline::new(
            Arc::new(OneArticle),
            agent,
            Arc::new(MemoryCursorStore::new()),
            Formatter::new(
                MarkupMode::Plain,
                MessageLimits::default(),
                DigestSettings::default(),
            ),
            FilterCriteria::new(
                vec!["Wired".into(), "Forbes".into()],
                vec!["machine learning".into()],
            ),
            Some(Destination::Channel("@relay".into())),
            PipelineSettings::default(),
        );
        (
            CommandContext {
                pipeline: Arc::new(pipeline),
            },
            messenger,
        )
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("/news"),
            Some(("news".to_string(), String::new()))
        );
        assert_eq!(
            parse_command("  /NEWS@relay_bot  today please "),
            Some(("news".to_string(), "today please".to_string()))
        );
        assert_eq!(parse_command("news"), None);
        assert_eq!(parse_command("/"), None);
    }

    #[test]
    fn table_has_unique_names() {
        let mut names: Vec<_> = COMMANDS.iter().map(|c| c.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), COMMANDS.len());
        assert!(lookup("keywords").is_some());
        assert!(lookup("weather").is_none());
    }

    #[tokio::test]
    async fn help_replies_with_welcome() {
        let (ctx, messenger) = context();
        let dest = Destination::Chat(ChatId(7));

        let out = dispatch(&ctx, dest, "/Help").await;
        assert_eq!(out, Some(DeliveryOutcome::Sent));
        let texts = messenger.sent_texts();
        assert!(texts[0].starts_with("Welcome to the AI News Bot!"));
        assert!(texts[0].contains("/keywords"));
    }

    #[tokio::test]
    async fn unknown_commands_and_plain_text_are_ignored() {
        let (ctx, messenger) = context();
        let dest = Destination::Chat(ChatId(7));
        assert_eq!(dispatch(&ctx, dest.clone(), "/weather").await, None);
        assert_eq!(dispatch(&ctx, dest, "hello").await, None);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn lists_sources_and_keywords() {
        let (ctx, messenger) = context();
        let dest = Destination::Chat(ChatId(7));
        dispatch(&ctx, dest.clone(), "/sources").await;
        dispatch(&ctx, dest, "/keywords").await;

        let texts = messenger.sent_texts();
        assert!(texts[0].ends_with("Wired\nForbes"));
        assert!(texts[1].ends_with("machine learning"));
    }

    #[tokio::test]
    async fn news_acknowledges_then_sends_digest() {
        let (ctx, messenger) = context();
        let dest = Destination::Chat(ChatId(7));

        let out = dispatch(&ctx, dest, "/news@relay_bot").await;
        assert_eq!(out, Some(DeliveryOutcome::Sent));
        let texts = messenger.sent_texts();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0], "Fetching the latest AI news... Please wait.");
        assert!(texts[1].contains("Machine learning beats chess"));
    }
}
