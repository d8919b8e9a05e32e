use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use relay_core::{
    commands::CommandContext,
    config::{Config, RelayMode},
    cursor::{CursorStore, JsonFileCursorStore},
    delivery::DeliveryAgent,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    pipeline::{CycleMode, Pipeline},
    source::ContentSource,
};
use relay_sources::{NewsApiSource, NewsQuery, TwitterTimelineSource};
use relay_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay_core::logging::init("relay")?;

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    let telegram = TelegramMessenger::from_token(cfg.telegram_bot_token.clone());
    let bot = telegram.bot();
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        Arc::new(telegram),
        ThrottleConfig::default(),
    ));
    let agent = Arc::new(DeliveryAgent::new(messenger, cfg.delivery_policy()));

    let formatter = cfg.formatter().fit_to(&agent.messenger().capabilities());

    let store = JsonFileCursorStore::open(&cfg.cursor_file)
        .with_context(|| format!("opening cursor file {}", cfg.cursor_file.display()))?;
    info!(cursor_file = %store.path().display(), "cursor store opened");
    let cursors: Arc<dyn CursorStore> = Arc::new(store);

    let pipeline = Arc::new(Pipeline::new(
        build_source(&cfg)?,
        agent,
        cursors,
        formatter,
        cfg.filter_criteria(),
        cfg.channel.clone(),
        cfg.pipeline_settings(),
    ));

    if cfg.reset_cursor {
        pipeline.reset_cursor()?;
    }

    let cancel = CancellationToken::new();
    info!(mode = ?cfg.mode, "content relay starting");

    match cfg.mode {
        RelayMode::Forward => {
            spawn_ctrl_c(cancel.clone());
            pipeline.run(CycleMode::PerItem, cancel).await;
        }
        RelayMode::Digest => {
            let report = pipeline.run_cycle(CycleMode::Digest).await;
            if let Some(e) = report.fetch_error {
                warn!(error = %e, "digest not sent: fetch failed");
            }
            if let Some(outcome) = report.stopped_on {
                anyhow::bail!("digest delivery failed: {outcome}");
            }
        }
        RelayMode::Bot => {
            // With a channel configured, bot mode also posts scheduled digests.
            let scheduled = pipeline.destination().is_some().then(|| {
                let pipeline = pipeline.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { pipeline.run(CycleMode::Digest, cancel).await })
            });

            let ctx = Arc::new(CommandContext {
                pipeline: pipeline.clone(),
            });
            let result = relay_telegram::router::run_bot(bot, ctx).await;

            cancel.cancel();
            if let Some(handle) = scheduled {
                let _ = handle.await;
            }
            result?;
        }
    }

    info!("content relay stopped");
    Ok(())
}

fn build_source(cfg: &Config) -> anyhow::Result<Arc<dyn ContentSource>> {
    if let Some(tw) = &cfg.twitter {
        let source = TwitterTimelineSource::new(tw.bearer_token.clone(), &tw.account, tw.page_size)?;
        return Ok(Arc::new(source));
    }
    let news = cfg
        .news
        .as_ref()
        .context("no content source configured")?;
    let query = NewsQuery {
        keywords: cfg.keywords.clone(),
        language: news.language.clone(),
        lookback_days: news.lookback_days,
        sort_by: news.sort_by.clone(),
        page_size: news.page_size,
    };
    Ok(Arc::new(NewsApiSource::new(news.api_key.clone(), query)?))
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            cancel.cancel();
        }
    });
}
