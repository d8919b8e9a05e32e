//! Message rendering: single items, digests, and plain notices.

use std::str::FromStr;

use crate::{
    domain::{Destination, Item, MediaRef},
    errors::Error,
    messaging::types::MessagingCapabilities,
    summarize::{reading_time, summarize},
};

/// Markup dialect selected once per deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MarkupMode {
    Plain,
    #[default]
    Html,
    Markdown,
}

impl FromStr for MarkupMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plain" | "text" | "" => Ok(MarkupMode::Plain),
            "html" => Ok(MarkupMode::Html),
            "markdown" | "md" => Ok(MarkupMode::Markdown),
            other => Err(Error::Config(format!("unknown markup mode: {other}"))),
        }
    }
}

impl MarkupMode {
    pub fn escape(self, text: &str) -> String {
        match self {
            MarkupMode::Plain => text.to_string(),
            MarkupMode::Html => escape_html(text),
            MarkupMode::Markdown => escape_markdown(text),
        }
    }

    /// Legacy Markdown cannot escape inside an entity, so text carrying its
    /// specials is emitted unstyled.
    pub fn bold(self, text: &str) -> String {
        match self {
            MarkupMode::Plain => text.to_string(),
            MarkupMode::Html => format!("<b>{}</b>", escape_html(text)),
            MarkupMode::Markdown if text.contains(is_markdown_special) => escape_markdown(text),
            MarkupMode::Markdown => format!("*{text}*"),
        }
    }
}

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape the specials of Telegram's legacy Markdown mode.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if is_markdown_special(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn is_markdown_special(c: char) -> bool {
    matches!(c, '_' | '*' | '`' | '[')
}

/// A destination-ready message. Recreated per delivery attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    pub destination: Destination,
    pub text: String,
    /// Text to use if the media attachment cannot be delivered.
    pub fallback_text: Option<String>,
    pub media: Option<MediaRef>,
    pub markup: MarkupMode,
}

#[derive(Clone, Copy, Debug)]
pub struct MessageLimits {
    pub max_text_len: usize,
    pub max_caption_len: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            max_text_len: 4096,
            max_caption_len: 1024,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DigestSettings {
    pub topic: String,
    pub max_items: usize,
    pub summary_sentences: usize,
    pub summary_char_cap: usize,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            topic: "AI".to_string(),
            max_items: 5,
            summary_sentences: 2,
            summary_char_cap: 200,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Formatter {
    pub markup: MarkupMode,
    pub limits: MessageLimits,
    pub digest: DigestSettings,
}

impl Formatter {
    pub fn new(markup: MarkupMode, limits: MessageLimits, digest: DigestSettings) -> Self {
        Self {
            markup,
            limits,
            digest,
        }
    }

    /// Narrow markup and limits to what the messenger can carry.
    pub fn fit_to(mut self, caps: &MessagingCapabilities) -> Self {
        let supported = match self.markup {
            MarkupMode::Plain => true,
            MarkupMode::Html => caps.supports_html,
            MarkupMode::Markdown => caps.supports_markdown,
        };
        if !supported {
            self.markup = MarkupMode::Plain;
        }
        self.limits.max_text_len = self.limits.max_text_len.min(caps.max_message_len);
        self.limits.max_caption_len = self.limits.max_caption_len.min(caps.max_caption_len);
        self
    }

    /// One message per item.
    ///
    /// Only the first photo is attached; any further media references are
    /// dropped. With a photo the text becomes the caption and is held to the
    /// caption limit.
    pub fn format_single(&self, item: &Item, destination: &Destination) -> OutboundMessage {
        let header = format!("New post from @{}:", item.source_name);
        let media = item.first_photo().cloned();

        let render = |body: &str, with_link: bool| {
            let mut text = format!(
                "{}\n\n{}",
                self.markup.escape(&header),
                self.markup.escape(body)
            );
            if with_link && !item.url.is_empty() {
                text.push_str("\n\n");
                text.push_str(&self.markup.escape(&item.url));
            }
            text
        };

        let full_text = fit_text(&item.body, self.limits.max_text_len, |b| render(b, true));
        match media {
            Some(photo) => OutboundMessage {
                destination: destination.clone(),
                text: fit_text(&item.body, self.limits.max_caption_len, |b| render(b, false)),
                fallback_text: Some(full_text),
                media: Some(photo),
                markup: self.markup,
            },
            None => OutboundMessage {
                destination: destination.clone(),
                text: full_text,
                fallback_text: None,
                media: None,
                markup: self.markup,
            },
        }
    }

    /// One message summarizing up to `max_items` items, in the given order.
    ///
    /// When the rendered digest exceeds the message limit, summaries shrink
    /// first; whole entries are never dropped to make room.
    pub fn format_digest(&self, items: &[Item], destination: &Destination) -> OutboundMessage {
        let topic = &self.digest.topic;
        if items.is_empty() {
            return self.notice(
                &format!("No relevant {topic} news found at the moment."),
                destination,
            );
        }

        let items = &items[..items.len().min(self.digest.max_items)];
        let summaries: Vec<String> = items
            .iter()
            .map(|it| summarize(&it.body, self.digest.summary_sentences))
            .collect();

        let cap = self.digest.summary_char_cap;
        let mut caps: Vec<usize> = [cap, cap * 3 / 4, cap / 2, cap / 4, 0]
            .into_iter()
            .filter(|c| *c <= cap)
            .collect();
        caps.dedup();

        let mut text = String::new();
        for c in caps {
            text = self.render_digest(items, &summaries, c);
            if text.chars().count() <= self.limits.max_text_len {
                break;
            }
        }

        OutboundMessage {
            destination: destination.clone(),
            text: truncate_chars(&text, self.limits.max_text_len),
            fallback_text: None,
            media: None,
            markup: self.markup,
        }
    }

    /// Plain user/operator notice, escaped for the deployment's markup.
    pub fn notice(&self, text: &str, destination: &Destination) -> OutboundMessage {
        OutboundMessage {
            destination: destination.clone(),
            text: truncate_chars(&self.markup.escape(text), self.limits.max_text_len),
            fallback_text: None,
            media: None,
            markup: self.markup,
        }
    }

    fn render_digest(&self, items: &[Item], summaries: &[String], summary_cap: usize) -> String {
        let m = self.markup;
        let topic = &self.digest.topic;
        let lead = emoji_for(topic);
        let trail = emoji_for(items[0].title.as_deref().unwrap_or(&items[0].body));

        let mut out = format!(
            "{lead} {} {trail}\n\n",
            m.bold(&format!("{topic} News Roundup"))
        );
        out.push_str(&m.escape(&format!("Today's top {topic} stories:")));
        out.push_str("\n\n");

        for (idx, (item, summary)) in items.iter().zip(summaries).enumerate() {
            let title = item.title.as_deref().unwrap_or("(untitled)");
            out.push_str(&format!("{}. {}\n", idx + 1, m.bold(title)));
            out.push_str(&m.escape(&format!("Source: {}", item.source_name)));
            out.push('\n');
            if summary_cap > 0 && !summary.is_empty() {
                let short = truncate_chars(summary, summary_cap);
                out.push_str(&m.escape(&format!("Summary: {short}...")));
                out.push('\n');
            }
            out.push_str(&m.escape(&format!("Reading time: {}", reading_time(&item.body))));
            out.push('\n');
            out.push_str(&m.escape(&format!("Link: {}", item.url)));
            out.push_str("\n\n");
        }

        out.trim_end().to_string()
    }
}

/// Shrink `body` until `render(body)` fits in `limit` chars.
fn fit_text(body: &str, limit: usize, render: impl Fn(&str) -> String) -> String {
    let full = render(body);
    let full_len = full.chars().count();
    if full_len <= limit {
        return full;
    }

    let mut keep = body.chars().count().saturating_sub(full_len - limit + 1);
    loop {
        let candidate = render(&format!("{}…", truncate_chars(body, keep)));
        let len = candidate.chars().count();
        if len <= limit {
            return candidate;
        }
        if keep == 0 {
            return truncate_chars(&candidate, limit);
        }
        keep = keep.saturating_sub((len - limit).max(1));
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Decorative emoji for a piece of text.
///
/// Keyword table first, then a stable hash into the fallback set, so the same
/// text always gets the same emoji.
pub fn emoji_for(text: &str) -> &'static str {
    const KEYWORDS: &[(&str, &str)] = &[
        ("robot", "🤖"),
        ("brain", "🧠"),
        ("neural", "🧠"),
        ("research", "🔬"),
        ("launch", "🚀"),
        ("chip", "💻"),
        ("data", "📊"),
        ("vision", "🔮"),
        ("web", "🌐"),
        ("idea", "💡"),
    ];
    const FALLBACK: &[&str] = &["🤖", "🧠", "💡", "🔬", "🚀", "💻", "🔮", "🎛️", "🌐", "📊"];

    let lower = text.to_lowercase();
    for (k, v) in KEYWORDS {
        if lower.contains(k) {
            return v;
        }
    }

    // FNV-1a
    let mut hash: u32 = 0x811c_9dc5;
    for b in lower.bytes() {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    FALLBACK[hash as usize % FALLBACK.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, ItemId, MediaKind};

    fn dest() -> Destination {
        Destination::Chat(ChatId(42))
    }

    fn tweet(body: &str, media: Vec<MediaRef>) -> Item {
        Item {
            id: ItemId(1),
            title: None,
            body: body.to_string(),
            source_name: "rustlang".to_string(),
            url: "https://x.com/rustlang/status/1".to_string(),
            media,
            published_at: None,
        }
    }

    fn article(n: usize, body: &str) -> Item {
        Item {
            id: ItemId(n as u64),
            title: Some(format!("AI story <{n}>")),
            body: body.to_string(),
            source_name: "Wired".to_string(),
            url: format!("https://example.com/{n}"),
            media: Vec::new(),
            published_at: None,
        }
    }

    fn formatter(markup: MarkupMode) -> Formatter {
        Formatter::new(markup, MessageLimits::default(), DigestSettings::default())
    }

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn escapes_legacy_markdown() {
        assert_eq!(escape_markdown("a_b*c`d[e]"), "a\\_b\\*c\\`d\\[e]");
    }

    #[test]
    fn markdown_bold_drops_styling_around_specials() {
        let m = MarkupMode::Markdown;
        assert_eq!(m.bold("AI weekly"), "*AI weekly*");
        assert_eq!(m.bold("AI in snake_case code"), "AI in snake\\_case code");
        assert_eq!(MarkupMode::Html.bold("a_b"), "<b>a_b</b>");
    }

    fn caps(html: bool, markdown: bool, text: usize, caption: usize) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: html,
            supports_markdown: markdown,
            supports_photos: true,
            supports_membership_check: false,
            max_message_len: text,
            max_caption_len: caption,
        }
    }

    #[test]
    fn fit_to_narrows_limits_and_markup() {
        let f = formatter(MarkupMode::Html).fit_to(&caps(false, true, 2000, 5000));
        assert_eq!(f.markup, MarkupMode::Plain);
        assert_eq!(f.limits.max_text_len, 2000);
        assert_eq!(f.limits.max_caption_len, 1024);
        let msg = f.format_single(&tweet(&"word ".repeat(1000), vec![]), &dest());
        assert!(msg.text.chars().count() <= 2000);

        let f = formatter(MarkupMode::Markdown).fit_to(&caps(false, true, 9000, 200));
        assert_eq!(f.markup, MarkupMode::Markdown);
        assert_eq!(f.limits.max_text_len, 4096);
        assert_eq!(f.limits.max_caption_len, 200);
    }

    #[test]
    fn single_without_media_is_text_with_link() {
        let msg = formatter(MarkupMode::Plain).format_single(&tweet("hello world", vec![]), &dest());
        assert_eq!(
            msg.text,
            "New post from @rustlang:\n\nhello world\n\nhttps://x.com/rustlang/status/1"
        );
        assert!(msg.media.is_none());
    }

    #[test]
    fn single_attaches_only_first_photo() {
        let media = vec![
            MediaRef {
                kind: MediaKind::Other,
                location: "clip.mp4".into(),
            },
            MediaRef::photo("one.jpg"),
            MediaRef::photo("two.jpg"),
        ];
        let msg = formatter(MarkupMode::Html).format_single(&tweet("pics", media), &dest());
        assert_eq!(msg.media, Some(MediaRef::photo("one.jpg")));
        assert_eq!(msg.text, "New post from @rustlang:\n\npics");
        assert!(msg.fallback_text.unwrap().ends_with("status/1"));
    }

    #[test]
    fn caption_respects_caption_limit() {
        let body = "x".repeat(3000);
        let msg = formatter(MarkupMode::Plain)
            .format_single(&tweet(&body, vec![MediaRef::photo("p.jpg")]), &dest());
        assert!(msg.text.chars().count() <= 1024);
        assert!(msg.text.ends_with('…'));
        assert!(msg.fallback_text.unwrap().chars().count() <= 4096);
    }

    #[test]
    fn digest_caps_entries_and_renders_fields() {
        let items: Vec<Item> = (1..=7)
            .map(|n| article(n, "Chips are fast. Chips are cheap. Tea is hot."))
            .collect();
        let msg = formatter(MarkupMode::Html).format_digest(&items, &dest());
        assert!(msg.text.contains("<b>AI News Roundup</b>"));
        assert!(msg.text.contains("Today's top AI stories:"));
        assert!(msg.text.contains("5. <b>AI story &lt;5&gt;</b>"));
        assert!(!msg.text.contains("6. "));
        assert!(msg.text.contains("Source: Wired"));
        assert!(msg.text.contains("Summary: Chips are fast. Chips are cheap...."));
        assert!(msg.text.contains("Reading time: 1 min"));
        assert!(msg.text.contains("Link: https://example.com/1"));
    }

    #[test]
    fn digest_summary_has_hard_char_cap() {
        let long = format!("{}.", "word ".repeat(100));
        let msg = formatter(MarkupMode::Plain).format_digest(&[article(1, &long)], &dest());
        let line = msg
            .text
            .lines()
            .find(|l| l.starts_with("Summary: "))
            .unwrap();
        assert_eq!(line.chars().count(), "Summary: ".len() + 200 + 3);
    }

    #[test]
    fn digest_shrinks_summaries_before_dropping_entries() {
        let body = format!("{}.", "lengthy ".repeat(60));
        let items: Vec<Item> = (1..=5).map(|n| article(n, &body)).collect();
        let f = Formatter::new(
            MarkupMode::Plain,
            MessageLimits {
                max_text_len: 900,
                max_caption_len: 1024,
            },
            DigestSettings::default(),
        );
        let msg = f.format_digest(&items, &dest());
        assert!(msg.text.chars().count() <= 900);
        for n in 1..=5 {
            assert!(msg.text.contains(&format!("Link: https://example.com/{n}")));
        }
    }

    #[test]
    fn empty_digest_is_a_notice() {
        let msg = formatter(MarkupMode::Plain).format_digest(&[], &dest());
        assert_eq!(msg.text, "No relevant AI news found at the moment.");
    }

    #[test]
    fn emoji_is_deterministic() {
        assert_eq!(emoji_for("New robot arm"), "🤖");
        assert_eq!(emoji_for("Quarterly earnings"), emoji_for("Quarterly earnings"));
    }
}
