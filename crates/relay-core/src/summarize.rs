//! Extractive summaries and reading-time estimates.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

const WORDS_PER_MINUTE: usize = 200;

/// Standard English stopword list.
const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his",
    "himself", "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself",
    "they", "them", "their", "theirs", "themselves", "what", "which", "who", "whom", "this",
    "that", "that'll", "these", "those", "am", "is", "are", "was", "were", "be", "been",
    "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an", "the",
    "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by", "for",
    "with", "about", "against", "between", "into", "through", "during", "before", "after",
    "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
    "again", "further", "then", "once", "here", "there", "when", "where", "why", "how", "all",
    "any", "both", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not",
    "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will", "just", "don",
    "don't", "should", "should've", "now", "d", "ll", "m", "o", "re", "ve", "y", "ain",
    "aren", "aren't", "couldn", "couldn't", "didn", "didn't", "doesn", "doesn't", "hadn",
    "hadn't", "hasn", "hasn't", "haven", "haven't", "isn", "isn't", "ma", "mightn",
    "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't", "shouldn",
    "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn", "wouldn't",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

fn sentence_end() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[.!?]+["'”’)\]]*\s+"#).expect("valid regex"))
}

/// Split text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for m in sentence_end().find_iter(text) {
        let end = m.start() + m.as_str().trim_end().len();
        push_sentence(&mut out, &text[start..end]);
        start = m.end();
    }
    push_sentence(&mut out, &text[start..]);
    out
}

fn push_sentence<'a>(out: &mut Vec<&'a str>, s: &'a str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s);
    }
}

/// Case-folded content tokens of a sentence (stopwords removed).
fn content_tokens(sentence: &str) -> impl Iterator<Item = String> + '_ {
    let stop = stopwords();
    sentence
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(move |w| !w.is_empty() && !stop.contains(w.as_str()))
}

/// Frequency-scored extractive summary of at most `max_sentences` sentences.
///
/// Selected sentences keep their original relative order. Ties in score are
/// won by the earlier sentence.
pub fn summarize(text: &str, max_sentences: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.len() <= max_sentences {
        return sentences.join(" ");
    }

    let mut freq: HashMap<String, usize> = HashMap::new();
    for s in &sentences {
        for tok in content_tokens(s) {
            *freq.entry(tok).or_default() += 1;
        }
    }

    let mut ranked: Vec<(usize, usize)> = sentences
        .iter()
        .enumerate()
        .map(|(idx, s)| {
            let score = content_tokens(s)
                .map(|t| freq.get(&t).copied().unwrap_or(0))
                .sum();
            (idx, score)
        })
        .collect();
    // Stable sort keeps original order among equal scores.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let mut picked: Vec<usize> = ranked
        .into_iter()
        .take(max_sentences)
        .map(|(idx, _)| idx)
        .collect();
    picked.sort_unstable();

    picked
        .into_iter()
        .map(|idx| sentences[idx])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Estimated reading time at 200 words per minute.
pub fn reading_time(content: &str) -> String {
    let cleaned: String = content.chars().filter(|c| *c != '<' && *c != '>').collect();
    let words = cleaned.split_whitespace().count();
    match words.div_ceil(WORDS_PER_MINUTE) {
        0 => "< 1 min".to_string(),
        1 => "1 min".to_string(),
        n => format!("{n} mins"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "Neural chips are getting faster. The weather was nice today. \
        Faster neural chips mean faster training for neural networks! \
        Some people like tea. Chips from three vendors compete on training speed.";

    #[test]
    fn empty_text_gives_empty_summary() {
        assert_eq!(summarize("", 2), "");
        assert_eq!(summarize("   \n ", 2), "");
    }

    #[test]
    fn single_sentence_is_returned_unmodified() {
        assert_eq!(
            summarize("Only one sentence here.", 2),
            "Only one sentence here."
        );
    }

    #[test]
    fn short_text_keeps_all_sentences_in_order() {
        assert_eq!(summarize("First one. Second one.", 3), "First one. Second one.");
    }

    #[test]
    fn picks_highest_scoring_sentences_in_original_order() {
        let s = summarize(ARTICLE, 2);
        assert_eq!(
            s,
            "Neural chips are getting faster. Faster neural chips mean faster training for neural networks!"
        );
    }

    #[test]
    fn summary_is_deterministic() {
        assert_eq!(summarize(ARTICLE, 2), summarize(ARTICLE, 2));
        assert_eq!(summarize(ARTICLE, 3), summarize(ARTICLE, 3));
    }

    #[test]
    fn ties_go_to_earlier_sentences() {
        let s = summarize("Alpha beta. Gamma delta. Epsilon zeta.", 1);
        assert_eq!(s, "Alpha beta.");
    }

    #[test]
    fn splits_on_terminal_punctuation_with_quotes() {
        let parts = split_sentences("He said \"stop.\" Then left? Yes!  Done");
        assert_eq!(parts, vec!["He said \"stop.\"", "Then left?", "Yes!", "Done"]);
    }

    #[test]
    fn reading_time_boundaries() {
        let words = |n: usize| vec!["word"; n].join(" ");
        assert_eq!(reading_time(""), "< 1 min");
        assert_eq!(reading_time(&words(200)), "1 min");
        assert_eq!(reading_time(&words(201)), "2 mins");
        assert_eq!(reading_time("<p> </p>"), "1 min");
    }
}
