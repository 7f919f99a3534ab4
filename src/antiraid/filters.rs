// src/antiraid/filters.rs
//! Proste filtry treści uruchamiane przed detekcją spamu: zakazane słowa i linki.
//! Trafienie = usunięcie wiadomości + tymczasowe ostrzeżenie, bez dotykania okna spamu.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use url::Url;

static RE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?ix)\b((https?://|www\.)[^\s<>()]+|discord\.gg/[A-Za-z0-9]+)"#).unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterHit {
    BannedWord,
    Link,
}

impl FilterHit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BannedWord => "banned word",
            Self::Link => "link",
        }
    }

    pub fn warning_text(&self, actor_id: u64) -> String {
        match self {
            Self::BannedWord => format!("<@{actor_id}>, please keep the language appropriate!"),
            Self::Link => format!("<@{actor_id}>, links are not allowed here."),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentFilters {
    default_words: Vec<String>,
    block_links: bool,
    allowed_domains: Vec<String>,
}

impl ContentFilters {
    pub fn new(default_words: &[String], block_links: bool, allowed_domains: &[String]) -> Self {
        Self {
            default_words: normalize_words(default_words),
            block_links,
            allowed_domains: allowed_domains
                .iter()
                .map(|d| d.trim().trim_start_matches("www.").to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// `guild_words` – już znormalizowane (patrz [`normalize`]).
    pub fn check(&self, content: &str, guild_words: &[String]) -> Option<FilterHit> {
        let norm = normalize(content);
        if contains_any(&norm, &self.default_words) || contains_any(&norm, guild_words) {
            return Some(FilterHit::BannedWord);
        }
        if self.block_links && self.contains_blocked_link(content) {
            return Some(FilterHit::Link);
        }
        None
    }

    fn contains_blocked_link(&self, content: &str) -> bool {
        RE_LINK.find_iter(content).any(|m| {
            let raw = m.as_str();
            let candidate = if raw.to_lowercase().starts_with("http") {
                raw.to_string()
            } else {
                format!("https://{raw}")
            };
            let host = Url::parse(&candidate)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()));
            match host {
                Some(h) => !self
                    .allowed_domains
                    .iter()
                    .any(|d| h == *d || h.ends_with(&format!(".{d}"))),
                None => true,
            }
        })
    }
}

/// NFKC + lowercase – „ｓｐａｍ” i „SPAM” trafiają w to samo słowo.
pub fn normalize(s: &str) -> String {
    s.nfkc().collect::<String>().to_lowercase()
}

pub fn normalize_words(words: &[String]) -> Vec<String> {
    let mut out: Vec<String> = words
        .iter()
        .map(|w| normalize(w.trim()))
        .filter(|w| !w.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn contains_any(haystack: &str, words: &[String]) -> bool {
    words.iter().any(|w| !w.is_empty() && haystack.contains(w.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> ContentFilters {
        ContentFilters::new(&["insult".into()], true, &["example.org".into()])
    }

    #[test]
    fn banned_words_match_case_and_width_insensitively() {
        let f = filters();
        assert_eq!(f.check("what an INSULT", &[]), Some(FilterHit::BannedWord));
        assert_eq!(f.check("ｉｎｓｕｌｔ", &[]), Some(FilterHit::BannedWord));
        assert_eq!(f.check("nice weather", &normalize_words(&["Weather".into()])), Some(FilterHit::BannedWord));
        assert_eq!(f.check("nice weather", &[]), None);
    }

    #[test]
    fn links_are_blocked_except_allowed_domains() {
        let f = filters();
        assert_eq!(f.check("join discord.gg/abc123", &[]), Some(FilterHit::Link));
        assert_eq!(f.check("see https://spam.example.com/x", &[]), Some(FilterHit::Link));
        assert_eq!(f.check("docs at https://docs.example.org/page", &[]), None);
        assert_eq!(f.check("www.example.org", &[]), None);
    }

    #[test]
    fn link_blocking_can_be_disabled() {
        let f = ContentFilters::new(&[], false, &[]);
        assert_eq!(f.check("https://anything.test", &[]), None);
    }

    #[test]
    fn normalize_words_dedups_and_drops_blanks() {
        assert_eq!(
            normalize_words(&["Spam".into(), " spam ".into(), "".into()]),
            vec!["spam".to_string()]
        );
    }
}
