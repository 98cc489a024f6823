// src/ingest/mod.rs
pub mod http;
pub mod providers;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;

pub use types::{
    CryptoQuery, CryptoQuote, DynCryptoAdapter, DynNewsAdapter, DynWeatherAdapter, Headline,
    NewsQuery, RawResult, SourceAdapter, WeatherQuery, WeatherReport,
};

const MAX_TEXT_CHARS: usize = 1500;

/// Normalize scraped text: decode entities, strip tags, ASCII quotes,
/// collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// First `max` chars, with "..." appended when something was cut.
pub fn truncate_summary(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("...");
        out
    } else {
        s.to_string()
    }
}
