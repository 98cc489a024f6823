// src/ingest/providers/coindesk_rss.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use reqwest::StatusCode;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::error::{PipelineError, PipelineResult};
use crate::ingest::http::{UpstreamClient, BROWSER_UA};
use crate::ingest::types::{Headline, NewsQuery, SourceAdapter};
use crate::ingest::{normalize_text, truncate_summary};

const OUTLET: &str = "CoinDesk";
const SUMMARY_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let odt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(odt.unix_timestamp(), 0)
}

/// CoinDesk headlines from the public RSS feed. The fixture mode serves a
/// stored document, so the parser can be exercised without network.
pub struct CoinDeskRssAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: UpstreamClient },
}

impl CoinDeskRssAdapter {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_url(url: impl Into<String>, client: UpstreamClient) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    /// A document without an RSS channel is a `ParseError`; a single broken
    /// item is skipped with a warning.
    fn parse_items_from_str(s: &str, query: &NewsQuery) -> PipelineResult<Vec<Headline>> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)
            .map_err(|e| PipelineError::ParseError(format!("coindesk rss: {e}")))?;

        let mut out = Vec::with_capacity(query.limit);
        for (idx, it) in rss.channel.item.into_iter().enumerate() {
            let title = it.title.as_deref().map(normalize_text).unwrap_or_default();
            let url = it.link.as_deref().map(str::trim).unwrap_or_default().to_string();
            if title.is_empty() || url.is_empty() {
                tracing::warn!(target: "ingest", provider = OUTLET, item = idx, "skipping rss item without title/link");
                continue;
            }
            let summary = it
                .description
                .as_deref()
                .map(normalize_text)
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "No description".to_string());

            if let Some(cat) = &query.category {
                let hay = format!("{} {}", title, summary).to_lowercase();
                if !hay.contains(cat.as_str()) {
                    continue;
                }
            }

            out.push(Headline {
                title,
                url,
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
                summary: truncate_summary(&summary, SUMMARY_CHARS),
                outlet: OUTLET.to_string(),
            });
            if out.len() >= query.limit {
                break;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for CoinDeskRssAdapter {
    type Query = NewsQuery;
    type Raw = Vec<Headline>;

    async fn fetch(&self, query: &NewsQuery) -> PipelineResult<Vec<Headline>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s, query),
            Mode::Http { url, client } => {
                let rsp = client.get(url, &[], BROWSER_UA).await?;
                if rsp.status == StatusCode::NOT_FOUND {
                    return Err(PipelineError::ParseError(format!("feed {url} is gone (404)")));
                }
                if !rsp.status.is_success() {
                    return Err(PipelineError::UpstreamFormatError(format!(
                        "coindesk answered {}",
                        rsp.status
                    )));
                }
                Self::parse_items_from_str(&rsp.body, query)
            }
        }
    }

    fn name(&self) -> &'static str {
        "coindesk"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
