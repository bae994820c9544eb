// src/ingest/adapters/wwr_rss.rs
//! WeWorkRemotely category feeds. RSS with CDATA titles in the form
//! "Company: Job Title" and RFC2822 pubDate stamps.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::types::{FetchContext, FetchOutcome, Posting, SourceAdapter};
use crate::ingest::{matches_keywords, normalize_text};

pub const DEFAULT_FEEDS: &[&str] = &[
    "https://weworkremotely.com/categories/remote-programming-jobs.rss",
    "https://weworkremotely.com/categories/remote-data-jobs.rss",
];

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
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// "Company: Job Title" -> (company, title); titles without the separator
/// keep the whole string and an unknown company.
fn split_title(raw: &str) -> (String, String) {
    match raw.split_once(':') {
        Some((company, title)) if !title.trim().is_empty() => {
            (company.trim().to_string(), title.trim().to_string())
        }
        _ => ("Unknown".to_string(), raw.trim().to_string()),
    }
}

enum Mode {
    Fixture(Vec<String>),
    Http {
        feeds: Vec<String>,
        client: reqwest::Client,
    },
}

pub struct WwrRssAdapter {
    mode: Mode,
}

impl WwrRssAdapter {
    pub fn from_fixtures<S: AsRef<str>>(feeds: &[S]) -> Self {
        Self {
            mode: Mode::Fixture(feeds.iter().map(|s| s.as_ref().to_string()).collect()),
        }
    }

    pub fn from_urls<S: AsRef<str>>(feeds: &[S]) -> Self {
        Self {
            mode: Mode::Http {
                feeds: feeds.iter().map(|s| s.as_ref().to_string()).collect(),
                client: reqwest::Client::new(),
            },
        }
    }

    pub fn default_feeds() -> Self {
        Self::from_urls(DEFAULT_FEEDS)
    }

    fn parse_feed(xml: &str, keywords: &[String]) -> Result<Vec<Posting>> {
        let rss: Rss = from_str(xml).context("parsing wwr rss xml")?;
        let fetched_at = Utc::now();

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let Some(raw_title) = it.title.as_deref() else {
                continue;
            };
            if !matches_keywords(raw_title, keywords) {
                continue;
            }
            let (company, title) = split_title(raw_title);
            out.push(Posting {
                source_id: "wwr_rss".to_string(),
                external_ref: it.link.clone(),
                title,
                company,
                location_raw: "Remote".to_string(),
                description: normalize_text(it.description.as_deref().unwrap_or_default()),
                posted_at: it.pub_date.as_deref().and_then(parse_rfc2822),
                url: it.link.unwrap_or_default(),
                fetched_at,
            });
        }
        Ok(out)
    }

    fn aggregate(bodies: Vec<Result<String>>, keywords: &[String]) -> (Vec<Posting>, FetchOutcome) {
        let total = bodies.len();
        let mut postings = Vec::new();
        let mut errors = Vec::new();

        for body in bodies {
            match body.and_then(|xml| Self::parse_feed(&xml, keywords)) {
                Ok(mut v) => postings.append(&mut v),
                Err(e) => errors.push(format!("{e:#}")),
            }
        }

        let outcome = if errors.is_empty() {
            FetchOutcome::Success
        } else if errors.len() == total {
            FetchOutcome::Failure(errors.remove(0))
        } else {
            FetchOutcome::PartialSuccess(format!("{}/{} feeds failed", errors.len(), total))
        };
        (postings, outcome)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for WwrRssAdapter {
    async fn fetch(&self, ctx: &FetchContext) -> (Vec<Posting>, FetchOutcome) {
        match &self.mode {
            Mode::Fixture(feeds) => {
                let bodies = feeds.iter().map(|s| Ok(s.clone())).collect();
                Self::aggregate(bodies, &ctx.keywords)
            }
            Mode::Http { feeds, client } => {
                let mut bodies = Vec::with_capacity(feeds.len());
                for url in feeds {
                    let body = match client.get(url).send().await {
                        Ok(resp) => match resp.error_for_status() {
                            Ok(resp) => resp.text().await.context("wwr rss body"),
                            Err(e) => Err(e).context("wwr rss status"),
                        },
                        Err(e) => Err(e).context("wwr rss get"),
                    };
                    bodies.push(body);
                }
                Self::aggregate(bodies, &ctx.keywords)
            }
        }
    }

    fn id(&self) -> &'static str {
        "wwr_rss"
    }
}
