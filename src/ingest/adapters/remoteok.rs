// src/ingest/adapters/remoteok.rs
//! RemoteOK JSON board. The API returns one array whose first element is a
//! legal notice, so rows are decoded individually and non-job rows skipped.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ingest::types::{FetchContext, FetchOutcome, Posting, SourceAdapter};
use crate::ingest::{matches_keywords, normalize_text};

pub const API_URL: &str = "https://remoteok.com/api";

#[derive(Debug, Deserialize)]
struct RemoteOkRow {
    #[serde(default)]
    id: Option<serde_json::Value>,
    position: String,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    epoch: Option<i64>,
}

fn id_to_ref(id: &Option<serde_json::Value>) -> Option<String> {
    match id {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

pub struct RemoteOkAdapter {
    mode: Mode,
}

impl RemoteOkAdapter {
    pub fn from_fixture(json: &str) -> Self {
        Self {
            mode: Mode::Fixture(json.to_string()),
        }
    }

    pub fn from_api() -> Self {
        Self {
            mode: Mode::Http {
                url: API_URL.to_string(),
                client: reqwest::Client::new(),
            },
        }
    }

    fn parse_rows(body: &str, keywords: &[String]) -> Result<Vec<Posting>> {
        let rows: Vec<serde_json::Value> =
            serde_json::from_str(body).context("parsing remoteok json")?;
        let fetched_at = Utc::now();

        let mut out = Vec::new();
        for row in rows {
            // The leading legal-notice row has no "position" and fails here.
            let Ok(job) = serde_json::from_value::<RemoteOkRow>(row) else {
                continue;
            };
            let haystack = format!(
                "{} {} {}",
                job.position,
                job.description.as_deref().unwrap_or_default(),
                job.tags.join(" ")
            );
            if !matches_keywords(&haystack, keywords) {
                continue;
            }
            out.push(Posting {
                source_id: "remoteok".to_string(),
                external_ref: id_to_ref(&job.id),
                title: job.position,
                company: job.company.unwrap_or_else(|| "Unknown".to_string()),
                location_raw: job.location.unwrap_or_else(|| "Remote".to_string()),
                description: normalize_text(job.description.as_deref().unwrap_or_default()),
                posted_at: job.epoch.and_then(|e| DateTime::from_timestamp(e, 0)),
                url: job.url.unwrap_or_default(),
                fetched_at,
            });
        }
        Ok(out)
    }

    fn to_outcome(parsed: Result<Vec<Posting>>) -> (Vec<Posting>, FetchOutcome) {
        match parsed {
            Ok(postings) => (postings, FetchOutcome::Success),
            Err(e) => (Vec::new(), FetchOutcome::Failure(format!("{e:#}"))),
        }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for RemoteOkAdapter {
    async fn fetch(&self, ctx: &FetchContext) -> (Vec<Posting>, FetchOutcome) {
        match &self.mode {
            Mode::Fixture(body) => Self::to_outcome(Self::parse_rows(body, &ctx.keywords)),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .header("User-Agent", "jobwatch/0.1")
                    .send()
                    .await
                    .context("remoteok get")
                    .and_then(|r| r.error_for_status().context("remoteok status"));
                match body {
                    Ok(resp) => match resp.text().await {
                        Ok(text) => Self::to_outcome(Self::parse_rows(&text, &ctx.keywords)),
                        Err(e) => (Vec::new(), FetchOutcome::Failure(format!("remoteok body: {e}"))),
                    },
                    Err(e) => (Vec::new(), FetchOutcome::Failure(format!("{e:#}"))),
                }
            }
        }
    }

    fn id(&self) -> &'static str {
        "remoteok"
    }
}
