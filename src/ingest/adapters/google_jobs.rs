// src/ingest/adapters/google_jobs.rs
//! Google Jobs via SerpAPI. The only metered source in the default set:
//! every call is reserved against the monthly budget before the coordinator
//! invokes it, so a spent budget turns into a planned skip upstream.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;

use crate::ingest::normalize_text;
use crate::ingest::types::{FetchContext, FetchOutcome, Posting, SourceAdapter};

pub const ADAPTER_ID: &str = "google_jobs";
const SEARCH_URL: &str = "https://serpapi.com/search.json";

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    jobs_results: Vec<SerpJob>,
}

#[derive(Debug, Deserialize)]
struct SerpJob {
    title: String,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    share_link: Option<String>,
    #[serde(default)]
    apply_options: Vec<ApplyOption>,
}

#[derive(Debug, Deserialize)]
struct ApplyOption {
    #[serde(default)]
    link: Option<String>,
}

enum Mode {
    Fixture(String),
    Http {
        api_key: String,
        client: reqwest::Client,
    },
}

pub struct GoogleJobsAdapter {
    mode: Mode,
    geo: String,
}

impl GoogleJobsAdapter {
    pub fn from_fixture(json: &str) -> Self {
        Self {
            mode: Mode::Fixture(json.to_string()),
            geo: "India".to_string(),
        }
    }

    /// Reads `SERPAPI_KEY`; callers should only register the adapter when
    /// the key is present.
    pub fn from_env(geo: &str) -> Self {
        Self {
            mode: Mode::Http {
                api_key: std::env::var("SERPAPI_KEY").unwrap_or_default(),
                client: reqwest::Client::new(),
            },
            geo: geo.to_string(),
        }
    }

    fn parse_results(body: &str) -> Result<Vec<Posting>> {
        let resp: SerpResponse = serde_json::from_str(body).context("parsing serpapi json")?;
        let fetched_at = Utc::now();

        let mut out = Vec::with_capacity(resp.jobs_results.len());
        for job in resp.jobs_results {
            let url = job
                .apply_options
                .iter()
                .find_map(|o| o.link.clone())
                .or_else(|| job.share_link.clone())
                .unwrap_or_default();
            out.push(Posting {
                source_id: ADAPTER_ID.to_string(),
                external_ref: job.job_id.or_else(|| job.share_link.clone()),
                title: job.title,
                company: job.company_name.unwrap_or_else(|| "Unknown".to_string()),
                location_raw: job.location.unwrap_or_default(),
                description: normalize_text(job.description.as_deref().unwrap_or_default()),
                // SerpAPI only exposes relative text like "3 hours ago".
                posted_at: None,
                url,
                fetched_at,
            });
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for GoogleJobsAdapter {
    async fn fetch(&self, ctx: &FetchContext) -> (Vec<Posting>, FetchOutcome) {
        match &self.mode {
            Mode::Fixture(body) => match Self::parse_results(body) {
                Ok(postings) => (postings, FetchOutcome::Success),
                Err(e) => (Vec::new(), FetchOutcome::Failure(format!("{e:#}"))),
            },
            Mode::Http { api_key, client } => {
                if api_key.is_empty() {
                    return (
                        Vec::new(),
                        FetchOutcome::Skipped("SERPAPI_KEY not set".to_string()),
                    );
                }
                // One query per run keeps the spend at one unit per cycle.
                let keyword = ctx
                    .keywords
                    .first()
                    .map(String::as_str)
                    .unwrap_or("data analyst");
                let query = format!("{keyword} jobs posted within last 24 hours");
                let req = client.get(SEARCH_URL).query(&[
                    ("engine", "google_jobs"),
                    ("q", query.as_str()),
                    ("location", self.geo.as_str()),
                    ("hl", "en"),
                    ("api_key", api_key.as_str()),
                ]);
                let body = match req.send().await {
                    Ok(resp) => match resp.error_for_status() {
                        Ok(resp) => resp.text().await,
                        Err(e) => {
                            return (Vec::new(), FetchOutcome::Failure(format!("serpapi status: {e}")))
                        }
                    },
                    Err(e) => {
                        return (Vec::new(), FetchOutcome::Failure(format!("serpapi get: {e}")))
                    }
                };
                match body {
                    Ok(text) => match Self::parse_results(&text) {
                        Ok(postings) => (postings, FetchOutcome::Success),
                        Err(e) => (Vec::new(), FetchOutcome::Failure(format!("{e:#}"))),
                    },
                    Err(e) => (Vec::new(), FetchOutcome::Failure(format!("serpapi body: {e}"))),
                }
            }
        }
    }

    fn id(&self) -> &'static str {
        ADAPTER_ID
    }

    fn metered_cost(&self) -> Option<u32> {
        Some(1)
    }
}
