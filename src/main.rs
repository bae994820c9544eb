//! Job Watchdog — Binary Entrypoint
//! Loads configuration, opens the persisted stores, assembles adapters,
//! filters and the notifier, and runs one pipeline invocation. Recurring
//! scheduling is an external concern (cron or similar).

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobwatch::config::WatchdogConfig;
use jobwatch::filters::{
    ExperienceFilter, FilterChain, FilterLayer, LlmExperienceFilter, LocationFilter,
    SimilarityFilter, TitleFilter,
};
use jobwatch::filters::llm::GroqClient;
use jobwatch::ingest::adapters::{GoogleJobsAdapter, RemoteOkAdapter, WwrRssAdapter};
use jobwatch::ingest::types::DynAdapter;
use jobwatch::matching::{LexicalScorer, MatchingEngine};
use jobwatch::notify::TelegramNotifier;
use jobwatch::orchestrator::{self, RunDeps};
use jobwatch::quota::QuotaGovernor;
use jobwatch::registry::JobRegistry;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobwatch=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn build_adapters(cfg: &WatchdogConfig) -> Vec<DynAdapter> {
    let mut adapters: Vec<DynAdapter> = vec![
        Arc::new(RemoteOkAdapter::from_api()),
        Arc::new(WwrRssAdapter::default_feeds()),
    ];
    if std::env::var("SERPAPI_KEY").map(|k| !k.is_empty()).unwrap_or(false) {
        if cfg.quota.contains_key("google_jobs") {
            adapters.push(Arc::new(GoogleJobsAdapter::from_env("India")));
            tracing::info!("google jobs adapter enabled (SERPAPI_KEY set)");
        } else {
            tracing::warn!("SERPAPI_KEY set but no [quota] budget for google_jobs; adapter disabled");
        }
    }
    adapters
}

fn build_chain(cfg: &WatchdogConfig) -> FilterChain {
    let mut layers: Vec<Box<dyn FilterLayer>> = vec![
        Box::new(LocationFilter::new(&cfg.filters.allowed_locations)),
        Box::new(TitleFilter::new(&cfg.filters.excluded_titles)),
        Box::new(SimilarityFilter::new(cfg.matching.min_match_score)),
        Box::new(ExperienceFilter::new(cfg.filters.max_experience_years)),
    ];
    if cfg.filters.llm_enabled {
        layers.push(Box::new(LlmExperienceFilter::new(
            Arc::new(GroqClient::from_env()),
            cfg.filters.max_experience_years,
        )));
    }
    FilterChain::new(layers)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op elsewhere.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = WatchdogConfig::load()?;

    let mut registry = JobRegistry::open(&cfg.storage.state_dir)?;
    let mut quota = QuotaGovernor::open(&cfg.storage.state_dir, cfg.quota.clone())?;

    let adapters = build_adapters(&cfg);
    let engine = MatchingEngine::new(cfg.profiles.clone(), Box::new(LexicalScorer));
    let chain = build_chain(&cfg);
    let notifier = TelegramNotifier::from_env();
    if !notifier.is_configured() {
        tracing::warn!("Telegram not configured; alerts will only be logged");
    }

    let deps = RunDeps {
        adapters: &adapters,
        engine: &engine,
        chain: &chain,
        notifier: &notifier,
        keywords: cfg.search.keywords.clone(),
        per_call_timeout: Duration::from_secs(cfg.search.request_timeout_secs),
        max_concurrent: cfg.search.max_concurrent_fetches,
    };

    let metrics = orchestrator::run_once(&deps, &mut registry, &mut quota).await?;

    tracing::info!(
        fetched = metrics.fetched,
        new = metrics.new,
        accepted = metrics.accepted,
        rejected = metrics.rejected_total(),
        notified = metrics.notified,
        best_score = metrics.best_score,
        "jobwatch run finished"
    );

    Ok(())
}
