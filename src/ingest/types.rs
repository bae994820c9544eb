// src/ingest/types.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// One canonical job listing, normalized from a source-specific shape.
/// Immutable once produced by an adapter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Posting {
    /// Adapter id, e.g. "remoteok", "wwr_rss".
    pub source_id: String,
    /// Source-native identifier or canonical URL; `None` when the source
    /// exposes neither (identity then falls back to title/company/location).
    pub external_ref: Option<String>,
    pub title: String,
    pub company: String,
    pub location_raw: String,
    pub description: String,
    /// Best-effort publication time; many boards only give relative text.
    pub posted_at: Option<DateTime<Utc>>,
    pub url: String,
    pub fetched_at: DateTime<Utc>,
}

/// How a single adapter call ended. Adapters report every failure mode
/// through this type; nothing panics into the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FetchOutcome {
    Success,
    PartialSuccess(String),
    Failure(String),
    Skipped(String),
}

impl FetchOutcome {
    pub fn quota_exhausted() -> Self {
        FetchOutcome::Skipped("quota_exhausted".to_string())
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, FetchOutcome::Success | FetchOutcome::PartialSuccess(_))
    }
}

/// Shared per-run input handed to every adapter.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    /// Search keywords adapters may use to pre-filter board responses.
    /// An empty list means "take everything".
    pub keywords: Vec<String>,
}

/// Contract for one external feed. Adapters are side-effect-free with
/// respect to the registry; only the coordinator aggregates their output.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, ctx: &FetchContext) -> (Vec<Posting>, FetchOutcome);

    fn id(&self) -> &'static str;

    /// Calls charged against a monthly budget; `None` for free sources.
    fn metered_cost(&self) -> Option<u32> {
        None
    }
}

pub type DynAdapter = Arc<dyn SourceAdapter>;

/// Per-adapter record in the run manifest.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub adapter_id: String,
    pub outcome: FetchOutcome,
    pub postings: usize,
    pub elapsed_ms: u64,
}

/// What every registered adapter did this cycle.
#[derive(Debug, Clone, Default)]
pub struct FetchManifest {
    pub reports: Vec<SourceReport>,
}

impl FetchManifest {
    pub fn failures(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, FetchOutcome::Failure(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, FetchOutcome::Skipped(_)))
            .count()
    }
}
