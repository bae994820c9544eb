// src/orchestrator.rs
//! One pipeline invocation: Fetch -> Dedup -> Score -> Filter -> Persist
//! decisions -> Notify -> RunMetrics. Each phase consumes the previous
//! phase's output plus the registry; registry writes commit per entry, so a
//! cancellation between phases never leaves partial state behind.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::filters::FilterChain;
use crate::ingest;
use crate::ingest::types::{DynAdapter, FetchContext, FetchManifest};
use crate::matching::MatchingEngine;
use crate::notify::{NotificationEvent, Notifier};
use crate::quota::QuotaGovernor;
use crate::registry::{JobRegistry, JobState, RegistryError};

/// Ephemeral per-invocation counters, logged and summarized at the end.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub fetched: usize,
    pub duplicates: usize,
    pub new: usize,
    pub scored: usize,
    pub accepted: usize,
    pub rejected_by_layer: BTreeMap<String, usize>,
    pub notified: usize,
    pub notify_failures: usize,
    pub adapter_failures: usize,
    pub adapters_skipped: usize,
    pub source_counts: BTreeMap<String, usize>,
    pub best_score: f32,
}

impl RunMetrics {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            fetched: 0,
            duplicates: 0,
            new: 0,
            scored: 0,
            accepted: 0,
            rejected_by_layer: BTreeMap::new(),
            notified: 0,
            notify_failures: 0,
            adapter_failures: 0,
            adapters_skipped: 0,
            source_counts: BTreeMap::new(),
            best_score: 0.0,
        }
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected_by_layer.values().sum()
    }

    pub fn duration_secs(&self) -> f64 {
        match self.completed_at {
            Some(end) => (end - self.started_at).num_milliseconds() as f64 / 1000.0,
            None => 0.0,
        }
    }

    /// Digest line for the notifier's end-of-run summary message.
    pub fn summary_text(&self) -> String {
        format!(
            "Job scan complete\nFetched: {}\nNew: {}\nAccepted: {}\nRejected: {}\nNotified: {}\nBest score: {:.0}%",
            self.fetched,
            self.new,
            self.accepted,
            self.rejected_total(),
            self.notified,
            self.best_score * 100.0
        )
    }

    fn absorb_manifest(&mut self, manifest: &FetchManifest) {
        self.adapter_failures = manifest.failures();
        self.adapters_skipped = manifest.skipped();
        for report in &manifest.reports {
            self.source_counts
                .insert(report.adapter_id.clone(), report.postings);
        }
    }
}

/// Everything a run needs besides the shared mutable stores.
pub struct RunDeps<'a> {
    pub adapters: &'a [DynAdapter],
    pub engine: &'a MatchingEngine,
    pub chain: &'a FilterChain,
    pub notifier: &'a dyn Notifier,
    pub keywords: Vec<String>,
    pub per_call_timeout: Duration,
    pub max_concurrent: usize,
}

/// Run the pipeline once. Adapter- and posting-level problems are contained
/// at their phase boundary and reflected in the metrics; only a broken
/// persisted store aborts the run.
pub async fn run_once(
    deps: &RunDeps<'_>,
    registry: &mut JobRegistry,
    quota: &mut QuotaGovernor,
) -> anyhow::Result<RunMetrics> {
    let mut m = RunMetrics::new();

    // Phase 1: fetch.
    let ctx = FetchContext {
        keywords: deps.keywords.clone(),
    };
    let (postings, manifest) = ingest::fetch_all(
        deps.adapters,
        quota,
        &ctx,
        deps.per_call_timeout,
        deps.max_concurrent,
    )
    .await;
    m.fetched = postings.len();
    m.absorb_manifest(&manifest);
    tracing::info!(
        fetched = m.fetched,
        failures = m.adapter_failures,
        skipped = m.adapters_skipped,
        "fetch phase done"
    );

    // Phase 2: dedup via registry upsert.
    for posting in &postings {
        let (_, is_new) = registry.upsert_detect(posting)?;
        if is_new {
            m.new += 1;
        } else {
            m.duplicates += 1;
            counter!("dedup_skipped_total").increment(1);
        }
    }
    tracing::info!(new = m.new, duplicates = m.duplicates, "dedup phase done");

    // Phase 3: score everything still Detected. Entries left over from an
    // earlier cancelled run are picked up here as well.
    for entry in registry.entries_in_state(JobState::Detected) {
        let outcome = deps.engine.score(&entry.posting);
        if outcome.score > m.best_score {
            m.best_score = outcome.score;
        }
        match registry.record_score(&entry.fingerprint, outcome.score, &outcome.tag) {
            Ok(()) => m.scored += 1,
            Err(e @ RegistryError::InvalidTransition { .. }) => {
                tracing::warn!(fingerprint = %entry.fingerprint, error = %e, "skipping entry");
            }
            Err(e) => return Err(e.into()),
        }
    }
    tracing::info!(scored = m.scored, best = m.best_score, "score phase done");

    // Phase 4 + 5: filter and persist decisions per entry.
    for entry in registry.entries_in_state(JobState::Scored) {
        let score = entry.match_score.unwrap_or(0.0);
        let verdict = deps.chain.evaluate(&entry.posting, score).await;
        if let Some(detail) = &verdict.detail {
            tracing::debug!(fingerprint = %entry.fingerprint, detail = %detail, "filter detail");
        }
        let result = registry.record_decision(
            &entry.fingerprint,
            verdict.accepted,
            verdict.rejected_by,
        );
        match result {
            Ok(()) => {
                if verdict.accepted {
                    m.accepted += 1;
                } else if let Some(layer) = verdict.rejected_by {
                    *m.rejected_by_layer.entry(layer.to_string()).or_insert(0) += 1;
                }
            }
            Err(e @ RegistryError::InvalidTransition { .. }) => {
                tracing::warn!(fingerprint = %entry.fingerprint, error = %e, "skipping entry");
            }
            Err(e) => return Err(e.into()),
        }
    }
    tracing::info!(
        accepted = m.accepted,
        rejected = m.rejected_total(),
        "filter phase done"
    );

    // Phase 6: notify accepted, not-yet-notified entries. A failed delivery
    // leaves the entry Accepted for the next run; the Accepted -> Notified
    // guard makes double notification structurally impossible.
    for entry in registry.entries_in_state(JobState::Accepted) {
        let ev = NotificationEvent {
            posting: entry.posting.clone(),
            score: entry.match_score.unwrap_or(0.0),
            tag: entry.match_tag.clone().unwrap_or_default(),
        };
        match deps.notifier.send(&ev).await {
            Ok(()) => match registry.record_notified(&entry.fingerprint) {
                Ok(()) => {
                    m.notified += 1;
                    counter!("notify_sent_total").increment(1);
                }
                Err(e @ RegistryError::InvalidTransition { .. }) => {
                    tracing::warn!(fingerprint = %entry.fingerprint, error = %e, "notify bookkeeping");
                }
                Err(e) => return Err(e.into()),
            },
            Err(e) => {
                m.notify_failures += 1;
                counter!("notify_failed_total").increment(1);
                tracing::warn!(fingerprint = %entry.fingerprint, error = %e, "notification failed, will retry next run");
            }
        }
    }

    m.completed_at = Some(Utc::now());
    tracing::info!(
        notified = m.notified,
        notify_failures = m.notify_failures,
        duration_secs = m.duration_secs(),
        "run complete"
    );

    if m.notified > 0 {
        if let Err(e) = deps.notifier.send_summary(&m.summary_text()).await {
            tracing::warn!(error = %e, "summary notification failed");
        }
    }

    Ok(m)
}
