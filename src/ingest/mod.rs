// src/ingest/mod.rs
pub mod adapters;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::ingest::types::{
    DynAdapter, FetchContext, FetchManifest, FetchOutcome, Posting, SourceReport,
};
use crate::quota::QuotaGovernor;

/// One-time metrics registration (so series show up even before first use).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_postings_total", "Postings aggregated from usable adapters.");
        describe_counter!("fetch_adapter_failures_total", "Adapter calls that ended in Failure.");
        describe_counter!(
            "fetch_adapter_skipped_total",
            "Adapter calls skipped (quota or config)."
        );
        describe_histogram!("fetch_adapter_ms", "Per-adapter fetch time in milliseconds.");
        describe_gauge!("fetch_last_run_ts", "Unix ts when the fetch phase last ran.");
        describe_counter!("dedup_skipped_total", "Re-observed postings skipped by the registry.");
        describe_counter!("notify_sent_total", "Alerts delivered.");
        describe_counter!("notify_failed_total", "Alert deliveries that failed and will retry.");
    });
}

/// Normalize text: decode HTML entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Case-insensitive keyword pre-filter shared by adapters.
/// An empty keyword list keeps everything.
pub fn matches_keywords(text: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let lower = text.to_lowercase();
    keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
}

/// Fan out to all registered adapters concurrently and aggregate results.
///
/// - Metered adapters reserve against the quota governor first; a denied
///   reservation yields `Skipped("quota_exhausted")`, never a failure.
/// - Every call runs under `per_call_timeout`; a timeout is reported as
///   `Failure("timeout")`.
/// - One adapter failing never aborts the fan-out; the manifest records
///   each adapter's outcome and the combined list holds everything from
///   `Success`/`PartialSuccess` adapters.
/// - `max_concurrent = 0` means one task per adapter, so no adapter ever
///   waits on another.
pub async fn fetch_all(
    adapters: &[DynAdapter],
    quota: &mut QuotaGovernor,
    ctx: &FetchContext,
    per_call_timeout: Duration,
    max_concurrent: usize,
) -> (Vec<Posting>, FetchManifest) {
    ensure_metrics_described();

    let bound = if max_concurrent == 0 {
        adapters.len().max(1)
    } else {
        max_concurrent
    };
    let mut manifest = FetchManifest::default();
    let semaphore = Arc::new(Semaphore::new(bound));
    let mut tasks: JoinSet<(SourceReport, Vec<Posting>)> = JoinSet::new();
    let mut results: Vec<(SourceReport, Vec<Posting>)> = Vec::new();

    for adapter in adapters {
        // Quota is consulted up front, before any task is spawned; the
        // governor commits the reservation only when the budget allows it.
        if let Some(cost) = adapter.metered_cost() {
            match quota.reserve(adapter.id(), cost) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(adapter = adapter.id(), "skipping metered adapter, quota exhausted");
                    counter!("fetch_adapter_skipped_total").increment(1);
                    manifest.reports.push(SourceReport {
                        adapter_id: adapter.id().to_string(),
                        outcome: FetchOutcome::quota_exhausted(),
                        postings: 0,
                        elapsed_ms: 0,
                    });
                    continue;
                }
                Err(e) => {
                    tracing::warn!(adapter = adapter.id(), error = %e, "quota store error, skipping adapter");
                    counter!("fetch_adapter_skipped_total").increment(1);
                    manifest.reports.push(SourceReport {
                        adapter_id: adapter.id().to_string(),
                        outcome: FetchOutcome::Skipped(format!("quota_store: {e}")),
                        postings: 0,
                        elapsed_ms: 0,
                    });
                    continue;
                }
            }
        }

        let adapter = Arc::clone(adapter);
        let ctx = ctx.clone();
        let permit_source = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = permit_source.acquire_owned().await.expect("semaphore closed");
            let t0 = std::time::Instant::now();
            let (postings, outcome) =
                match tokio::time::timeout(per_call_timeout, adapter.fetch(&ctx)).await {
                    Ok(res) => res,
                    Err(_) => (Vec::new(), FetchOutcome::Failure("timeout".to_string())),
                };
            let elapsed_ms = t0.elapsed().as_millis() as u64;
            histogram!("fetch_adapter_ms").record(elapsed_ms as f64);
            let report = SourceReport {
                adapter_id: adapter.id().to_string(),
                outcome,
                postings: postings.len(),
                elapsed_ms,
            };
            (report, postings)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(pair) => results.push(pair),
            Err(e) => {
                // A panicking adapter violates the contract; contain it anyway.
                tracing::error!(error = %e, "adapter task panicked");
            }
        }
    }

    let mut combined = Vec::new();
    for (report, postings) in results {
        match &report.outcome {
            FetchOutcome::Success | FetchOutcome::PartialSuccess(_) => {
                tracing::info!(
                    adapter = %report.adapter_id,
                    postings = report.postings,
                    elapsed_ms = report.elapsed_ms,
                    "adapter fetch ok"
                );
                combined.extend(postings);
            }
            FetchOutcome::Failure(reason) => {
                tracing::warn!(adapter = %report.adapter_id, reason = %reason, "adapter fetch failed");
                counter!("fetch_adapter_failures_total").increment(1);
            }
            FetchOutcome::Skipped(reason) => {
                tracing::info!(adapter = %report.adapter_id, reason = %reason, "adapter skipped");
            }
        }
        manifest.reports.push(report);
    }

    counter!("fetch_postings_total").increment(combined.len() as u64);
    gauge!("fetch_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

    (combined, manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <p>Data&nbsp;Analyst</p>   role!  ";
        assert_eq!(normalize_text(s), "Data Analyst role!");
    }

    #[test]
    fn normalize_text_collapses_whitespace() {
        assert_eq!(normalize_text("a\n\t b   c"), "a b c");
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let kws = vec!["Data Analyst".to_string(), "sql".to_string()];
        assert!(matches_keywords("Senior DATA ANALYST wanted", &kws));
        assert!(matches_keywords("Knows SQL and Python", &kws));
        assert!(!matches_keywords("Forklift operator", &kws));
    }

    #[test]
    fn empty_keywords_match_everything() {
        assert!(matches_keywords("anything at all", &[]));
    }
}
