// tests/pipeline_e2e.rs
//! End-to-end pipeline runs against mock adapters and a recording notifier.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use jobwatch::filters::{
    ExperienceFilter, FilterChain, FilterLayer, LocationFilter, SimilarityFilter, TitleFilter,
};
use jobwatch::ingest::types::{DynAdapter, FetchContext, FetchOutcome, Posting, SourceAdapter};
use jobwatch::matching::{MatchingEngine, Profile, SimilarityScorer};
use jobwatch::notify::{NotificationEvent, Notifier};
use jobwatch::orchestrator::{run_once, RunDeps};
use jobwatch::quota::QuotaGovernor;
use jobwatch::registry::{JobRegistry, JobState};

/// Fixed batch adapter: returns the same postings on every call, the way a
/// slow-moving job board re-serves its whole feed each poll.
struct FixedBatch {
    postings: Vec<Posting>,
}

#[async_trait::async_trait]
impl SourceAdapter for FixedBatch {
    async fn fetch(&self, _ctx: &FetchContext) -> (Vec<Posting>, FetchOutcome) {
        (self.postings.clone(), FetchOutcome::Success)
    }
    fn id(&self) -> &'static str {
        "fixed"
    }
}

/// Deterministic scorer so thresholds are exact: postings mentioning "sql"
/// score 0.42, everything else 0.05.
struct KeywordScorer;

impl SimilarityScorer for KeywordScorer {
    fn similarity(&self, a: &str, _b: &str) -> f32 {
        if a.to_lowercase().contains("sql") {
            0.42
        } else {
            0.05
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, ev: &NotificationEvent) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("channel down");
        }
        self.sent.lock().unwrap().push(ev.posting.title.clone());
        Ok(())
    }
}

fn posting(title: &str, location: &str, description: &str, ext: &str) -> Posting {
    Posting {
        source_id: "fixed".to_string(),
        external_ref: Some(ext.to_string()),
        title: title.to_string(),
        company: "Acme".to_string(),
        location_raw: location.to_string(),
        description: description.to_string(),
        posted_at: None,
        url: "https://example.test/j".to_string(),
        fetched_at: Utc::now(),
    }
}

fn engine() -> MatchingEngine {
    MatchingEngine::new(
        vec![Profile {
            tag: "Data Analytics".to_string(),
            text: "sql dashboards".to_string(),
        }],
        Box::new(KeywordScorer),
    )
}

fn chain() -> FilterChain {
    let layers: Vec<Box<dyn FilterLayer>> = vec![
        Box::new(LocationFilter::new(&["pune".to_string(), "india".to_string()])),
        Box::new(TitleFilter::new(&["sales".to_string()])),
        Box::new(SimilarityFilter::new(0.35)),
        Box::new(ExperienceFilter::new(5)),
    ];
    FilterChain::new(layers)
}

fn quota(dir: &std::path::Path) -> QuotaGovernor {
    QuotaGovernor::open(dir, BTreeMap::new()).unwrap()
}

fn batch() -> Vec<Posting> {
    vec![
        // Qualifies end to end.
        posting("Data Analyst", "Pune", "sql dashboards daily", "j1"),
        // Rejected by location.
        posting("Data Analyst", "Berlin", "sql dashboards", "j2"),
        // Rejected by similarity threshold.
        posting("Office Manager", "Pune", "front desk", "j3"),
    ]
}

#[tokio::test]
async fn qualifying_posting_is_notified_exactly_once_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let adapters: Vec<DynAdapter> = vec![Arc::new(FixedBatch { postings: batch() })];
    let engine = engine();
    let chain = chain();
    let notifier = RecordingNotifier::default();
    let deps = RunDeps {
        adapters: &adapters,
        engine: &engine,
        chain: &chain,
        notifier: &notifier,
        keywords: Vec::new(),
        per_call_timeout: Duration::from_secs(5),
        max_concurrent: 4,
    };

    let mut registry = JobRegistry::open(dir.path()).unwrap();
    let mut gov = quota(dir.path());

    // First run: fetch, score, filter, notify once.
    let m1 = run_once(&deps, &mut registry, &mut gov).await.unwrap();
    assert_eq!(m1.fetched, 3);
    assert_eq!(m1.new, 3);
    assert_eq!(m1.duplicates, 0);
    assert_eq!(m1.accepted, 1);
    assert_eq!(m1.notified, 1);
    assert_eq!(m1.rejected_by_layer.get("location"), Some(&1));
    assert_eq!(m1.rejected_by_layer.get("similarity"), Some(&1));
    assert_eq!(*notifier.sent.lock().unwrap(), vec!["Data Analyst"]);

    // Second run over the identical feed: everything is a duplicate and no
    // second notification goes out, ever.
    let m2 = run_once(&deps, &mut registry, &mut gov).await.unwrap();
    assert_eq!(m2.fetched, 3);
    assert_eq!(m2.new, 0);
    assert_eq!(m2.duplicates, 3);
    assert_eq!(m2.notified, 0);
    assert_eq!(notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_delivery_stays_accepted_and_retries_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let adapters: Vec<DynAdapter> = vec![Arc::new(FixedBatch { postings: batch() })];
    let engine = engine();
    let chain = chain();
    let notifier = RecordingNotifier::default();
    notifier.fail.store(true, Ordering::SeqCst);
    let deps = RunDeps {
        adapters: &adapters,
        engine: &engine,
        chain: &chain,
        notifier: &notifier,
        keywords: Vec::new(),
        per_call_timeout: Duration::from_secs(5),
        max_concurrent: 4,
    };

    let mut registry = JobRegistry::open(dir.path()).unwrap();
    let mut gov = quota(dir.path());

    let m1 = run_once(&deps, &mut registry, &mut gov).await.unwrap();
    assert_eq!(m1.accepted, 1);
    assert_eq!(m1.notified, 0);
    assert_eq!(m1.notify_failures, 1);
    assert_eq!(registry.entries_in_state(JobState::Accepted).len(), 1);

    // Channel recovers; the retry delivers without re-scoring anything.
    notifier.fail.store(false, Ordering::SeqCst);
    let m2 = run_once(&deps, &mut registry, &mut gov).await.unwrap();
    assert_eq!(m2.new, 0);
    assert_eq!(m2.scored, 0);
    assert_eq!(m2.notified, 1);
    assert_eq!(*notifier.sent.lock().unwrap(), vec!["Data Analyst"]);
    assert_eq!(registry.entries_in_state(JobState::Notified).len(), 1);
}

#[tokio::test]
async fn all_sources_failing_is_a_successful_empty_run() {
    struct AlwaysDown;

    #[async_trait::async_trait]
    impl SourceAdapter for AlwaysDown {
        async fn fetch(&self, _ctx: &FetchContext) -> (Vec<Posting>, FetchOutcome) {
            (Vec::new(), FetchOutcome::Failure("dns".to_string()))
        }
        fn id(&self) -> &'static str {
            "down"
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let adapters: Vec<DynAdapter> = vec![Arc::new(AlwaysDown)];
    let engine = engine();
    let chain = chain();
    let notifier = RecordingNotifier::default();
    let deps = RunDeps {
        adapters: &adapters,
        engine: &engine,
        chain: &chain,
        notifier: &notifier,
        keywords: Vec::new(),
        per_call_timeout: Duration::from_secs(5),
        max_concurrent: 1,
    };

    let mut registry = JobRegistry::open(dir.path()).unwrap();
    let mut gov = quota(dir.path());

    let m = run_once(&deps, &mut registry, &mut gov).await.unwrap();
    assert_eq!(m.fetched, 0);
    assert_eq!(m.adapter_failures, 1);
    assert_eq!(m.notified, 0);
}
