// tests/filter_chain.rs
use std::sync::Arc;

use chrono::Utc;
use jobwatch::filters::llm::{DisabledClient, MockClient};
use jobwatch::filters::{
    ExperienceFilter, FilterChain, FilterLayer, LlmExperienceFilter, LocationFilter,
    SimilarityFilter, TitleFilter,
};
use jobwatch::ingest::types::Posting;

fn posting(title: &str, location: &str, description: &str) -> Posting {
    Posting {
        source_id: "remoteok".to_string(),
        external_ref: None,
        title: title.to_string(),
        company: "Acme".to_string(),
        location_raw: location.to_string(),
        description: description.to_string(),
        posted_at: None,
        url: String::new(),
        fetched_at: Utc::now(),
    }
}

fn allowed() -> Vec<String> {
    ["pune", "mumbai", "bangalore", "india"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn excluded() -> Vec<String> {
    ["sales", "recruiter"].iter().map(|s| s.to_string()).collect()
}

type LayerBuilder = fn() -> Box<dyn FilterLayer>;

fn layer_builders() -> Vec<LayerBuilder> {
    vec![
        || Box::new(LocationFilter::new(&allowed())),
        || Box::new(TitleFilter::new(&excluded())),
        || Box::new(SimilarityFilter::new(0.35)),
        || Box::new(ExperienceFilter::new(5)),
        || Box::new(LlmExperienceFilter::new(Arc::new(DisabledClient), 5)),
    ]
}

fn chain_with_order(order: &[usize]) -> FilterChain {
    let builders = layer_builders();
    FilterChain::new(order.iter().map(|&i| builders[i]()).collect())
}

#[tokio::test]
async fn qualifying_pune_analyst_survives_the_canonical_chain() {
    let chain = chain_with_order(&[0, 1, 2, 3, 4]);
    let p = posting("Data Analyst", "Pune", "SQL dashboards, 2 years experience");
    let verdict = chain.evaluate(&p, 0.42).await;
    assert!(verdict.accepted, "expected accept, got {verdict:?}");
}

#[tokio::test]
async fn final_verdict_is_invariant_to_layer_order() {
    let cases = [
        (posting("Data Analyst", "Pune", "SQL dashboards"), 0.42_f32),
        (posting("Data Analyst", "Berlin", "SQL dashboards"), 0.42),
        (posting("Sales Manager", "Pune", "quota carrying role"), 0.90),
        (posting("Data Analyst", "Pune", "SQL"), 0.10),
        (posting("Principal Architect", "Pune", "platform vision"), 0.80),
    ];
    // A handful of permutations of the five layers, canonical order first.
    let orders: [[usize; 5]; 6] = [
        [0, 1, 2, 3, 4],
        [4, 3, 2, 1, 0],
        [2, 0, 4, 1, 3],
        [1, 3, 0, 4, 2],
        [3, 4, 1, 2, 0],
        [2, 3, 4, 0, 1],
    ];

    for (p, score) in &cases {
        let canonical = chain_with_order(&orders[0]).evaluate(p, *score).await;
        for order in &orders[1..] {
            let permuted = chain_with_order(order).evaluate(p, *score).await;
            assert_eq!(
                canonical.accepted, permuted.accepted,
                "order {order:?} changed the verdict for '{}'",
                p.title
            );
        }
    }
}

#[tokio::test]
async fn unavailable_llm_layer_fails_open() {
    // DisabledClient stands in for an unreachable collaborator.
    let chain = chain_with_order(&[0, 1, 2, 3, 4]);
    let p = posting("Data Analyst", "Pune", "SQL dashboards");
    assert!(chain.evaluate(&p, 0.42).await.accepted);
}

#[tokio::test]
async fn llm_estimate_above_max_rejects_with_layer_id() {
    let chain = FilterChain::new(vec![
        Box::new(LocationFilter::new(&allowed())),
        Box::new(TitleFilter::new(&excluded())),
        Box::new(SimilarityFilter::new(0.35)),
        Box::new(ExperienceFilter::new(5)),
        Box::new(LlmExperienceFilter::new(
            Arc::new(MockClient { fixed: Some(9) }),
            5,
        )),
    ]);
    let p = posting("Data Analyst", "Pune", "SQL dashboards");
    let verdict = chain.evaluate(&p, 0.42).await;
    assert!(!verdict.accepted);
    assert_eq!(verdict.rejected_by, Some("llm_experience"));
}

#[tokio::test]
async fn first_rejecting_layer_is_recorded_in_canonical_order() {
    let chain = chain_with_order(&[0, 1, 2, 3, 4]);
    // Fails both location and similarity; location is first in the chain.
    let p = posting("Data Analyst", "Berlin", "SQL");
    let verdict = chain.evaluate(&p, 0.05).await;
    assert!(!verdict.accepted);
    assert_eq!(verdict.rejected_by, Some("location"));
}
