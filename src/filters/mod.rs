// src/filters/mod.rs
//! Ordered chain of independent accept/reject predicates. Evaluation is a
//! strict AND with short-circuit on the first reject; the rejecting layer's
//! id becomes the recorded reason. Because every layer judges the same
//! inputs, ordering only affects cost, not the final verdict.

pub mod experience;
pub mod llm;
pub mod location;
pub mod similarity;
pub mod title;

use crate::ingest::types::Posting;

pub use experience::ExperienceFilter;
pub use llm::LlmExperienceFilter;
pub use location::LocationFilter;
pub use similarity::SimilarityFilter;
pub use title::TitleFilter;

/// Tri-state verdict of a single layer. `Inconclusive` is reserved for
/// optional best-effort layers and is treated as a pass (fail-open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Pass,
    Reject(String),
    Inconclusive,
}

#[async_trait::async_trait]
pub trait FilterLayer: Send + Sync {
    /// Stable identifier recorded as `reject_reason` when this layer fires.
    fn id(&self) -> &'static str;

    async fn evaluate(&self, posting: &Posting, score: f32) -> Decision;
}

/// Outcome of running the whole chain for one posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerdict {
    pub accepted: bool,
    /// Id of the first rejecting layer, when rejected.
    pub rejected_by: Option<&'static str>,
    /// Layer-supplied detail for logs; never part of registry state.
    pub detail: Option<String>,
}

impl ChainVerdict {
    fn accept() -> Self {
        Self {
            accepted: true,
            rejected_by: None,
            detail: None,
        }
    }
}

#[derive(Default)]
pub struct FilterChain {
    layers: Vec<Box<dyn FilterLayer>>,
}

impl FilterChain {
    pub fn new(layers: Vec<Box<dyn FilterLayer>>) -> Self {
        Self { layers }
    }

    pub fn layer_ids(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.id()).collect()
    }

    pub async fn evaluate(&self, posting: &Posting, score: f32) -> ChainVerdict {
        for layer in &self.layers {
            match layer.evaluate(posting, score).await {
                Decision::Pass => {}
                Decision::Inconclusive => {
                    tracing::debug!(layer = layer.id(), "inconclusive layer, failing open");
                }
                Decision::Reject(detail) => {
                    return ChainVerdict {
                        accepted: false,
                        rejected_by: Some(layer.id()),
                        detail: Some(detail),
                    };
                }
            }
        }
        ChainVerdict::accept()
    }
}
