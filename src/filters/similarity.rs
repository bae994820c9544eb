// src/filters/similarity.rs
use super::{Decision, FilterLayer};
use crate::ingest::types::Posting;

/// Passes postings whose match score reached the configured minimum.
/// The comparison is inclusive: `score >= min_score` passes.
pub struct SimilarityFilter {
    min_score: f32,
}

impl SimilarityFilter {
    pub fn new(min_score: f32) -> Self {
        Self {
            min_score: min_score.clamp(0.0, 1.0),
        }
    }
}

#[async_trait::async_trait]
impl FilterLayer for SimilarityFilter {
    fn id(&self) -> &'static str {
        "similarity"
    }

    async fn evaluate(&self, _posting: &Posting, score: f32) -> Decision {
        if score >= self.min_score {
            Decision::Pass
        } else {
            Decision::Reject(format!(
                "score {score:.3} below threshold {:.3}",
                self.min_score
            ))
        }
    }
}
