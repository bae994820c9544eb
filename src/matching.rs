// src/matching.rs
//! Profile matching: scores a posting against one or more target profiles
//! and keeps the best (score, tag) pair. Pure over its inputs.

use crate::ingest::normalize_text;
use crate::ingest::types::Posting;

/// One target profile to match postings against.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Profile {
    pub tag: String,
    pub text: String,
}

/// External similarity collaborator: returns a score in `[0, 1]` for two
/// texts. Implementations must be deterministic for identical inputs.
pub trait SimilarityScorer: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f32;
}

/// In-process default scorer built on `strsim`'s Sørensen–Dice bigram
/// coefficient over normalized, lowercased text. Already in `[0, 1]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalScorer;

impl SimilarityScorer for LexicalScorer {
    fn similarity(&self, a: &str, b: &str) -> f32 {
        let a = normalize_text(a).to_lowercase();
        let b = normalize_text(b).to_lowercase();
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        (strsim::sorensen_dice(&a, &b) as f32).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub score: f32,
    pub tag: String,
}

pub struct MatchingEngine {
    profiles: Vec<Profile>,
    scorer: Box<dyn SimilarityScorer>,
}

impl MatchingEngine {
    pub fn new(profiles: Vec<Profile>, scorer: Box<dyn SimilarityScorer>) -> Self {
        Self { profiles, scorer }
    }

    /// Best (score, tag) across all profiles. With no profiles configured
    /// everything scores 0.0 under the "unmatched" tag.
    pub fn score(&self, posting: &Posting) -> MatchOutcome {
        let job_text = format!("{} {}", posting.title, posting.description);
        let mut best = MatchOutcome {
            score: 0.0,
            tag: "unmatched".to_string(),
        };
        for profile in &self.profiles {
            let score = self.scorer.similarity(&job_text, &profile.text);
            if score > best.score || best.tag == "unmatched" {
                best = MatchOutcome {
                    score,
                    tag: profile.tag.clone(),
                };
            }
        }
        best
    }
}
