// src/filters/title.rs
use super::{Decision, FilterLayer};
use crate::ingest::types::Posting;

/// Rejects postings whose title matches any exclusion keyword
/// (case-insensitive substring). Keywords name roles the pipeline should
/// never alert on, e.g. "sales" or "recruiter".
pub struct TitleFilter {
    excluded: Vec<String>,
}

impl TitleFilter {
    pub fn new(excluded: &[String]) -> Self {
        Self {
            excluded: excluded
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl FilterLayer for TitleFilter {
    fn id(&self) -> &'static str {
        "title"
    }

    async fn evaluate(&self, posting: &Posting, _score: f32) -> Decision {
        let title = posting.title.to_lowercase();
        match self.excluded.iter().find(|kw| title.contains(kw.as_str())) {
            Some(kw) => Decision::Reject(format!("title matches exclusion '{kw}'")),
            None => Decision::Pass,
        }
    }
}
