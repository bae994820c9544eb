// src/filters/location.rs
use once_cell::sync::OnceCell;

use super::{Decision, FilterLayer};
use crate::ingest::types::Posting;

/// Markers that make a posting location count as explicitly remote even when
/// it names no allow-listed region.
const REMOTE_MARKERS: &[&str] = &[
    "remote",
    "work from home",
    "wfh",
    "anywhere",
    "worldwide",
    "hybrid",
];

/// Passes postings whose location matches the configured allow-list of
/// cities/regions, or that are explicitly remote. Everything else rejects.
pub struct LocationFilter {
    allowed: Vec<String>,
}

impl LocationFilter {
    pub fn new(allowed: &[String]) -> Self {
        Self {
            allowed: allowed.iter().map(|s| s.trim().to_lowercase()).collect(),
        }
    }

    fn is_remote(location: &str) -> bool {
        REMOTE_MARKERS.iter().any(|m| location.contains(m))
    }

    fn matches_allowed(&self, location: &str) -> bool {
        self.allowed
            .iter()
            .any(|a| !a.is_empty() && location.contains(a.as_str()))
    }
}

#[async_trait::async_trait]
impl FilterLayer for LocationFilter {
    fn id(&self) -> &'static str {
        "location"
    }

    async fn evaluate(&self, posting: &Posting, _score: f32) -> Decision {
        static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
        let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
        let location = re_ws
            .replace_all(&posting.location_raw.to_lowercase(), " ")
            .trim()
            .to_string();

        if Self::is_remote(&location) || self.matches_allowed(&location) {
            Decision::Pass
        } else {
            Decision::Reject(format!("location '{}' not in allow-list", posting.location_raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn posting(location: &str) -> Posting {
        Posting {
            source_id: "remoteok".to_string(),
            external_ref: None,
            title: "Data Analyst".to_string(),
            company: "Acme".to_string(),
            location_raw: location.to_string(),
            description: String::new(),
            posted_at: None,
            url: String::new(),
            fetched_at: Utc::now(),
        }
    }

    fn filter() -> LocationFilter {
        LocationFilter::new(&[
            "pune".to_string(),
            "mumbai".to_string(),
            "bangalore".to_string(),
            "india".to_string(),
        ])
    }

    #[tokio::test]
    async fn allow_listed_city_passes() {
        assert_eq!(filter().evaluate(&posting("Pune"), 0.5).await, Decision::Pass);
        assert_eq!(
            filter().evaluate(&posting("Mumbai,   India"), 0.5).await,
            Decision::Pass
        );
    }

    #[tokio::test]
    async fn explicit_remote_passes() {
        assert_eq!(
            filter().evaluate(&posting("Remote (worldwide)"), 0.5).await,
            Decision::Pass
        );
        assert_eq!(
            filter().evaluate(&posting("Work From Home"), 0.5).await,
            Decision::Pass
        );
    }

    #[tokio::test]
    async fn other_regions_reject() {
        let v = filter().evaluate(&posting("Berlin, Germany"), 0.9).await;
        assert!(matches!(v, Decision::Reject(_)));
    }
}
