// src/filters/experience.rs
//! Quick regex experience gate: a free pre-filter that runs before any
//! metered layer. Deliberately lenient: it only rejects on unambiguous
//! seniority markers, so borderline roles fall through to the next layer.

use once_cell::sync::OnceCell;
use regex::Regex;

use super::{Decision, FilterLayer};
use crate::ingest::types::Posting;

/// Unambiguously senior markers, matched against the title only.
fn senior_title_res() -> &'static Vec<Regex> {
    static RES: OnceCell<Vec<Regex>> = OnceCell::new();
    RES.get_or_init(|| {
        [
            r"(?i)\b(principal|staff engineer|architect)\b",
            r"(?i)\b(director|vp|vice president|head of)\b",
            r"(?i)\b(1[0-9]|2[0-9])\+?\s*(?:years?|yrs?)\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("senior pattern"))
        .collect()
    })
}

/// Junior-friendly markers, matched against title + description.
fn junior_res() -> &'static Vec<Regex> {
    static RES: OnceCell<Vec<Regex>> = OnceCell::new();
    RES.get_or_init(|| {
        [
            r"(?i)\b(junior|jr\.?|entry.?level|fresher|graduate)\b",
            r"(?i)\bno.?experience.?required\b",
            r"(?i)\bfreshers?.?welcome\b",
            r"(?i)\bearly.?career\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("junior pattern"))
        .collect()
    })
}

fn years_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})\s*\+?\s*(?:years?|yrs?)(?:\s+(?:of\s+)?(?:experience|exp))?")
            .expect("years pattern")
    })
}

/// Rejects roles with clear seniority demands; passes everything else.
pub struct ExperienceFilter {
    max_years: u32,
}

impl ExperienceFilter {
    pub fn new(max_years: u32) -> Self {
        Self { max_years }
    }
}

#[async_trait::async_trait]
impl FilterLayer for ExperienceFilter {
    fn id(&self) -> &'static str {
        "experience"
    }

    async fn evaluate(&self, posting: &Posting, _score: f32) -> Decision {
        let title = posting.title.to_lowercase();
        let text = format!("{} {}", posting.title, posting.description).to_lowercase();

        for re in senior_title_res() {
            if let Some(m) = re.find(&title) {
                return Decision::Reject(format!("senior marker in title: '{}'", m.as_str()));
            }
        }

        // An explicit junior signal qualifies regardless of year mentions
        // elsewhere in the body.
        for re in junior_res() {
            if re.is_match(&text) {
                return Decision::Pass;
            }
        }

        for caps in years_re().captures_iter(&text) {
            if let Some(years) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                if years > self.max_years {
                    return Decision::Reject(format!("demands {years}+ years of experience"));
                }
            }
        }

        Decision::Pass
    }
}
