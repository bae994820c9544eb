// src/filters/llm.rs
//! Optional LLM experience gate. The extraction call goes to an unreliable
//! remote collaborator, so the layer is tri-state: a usable estimate above
//! the configured maximum rejects, everything else fails open.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Decision, FilterLayer};
use crate::ingest::types::Posting;

/// Experience-extraction collaborator: best-effort estimate of the minimum
/// years of experience a posting demands. `None` means unknown or
/// unavailable; callers must not treat it as a rejection.
#[async_trait::async_trait]
pub trait ExperienceClient: Send + Sync {
    async fn extract_min_years(&self, text: &str) -> Option<u32>;

    fn provider_name(&self) -> &'static str;
}

pub type DynExperienceClient = Arc<dyn ExperienceClient>;

/// Always answers "unknown"; used when the layer is switched off.
pub struct DisabledClient;

#[async_trait::async_trait]
impl ExperienceClient for DisabledClient {
    async fn extract_min_years(&self, _text: &str) -> Option<u32> {
        None
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic client for tests and local runs.
pub struct MockClient {
    pub fixed: Option<u32>,
}

#[async_trait::async_trait]
impl ExperienceClient for MockClient {
    async fn extract_min_years(&self, _text: &str) -> Option<u32> {
        self.fixed
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Groq chat-completions client (free tier). Requires `GROQ_API_KEY`;
/// without it every call reports unknown and the layer stays open.
pub struct GroqClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GroqClient {
    pub fn from_env() -> Self {
        let api_key = std::env::var("GROQ_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: "llama-3.1-8b-instant".to_string(),
        }
    }
}

const SYSTEM_PROMPT: &str = "You are a job requirements analyzer. Given a job posting, \
return the minimum years of experience it demands. Respond in JSON only: \
{\"min_years\": <integer or null>}. Use null when the posting does not state a requirement.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct Extraction {
    min_years: Option<u32>,
}

#[async_trait::async_trait]
impl ExperienceClient for GroqClient {
    async fn extract_min_years(&self, text: &str) -> Option<u32> {
        if self.api_key.is_empty() {
            return None;
        }

        // Cap the prompt; long descriptions add nothing past the requirements
        // section and burn tokens.
        let body: String = text.chars().take(2000).collect();
        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &body,
                },
            ],
            temperature: 0.1,
            max_tokens: 100,
        };

        let resp = self
            .http
            .post("https://api.groq.com/openai/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "experience extraction call failed");
            return None;
        }
        let parsed: ChatResponse = resp.json().await.ok()?;
        let content = parsed.choices.first()?.message.content.trim();

        // Models sometimes wrap the JSON in prose; take the outermost object.
        let start = content.find('{')?;
        let end = content.rfind('}')?;
        if end < start {
            return None;
        }
        let extraction: Extraction = serde_json::from_str(&content[start..=end]).ok()?;
        extraction.min_years
    }

    fn provider_name(&self) -> &'static str {
        "groq"
    }
}

/// The optional chain layer wrapping an [`ExperienceClient`].
pub struct LlmExperienceFilter {
    client: DynExperienceClient,
    max_years: u32,
}

impl LlmExperienceFilter {
    pub fn new(client: DynExperienceClient, max_years: u32) -> Self {
        Self { client, max_years }
    }
}

#[async_trait::async_trait]
impl FilterLayer for LlmExperienceFilter {
    fn id(&self) -> &'static str {
        "llm_experience"
    }

    async fn evaluate(&self, posting: &Posting, _score: f32) -> Decision {
        let text = format!("{}\n\n{}", posting.title, posting.description);
        match self.client.extract_min_years(&text).await {
            Some(years) if years > self.max_years => Decision::Reject(format!(
                "estimated minimum {years} years exceeds maximum {}",
                self.max_years
            )),
            Some(_) => Decision::Pass,
            None => Decision::Inconclusive,
        }
    }
}
