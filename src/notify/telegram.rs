// src/notify/telegram.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;

use super::{NotificationEvent, Notifier};

/// Telegram bot channel. Unconfigured (missing token/chat id) it degrades to
/// a debug log and reports success, so local runs work without credentials.
pub struct TelegramNotifier {
    token: Option<String>,
    chat_id: Option<String>,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl TelegramNotifier {
    pub fn from_env() -> Self {
        Self {
            token: std::env::var("TELEGRAM_TOKEN").ok().filter(|s| !s.is_empty()),
            chat_id: std::env::var("TELEGRAM_CHAT_ID").ok().filter(|s| !s.is_empty()),
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Builder for tests/tools.
    pub fn new(token: String, chat_id: String) -> Self {
        Self {
            token: Some(token),
            chat_id: Some(chat_id),
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some() && self.chat_id.is_some()
    }

    fn format_alert(ev: &NotificationEvent) -> String {
        let p = &ev.posting;
        let score_pct = (ev.score * 100.0).round() as u32;
        format!(
            "\u{1F3AF} <b>{} - {}% Match</b>\n\n\
             \u{1F4BC} <b>{}</b>\n\
             \u{1F3E2} {}\n\
             \u{1F4CD} {}\n\
             \u{1F310} {}\n\n\
             <a href=\"{}\">\u{1F517} Apply Now</a>",
            ev.tag, score_pct, p.title, p.company, p.location_raw, p.source_id, p.url
        )
    }

    async fn post_message(&self, text: &str) -> Result<()> {
        let (Some(token), Some(chat_id)) = (&self.token, &self.chat_id) else {
            tracing::debug!("Telegram disabled (no TELEGRAM_TOKEN/TELEGRAM_CHAT_ID)");
            return Ok(());
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": false,
        });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(anyhow!("Telegram HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(e).context("Telegram request failed");
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, ev: &NotificationEvent) -> Result<()> {
        self.post_message(&Self::format_alert(ev)).await
    }

    async fn send_summary(&self, text: &str) -> Result<()> {
        self.post_message(text).await
    }
}
