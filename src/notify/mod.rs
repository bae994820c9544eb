// src/notify/mod.rs
pub mod telegram;

use crate::ingest::types::Posting;

pub use telegram::TelegramNotifier;

/// One alert for one surviving posting.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub posting: Posting,
    pub score: f32,
    pub tag: String,
}

/// Delivery channel contract. `Ok(())` means delivered and lets the caller
/// advance the registry to `Notified`; an error leaves the entry `Accepted`
/// so a later run retries delivery without re-running matching or filters.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ev: &NotificationEvent) -> anyhow::Result<()>;

    /// End-of-run digest; channels without a digest format may ignore it.
    async fn send_summary(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
