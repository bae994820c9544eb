// src/quota.rs
//! Monthly call-budget governor for metered adapters. The sole authority on
//! whether a rationed source runs this cycle; a denied reservation is a
//! planned skip, never an error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

const QUOTA_FILE: &str = "quota.json";

/// Persisted per-adapter counter. Lifecycle is one calendar month; the reset
/// happens lazily when the observed period differs from the stored key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QuotaCounter {
    pub period_key: String,
    pub calls_used: u32,
    pub calls_limit: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("no call budget configured for adapter {0}")]
    UnknownAdapter(String),
    #[error("quota store unavailable: {0}")]
    Unavailable(String),
}

/// Current period key, e.g. "2026-08".
pub fn current_period_key() -> String {
    Utc::now().format("%Y-%m").to_string()
}

#[derive(Debug)]
pub struct QuotaGovernor {
    path: PathBuf,
    limits: BTreeMap<String, u32>,
    counters: BTreeMap<String, QuotaCounter>,
}

impl QuotaGovernor {
    /// `limits` maps adapter id to its monthly call budget. Counters for
    /// adapters without a configured limit are carried but never consulted.
    pub fn open(state_dir: &Path, limits: BTreeMap<String, u32>) -> Result<Self, QuotaError> {
        fs::create_dir_all(state_dir)
            .map_err(|e| QuotaError::Unavailable(format!("create {}: {e}", state_dir.display())))?;
        let path = state_dir.join(QUOTA_FILE);
        let counters = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s)
                .map_err(|e| QuotaError::Unavailable(format!("parse {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(QuotaError::Unavailable(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self {
            path,
            limits,
            counters,
        })
    }

    /// Atomically check `calls_used + cost <= calls_limit` for the current
    /// period; commit the increment and return `true`, or return `false`
    /// without touching state. The stale-period reset runs first.
    pub fn reserve(&mut self, adapter_id: &str, cost: u32) -> Result<bool, QuotaError> {
        self.reserve_in_period(adapter_id, cost, &current_period_key())
    }

    /// Period-injectable variant so rollover is testable without a clock.
    pub fn reserve_in_period(
        &mut self,
        adapter_id: &str,
        cost: u32,
        period_key: &str,
    ) -> Result<bool, QuotaError> {
        let limit = *self
            .limits
            .get(adapter_id)
            .ok_or_else(|| QuotaError::UnknownAdapter(adapter_id.to_string()))?;

        let counter = self
            .counters
            .entry(adapter_id.to_string())
            .or_insert_with(|| QuotaCounter {
                period_key: period_key.to_string(),
                calls_used: 0,
                calls_limit: limit,
            });

        // Lazy monthly reset; runs before every reservation check.
        if counter.period_key != period_key {
            counter.period_key = period_key.to_string();
            counter.calls_used = 0;
        }
        counter.calls_limit = limit;

        if counter.calls_used.saturating_add(cost) > limit {
            return Ok(false);
        }
        counter.calls_used += cost;
        self.persist()?;
        Ok(true)
    }

    pub fn usage(&self, adapter_id: &str) -> Option<&QuotaCounter> {
        self.counters.get(adapter_id)
    }

    fn persist(&self) -> Result<(), QuotaError> {
        let json = serde_json::to_string_pretty(&self.counters)
            .map_err(|e| QuotaError::Unavailable(format!("serialize quota: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes())
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| QuotaError::Unavailable(format!("write {}: {e}", self.path.display())))
    }
}
