// src/registry.rs
//! Persisted job-state registry: canonical identity and lifecycle state for
//! every posting ever observed. The single deduplication authority; nothing
//! else writes persisted job state.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::ingest::types::Posting;

pub type Fingerprint = String;

const REGISTRY_FILE: &str = "registry.json";
const LOCK_FILE: &str = ".lock";

/// Lifecycle of one fingerprint. Transitions are monotone:
/// `Detected -> Scored -> {Accepted | Rejected} -> Notified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Detected,
    Scored,
    Accepted,
    Rejected,
    Notified,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegistryEntry {
    pub fingerprint: Fingerprint,
    /// Latest observed snapshot; refreshed on every re-observation.
    pub posting: Posting,
    pub state: JobState,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub match_score: Option<f32>,
    pub match_tag: Option<String>,
    pub reject_reason: Option<String>,
    pub notified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown fingerprint {0}")]
    UnknownFingerprint(Fingerprint),
    #[error("invalid transition for {fingerprint}: {from:?} -> {to:?}")]
    InvalidTransition {
        fingerprint: Fingerprint,
        from: JobState,
        to: JobState,
    },
    #[error("registry store unavailable: {0}")]
    Unavailable(String),
    #[error("another invocation holds the registry lock at {0}")]
    Locked(String),
}

/// Stable identity key for a posting.
///
/// When the source gives a native reference the key is
/// `sha256(source_id, external_ref)`; otherwise it falls back to the
/// normalized title/company/location triple, so cosmetic whitespace and
/// `fetched_at` never change the fingerprint.
pub fn fingerprint(p: &Posting) -> Fingerprint {
    let mut hasher = Sha256::new();
    match p.external_ref.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => {
            hasher.update(p.source_id.as_bytes());
            hasher.update([0x1f]);
            hasher.update(r.as_bytes());
        }
        _ => {
            hasher.update(normalize_key(&p.title).as_bytes());
            hasher.update([0x1f]);
            hasher.update(normalize_key(&p.company).as_bytes());
            hasher.update([0x1f]);
            hasher.update(normalize_key(&p.location_raw).as_bytes());
        }
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn normalize_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// File-backed keyed store of `RegistryEntry` by fingerprint.
///
/// Opening acquires an exclusive lock file so two concurrent invocations
/// cannot both observe `is_new = true` for the same posting. Every mutation
/// is committed to disk before the call returns (tmp file + rename), so a
/// run cancelled between phases leaves no partial writes behind.
#[derive(Debug)]
pub struct JobRegistry {
    path: PathBuf,
    lock_path: PathBuf,
    entries: BTreeMap<Fingerprint, RegistryEntry>,
}

impl JobRegistry {
    pub fn open(state_dir: &Path) -> Result<Self, RegistryError> {
        fs::create_dir_all(state_dir)
            .map_err(|e| RegistryError::Unavailable(format!("create {}: {e}", state_dir.display())))?;

        let lock_path = state_dir.join(LOCK_FILE);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut f) => {
                let _ = writeln!(f, "{}", std::process::id());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(RegistryError::Locked(lock_path.display().to_string()));
            }
            Err(e) => {
                return Err(RegistryError::Unavailable(format!(
                    "lock {}: {e}",
                    lock_path.display()
                )));
            }
        }

        let path = state_dir.join(REGISTRY_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).map_err(|e| {
                // Corrupt store is fatal to the run; do not start half-blind.
                let _ = fs::remove_file(&lock_path);
                RegistryError::Unavailable(format!("parse {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                let _ = fs::remove_file(&lock_path);
                return Err(RegistryError::Unavailable(format!(
                    "read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(Self {
            path,
            lock_path,
            entries,
        })
    }

    /// Insert a `Detected` entry for an unseen fingerprint, or refresh the
    /// snapshot and `last_seen_at` of a known one. Returns `is_new`.
    pub fn upsert_detect(&mut self, posting: &Posting) -> Result<(Fingerprint, bool), RegistryError> {
        let fp = fingerprint(posting);
        let now = Utc::now();
        let is_new = match self.entries.get_mut(&fp) {
            Some(entry) => {
                entry.last_seen_at = now;
                // Freshest snapshot wins; lifecycle state is untouched.
                entry.posting = posting.clone();
                false
            }
            None => {
                self.entries.insert(
                    fp.clone(),
                    RegistryEntry {
                        fingerprint: fp.clone(),
                        posting: posting.clone(),
                        state: JobState::Detected,
                        first_seen_at: now,
                        last_seen_at: now,
                        match_score: None,
                        match_tag: None,
                        reject_reason: None,
                        notified_at: None,
                    },
                );
                true
            }
        };
        self.persist()?;
        Ok((fp, is_new))
    }

    /// `Detected -> Scored`. Re-scoring a still-`Scored` entry is allowed;
    /// anything past `Scored` is an `InvalidTransition`.
    pub fn record_score(
        &mut self,
        fp: &str,
        score: f32,
        tag: &str,
    ) -> Result<(), RegistryError> {
        let entry = self.entry_mut(fp)?;
        match entry.state {
            JobState::Detected | JobState::Scored => {
                entry.state = JobState::Scored;
                entry.match_score = Some(score);
                entry.match_tag = Some(tag.to_string());
                self.persist()
            }
            from => Err(RegistryError::InvalidTransition {
                fingerprint: fp.to_string(),
                from,
                to: JobState::Scored,
            }),
        }
    }

    /// `Scored -> Accepted | Rejected`.
    pub fn record_decision(
        &mut self,
        fp: &str,
        accepted: bool,
        reason: Option<&str>,
    ) -> Result<(), RegistryError> {
        let to = if accepted {
            JobState::Accepted
        } else {
            JobState::Rejected
        };
        let entry = self.entry_mut(fp)?;
        match entry.state {
            JobState::Scored => {
                entry.state = to;
                entry.reject_reason = reason.map(str::to_string);
                self.persist()
            }
            from => Err(RegistryError::InvalidTransition {
                fingerprint: fp.to_string(),
                from,
                to,
            }),
        }
    }

    /// `Accepted -> Notified`. The guard against double notification: any
    /// other current state is an `InvalidTransition`.
    pub fn record_notified(&mut self, fp: &str) -> Result<(), RegistryError> {
        let entry = self.entry_mut(fp)?;
        match entry.state {
            JobState::Accepted => {
                entry.state = JobState::Notified;
                entry.notified_at = Some(Utc::now());
                self.persist()
            }
            from => Err(RegistryError::InvalidTransition {
                fingerprint: fp.to_string(),
                from,
                to: JobState::Notified,
            }),
        }
    }

    pub fn get(&self, fp: &str) -> Option<&RegistryEntry> {
        self.entries.get(fp)
    }

    /// Snapshot of all entries currently in `state`, in fingerprint order.
    pub fn entries_in_state(&self, state: JobState) -> Vec<RegistryEntry> {
        self.entries
            .values()
            .filter(|e| e.state == state)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, fp: &str) -> Result<&mut RegistryEntry, RegistryError> {
        self.entries
            .get_mut(fp)
            .ok_or_else(|| RegistryError::UnknownFingerprint(fp.to_string()))
    }

    fn persist(&self) -> Result<(), RegistryError> {
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| RegistryError::Unavailable(format!("serialize registry: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes())
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| RegistryError::Unavailable(format!("write {}: {e}", self.path.display())))
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
