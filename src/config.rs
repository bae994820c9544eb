// src/config.rs
//! Watchdog configuration: TOML file + environment overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::matching::Profile;

pub const DEFAULT_CONFIG_PATH: &str = "config/jobwatch.toml";
pub const ENV_CONFIG_PATH: &str = "JOBWATCH_CONFIG_PATH";
pub const ENV_MIN_SCORE: &str = "JOBWATCH_MIN_SCORE";
pub const ENV_STATE_DIR: &str = "JOBWATCH_STATE_DIR";

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    pub search: SearchSection,
    pub matching: MatchingSection,
    pub filters: FiltersSection,
    #[serde(default)]
    pub storage: StorageSection,
    /// Monthly call budgets by adapter id.
    #[serde(default)]
    pub quota: BTreeMap<String, u32>,
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Upper bound on concurrent adapter calls; 0 means one task per adapter.
    #[serde(default)]
    pub max_concurrent_fetches: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSection {
    pub min_match_score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FiltersSection {
    pub allowed_locations: Vec<String>,
    #[serde(default)]
    pub excluded_titles: Vec<String>,
    #[serde(default = "default_max_experience_years")]
    pub max_experience_years: u32,
    /// Enables the optional LLM experience layer.
    #[serde(default)]
    pub llm_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_experience_years() -> u32 {
    5
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn parse_score_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}

impl WatchdogConfig {
    /// Load from `$JOBWATCH_CONFIG_PATH` or the default path, then apply
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("failed to read config at {}: {}", path.display(), e)
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let mut cfg: WatchdogConfig = toml::from_str(toml_str)?;

        if let Some(score) = parse_score_env(std::env::var(ENV_MIN_SCORE).ok()) {
            cfg.matching.min_match_score = score;
        } else if !cfg.matching.min_match_score.is_finite() {
            cfg.matching.min_match_score = 0.35;
        }
        cfg.matching.min_match_score = cfg.matching.min_match_score.clamp(0.0, 1.0);

        if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
            if !dir.trim().is_empty() {
                cfg.storage.state_dir = PathBuf::from(dir);
            }
        }

        if cfg.profiles.is_empty() {
            anyhow::bail!("config must define at least one [[profiles]] entry");
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TOML: &str = r#"
[search]
keywords = ["data analyst", "sql"]
request_timeout_secs = 10

[matching]
min_match_score = 0.35

[filters]
allowed_locations = ["pune", "mumbai"]
excluded_titles = ["sales"]
max_experience_years = 5

[quota]
google_jobs = 250

[[profiles]]
tag = "Data Analytics"
text = "sql dashboards reporting"
"#;

    #[test]
    #[serial_test::serial]
    fn parses_full_shape() {
        std::env::remove_var(ENV_MIN_SCORE);
        std::env::remove_var(ENV_STATE_DIR);
        let cfg = WatchdogConfig::from_toml_str(TEST_TOML).unwrap();
        assert_eq!(cfg.search.keywords.len(), 2);
        assert_eq!(cfg.search.request_timeout_secs, 10);
        assert_eq!(cfg.search.max_concurrent_fetches, 0);
        assert!((cfg.matching.min_match_score - 0.35).abs() < 1e-6);
        assert_eq!(cfg.quota.get("google_jobs"), Some(&250));
        assert_eq!(cfg.storage.state_dir, PathBuf::from("state"));
        assert_eq!(cfg.profiles[0].tag, "Data Analytics");
    }

    #[test]
    #[serial_test::serial]
    fn env_overrides_threshold_and_clamps() {
        std::env::set_var(ENV_MIN_SCORE, "1.7");
        let cfg = WatchdogConfig::from_toml_str(TEST_TOML).unwrap();
        std::env::remove_var(ENV_MIN_SCORE);
        assert_eq!(cfg.matching.min_match_score, 1.0);
    }

    #[test]
    #[serial_test::serial]
    fn missing_profiles_is_an_error() {
        std::env::remove_var(ENV_MIN_SCORE);
        let toml = r#"
[search]
[matching]
min_match_score = 0.3
[filters]
allowed_locations = []
"#;
        assert!(WatchdogConfig::from_toml_str(toml).is_err());
    }
}
