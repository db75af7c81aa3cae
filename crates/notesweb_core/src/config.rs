use std::env;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::extract::DEFAULT_INDEX_FILENAME;
use crate::output_paths::DEFAULT_BASE_URL;
use crate::store::TagPolicy;

pub const CONFIG_FILENAME: &str = "notesweb.toml";
pub const DEFAULT_PANDOC_URL: &str = "http://localhost:3030/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RETRIES: usize = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 350;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct NotesConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub render: RenderSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    pub base_url: Option<String>,
    pub index_filename: Option<String>,
    pub tag_policy: Option<TagPolicy>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RenderSection {
    pub pandoc_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
    pub workers: Option<usize>,
}

/// Effective settings after env, config file and defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub index_filename: String,
    pub tag_policy: TagPolicy,
    pub render: RenderSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub pandoc_url: String,
    pub timeout: Duration,
    pub retries: usize,
    pub retry_delay: Duration,
    pub workers: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            pandoc_url: DEFAULT_PANDOC_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            workers: default_workers(),
        }
    }
}

impl NotesConfig {
    /// Resolve settings: env > config > default.
    pub fn settings(&self) -> Settings {
        self.settings_with_lookup(|key| env::var(key).ok())
    }

    fn settings_with_lookup<F>(&self, lookup_env: F) -> Settings
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |key: &str| {
            lookup_env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let env_number = |key: &str| env_value(key).and_then(|value| value.parse::<u64>().ok());

        let base_url = env_value("NOTESWEB_BASE_URL")
            .or_else(|| self.site.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let index_filename = self
            .site
            .index_filename
            .clone()
            .unwrap_or_else(|| DEFAULT_INDEX_FILENAME.to_string());
        let tag_policy = self.site.tag_policy.unwrap_or_default();

        let pandoc_url = env_value("PANDOC_SERVER_URL")
            .or_else(|| self.render.pandoc_url.clone())
            .unwrap_or_else(|| DEFAULT_PANDOC_URL.to_string());
        let timeout_secs = env_number("PANDOC_TIMEOUT")
            .or(self.render.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let workers = env_number("NOTESWEB_WORKERS")
            .map(|value| value as usize)
            .or(self.render.workers)
            .filter(|value| *value > 0)
            .unwrap_or_else(default_workers);

        Settings {
            base_url,
            index_filename,
            tag_policy,
            render: RenderSettings {
                pandoc_url,
                timeout: Duration::from_secs(timeout_secs),
                retries: self.render.retries.unwrap_or(DEFAULT_RETRIES),
                retry_delay: Duration::from_millis(
                    self.render.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
                ),
                workers,
            },
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

/// Load and parse a NotesConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<NotesConfig> {
    if !config_path.exists() {
        return Ok(NotesConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: NotesConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
