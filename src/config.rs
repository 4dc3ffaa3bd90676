//! Pipeline configuration
//!
//! Loaded from TOML, with environment overrides applied afterwards.
//!
//! Environment Variables:
//!   ABTEST_BASE_URL - share-link resolver endpoint
//!   ABTEST_OFFLINE - read local fallback files only (1/true/on)
//!   ABTEST_ZERO_DENOMINATOR - undefined | fail

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::consolidate::ZeroDenominatorPolicy;

/// Public resolver that turns a share key into a direct download link.
pub const DEFAULT_BASE_URL: &str = "https://cloud-api.yandex.net/v1/disk/public/resources/download";

/// Main configuration for one experiment run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub loader: LoaderConfig,
    pub sources: SourcesConfig,
    pub metrics: MetricsConfig,
}

/// Resource loader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Share-link resolver endpoint; `public_key` is appended as a query parameter
    pub base_url: String,
    /// HTTP timeout per request
    pub timeout_secs: u64,
    /// Skip the network and read fallback paths only
    pub offline: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            offline: false,
        }
    }
}

/// The four input datasets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub groups: SourceDescriptor,
    pub groups_supplemental: SourceDescriptor,
    pub active: SourceDescriptor,
    pub payments: SourceDescriptor,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            groups: SourceDescriptor::local("groups", "data/groups.csv", ';'),
            groups_supplemental: SourceDescriptor::local("group_add", "data/group_add.csv", ','),
            active: SourceDescriptor::local("active_studs", "data/active_studs.csv", ','),
            payments: SourceDescriptor::local("checks", "data/checks.csv", ';'),
        }
    }
}

/// Where to find one dataset and how it is delimited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Human-readable name used in logs and errors
    pub name: String,
    /// Public share key, resolved through `LoaderConfig::base_url`
    #[serde(default)]
    pub public_key: Option<String>,
    /// Local copy used when the remote fetch fails or in offline mode
    #[serde(default)]
    pub fallback_path: Option<PathBuf>,
    /// Field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

impl SourceDescriptor {
    pub fn local(name: &str, path: impl Into<PathBuf>, delimiter: char) -> Self {
        Self {
            name: name.to_string(),
            public_key: None,
            fallback_path: Some(path.into()),
            delimiter,
        }
    }

    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }
}

/// Consolidation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub zero_denominator: ZeroDenominatorPolicy,
    /// Fail the run instead of flagging users assigned to both groups
    pub reject_ambiguous_identities: bool,
}

impl ExperimentConfig {
    /// Read a TOML file. Relative fallback paths resolve against the file's directory.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;

        if let Some(base) = path.parent() {
            config.sources.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Apply `ABTEST_*` overrides, reading a `.env` file if present.
    pub fn apply_env(mut self) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        if let Ok(base_url) = std::env::var("ABTEST_BASE_URL") {
            self.loader.base_url = base_url;
        }
        if let Ok(offline) = std::env::var("ABTEST_OFFLINE") {
            self.loader.offline = matches!(offline.as_str(), "1" | "true" | "TRUE" | "on" | "ON");
        }
        if let Ok(policy) = std::env::var("ABTEST_ZERO_DENOMINATOR") {
            self.metrics.zero_denominator = policy
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid ABTEST_ZERO_DENOMINATOR")?;
        }
        Ok(self)
    }
}

impl SourcesConfig {
    fn resolve_relative_to(&mut self, base: &Path) {
        for source in [
            &mut self.groups,
            &mut self.groups_supplemental,
            &mut self.active,
            &mut self.payments,
        ] {
            if let Some(path) = source.fallback_path.as_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }
}
