//! Resource loading: remote public-share download with a local fallback.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{LoaderConfig, SourceDescriptor};
use crate::error::{MetricsError, Result};
use crate::table::Table;

/// Something that can materialize a dataset as a [`Table`].
pub trait ResourceLoader {
    fn load(&self, source: &SourceDescriptor) -> Result<Table>;
}

/// Resolver response: a short-lived direct download link.
#[derive(Debug, Deserialize)]
struct DownloadLink {
    href: String,
}

/// Resolves public share keys through a cloud-disk API, falling back to
/// the source's local path when the remote side fails.
pub struct ShareLinkLoader {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl ShareLinkLoader {
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MetricsError::ResourceUnavailable {
                source_name: "http-client".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn fetch_remote(&self, source: &SourceDescriptor, public_key: &str) -> anyhow::Result<Table> {
        let link: DownloadLink = self
            .client
            .get(&self.base_url)
            .query(&[("public_key", public_key)])
            .send()?
            .error_for_status()?
            .json()?;
        debug!(source = %source.name, href = %link.href, "resolved download link");

        let body = self.client.get(&link.href).send()?.error_for_status()?.text()?;
        Ok(Table::from_text(&source.name, &body, source.delimiter)?)
    }
}

impl ResourceLoader for ShareLinkLoader {
    fn load(&self, source: &SourceDescriptor) -> Result<Table> {
        let remote_error = match source.public_key.as_deref() {
            Some(public_key) => match self.fetch_remote(source, public_key) {
                Ok(table) => {
                    info!(source = %source.name, rows = table.len(), "loaded remote dataset");
                    return Ok(table);
                }
                Err(e) => {
                    warn!(source = %source.name, error = %e, "remote fetch failed, trying local fallback");
                    Some(e.to_string())
                }
            },
            None => None,
        };

        LocalLoader.load(source).map_err(|local| match remote_error {
            Some(remote) => MetricsError::ResourceUnavailable {
                source_name: source.name.clone(),
                reason: format!("remote: {}; local: {}", remote, local),
            },
            None => local,
        })
    }
}

/// Reads `fallback_path` only.
pub struct LocalLoader;

impl ResourceLoader for LocalLoader {
    fn load(&self, source: &SourceDescriptor) -> Result<Table> {
        let path = source
            .fallback_path
            .as_ref()
            .ok_or_else(|| MetricsError::ResourceUnavailable {
                source_name: source.name.clone(),
                reason: "no local fallback path configured".to_string(),
            })?;

        let table = Table::from_path(&source.name, path, source.delimiter)?;
        info!(source = %source.name, path = %path.display(), rows = table.len(), "loaded local dataset");
        Ok(table)
    }
}

/// Pick the loader for a run: offline mode never touches the network.
pub fn loader_for(config: &LoaderConfig) -> Result<Box<dyn ResourceLoader>> {
    if config.offline {
        Ok(Box::new(LocalLoader))
    } else {
        Ok(Box::new(ShareLinkLoader::new(config)?))
    }
}
