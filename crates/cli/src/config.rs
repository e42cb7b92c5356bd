//! Configuration loading.

use anyhow::{Context, Result};
use buildstash_core::AppConfig;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::Path;

pub const ENV_PREFIX: &str = "BUILDSTASH_";

/// Load configuration: defaults, then the TOML file if it exists, then
/// `BUILDSTASH_` environment variables (`__` separates sections).
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }

    // BUILDSTASH_CONFIG and BUILDSTASH_API_KEY are read by the argument parser.
    figment = figment.merge(
        Env::prefixed(ENV_PREFIX)
            .ignore(&["config", "api_key"])
            .split("__"),
    );

    figment
        .extract()
        .with_context(|| format!("failed to load configuration ({})", path.display()))
}

/// Command-line values that take precedence over loaded configuration.
#[derive(Debug, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub max_parallel_parts: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub ci_root_url: Option<String>,
}

impl Overrides {
    pub fn apply(self, config: &mut AppConfig) {
        if let Some(base_url) = self.base_url {
            config.api.base_url = base_url;
        }
        if let Some(api_key) = self.api_key {
            config.api.api_key = Some(api_key);
        }
        if let Some(parallel) = self.max_parallel_parts {
            config.transfer.max_parallel_parts = parallel;
        }
        if let Some(timeout) = self.timeout_secs {
            config.transfer.publish_timeout_secs = Some(timeout);
        }
        if let Some(root) = self.ci_root_url {
            config.ci.root_url = Some(root);
        }
    }
}
