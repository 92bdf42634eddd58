//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/labflow.sqlite"
//!
//! [extractor]
//! provider = "http"
//! endpoint = "https://extractor.internal/v1/lab-reports:extract"
//! api_key_env = "LABFLOW_EXTRACTOR_TOKEN"
//! timeout_secs = 60
//!
//! [listing]
//! default_limit = 20
//! max_limit = 100
//!
//! [logging]
//! filter = "labflow=info"
//! ```
//!
//! Only `[db]` and `[extractor]` are required.

use anyhow::{bail, Context, Result};
use labflow_core::store::{PageLimits, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractorConfig {
    /// `"http"` or `"file"`.
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListingConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "max_limit")]
    pub max_limit: u32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}
fn max_limit() -> u32 {
    MAX_PAGE_LIMIT
}

impl ListingConfig {
    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "labflow=info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    match config.extractor.provider.as_str() {
        "http" => {
            let endpoint = config.extractor.endpoint.as_deref().unwrap_or_default();
            if endpoint.trim().is_empty() {
                bail!("extractor.endpoint must be set when provider is 'http'");
            }
        }
        "file" => {}
        other => bail!(
            "Unknown extractor provider: '{}'. Must be http or file.",
            other
        ),
    }

    if config.extractor.timeout_secs == 0 {
        bail!("extractor.timeout_secs must be > 0");
    }

    if config.listing.default_limit < 1 {
        bail!("listing.default_limit must be >= 1");
    }
    if config.listing.default_limit > config.listing.max_limit {
        bail!("listing.default_limit must be <= listing.max_limit");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_FILE: &str = r#"
[db]
path = "./data/labflow.sqlite"

[extractor]
provider = "file"
"#;

    #[test]
    fn test_defaults_applied() {
        let config = parse_config(MINIMAL_FILE).unwrap();
        assert_eq!(config.extractor.timeout_secs, 60);
        assert_eq!(config.listing.default_limit, 20);
        assert_eq!(config.listing.max_limit, 100);
        assert_eq!(config.logging.filter, "labflow=info");
    }

    #[test]
    fn test_http_requires_endpoint() {
        let content = r#"
[db]
path = "x.sqlite"

[extractor]
provider = "http"
"#;
        let err = parse_config(content).unwrap_err();
        assert!(err.to_string().contains("extractor.endpoint"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let content = r#"
[db]
path = "x.sqlite"

[extractor]
provider = "ocr-magic"
"#;
        assert!(parse_config(content)
            .unwrap_err()
            .to_string()
            .contains("Unknown extractor provider"));
    }

    #[test]
    fn test_listing_bounds_validated() {
        let content = format!("{MINIMAL_FILE}\n[listing]\ndefault_limit = 50\nmax_limit = 10\n");
        assert!(parse_config(&content).is_err());

        let content = format!("{MINIMAL_FILE}\n[listing]\ndefault_limit = 0\n");
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let content = MINIMAL_FILE.replace("provider = \"file\"", "provider = \"file\"\ntimeout_secs = 0");
        assert!(parse_config(&content).is_err());
    }
}
