//! Settings file.
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 512
//!
//! [[dialects]]
//! name = "pg-qmark"
//! base = "postgres"
//! placeholder = "question"
//! disabled_capabilities = ["ADVISORY_LOCK"]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dialect::{Capability, DialectDescriptor, PlaceholderStyle, QuoteStyle};

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheConfig,
    pub dialects: Vec<DialectConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// A named dialect derived from one of the built-in presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialectConfig {
    pub name: String,
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<PlaceholderStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<QuoteStyle>,
    /// Replaces the preset's capability set when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<Capability>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_capabilities: Vec<Capability>,
}

impl DialectConfig {
    pub fn build(&self) -> Result<DialectDescriptor> {
        let Some(mut dialect) = DialectDescriptor::preset(&self.base) else {
            bail!(
                "dialect `{}` has unknown base `{}` (expected postgres, mysql, sqlite or ansi)",
                self.name,
                self.base
            );
        };
        dialect = dialect.with_name(self.name.as_str());
        if let Some(placeholder) = self.placeholder {
            dialect = dialect.with_placeholder(placeholder);
        }
        if let Some(quote) = self.quote {
            dialect = dialect.with_quote(quote);
        }
        if let Some(capabilities) = &self.capabilities {
            dialect = dialect.with_capabilities(capabilities.iter().copied());
        }
        for capability in &self.disabled_capabilities {
            dialect = dialect.without_capability(*capability);
        }
        Ok(dialect)
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sqlforge")
            .join("config.toml")
    }

    /// Load from the default path, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid settings file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content).context("Failed to parse settings")?;
        if settings.cache.capacity == 0 {
            bail!("cache.capacity must be at least 1");
        }
        for dialect in &settings.dialects {
            dialect.build()?;
        }
        Ok(settings)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }

    /// Resolve a dialect by name: configured dialects first, then presets.
    pub fn dialect(&self, name: &str) -> Result<DialectDescriptor> {
        if let Some(config) = self.dialects.iter().find(|d| d.name == name) {
            return config.build();
        }
        DialectDescriptor::preset(name).with_context(|| format!("Unknown dialect: {}", name))
    }
}
