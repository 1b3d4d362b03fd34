//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSPACE_CONFIG` (environment variable)
//! 2. `~/.config/mailspace/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailspace\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! The file is kept string-typed ([`ConfigFile`]). Before any message is
//! processed it is accepted into an immutable [`Configuration`], which is where
//! routing rules are validated.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MailspaceError, Result, RuleValidationError};
use crate::model::rule::{ContentKind, Rule};
use crate::policy::{FileTypeBucket, FileTypeEntry, KnownSpaces, SpaceValidator};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Destination routing.
    pub routing: RoutingConfig,
    /// Content and attachment extraction.
    pub extraction: ExtractionConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Destination routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Space every message lands in unless a move rule matched.
    pub default_space: String,
    /// Content type used for the default space: "blog" or "page".
    pub default_content_type: String,
    /// Space keys that exist in the target wiki.
    pub known_spaces: Vec<String>,
    /// Rules, evaluated in order.
    pub rules: Vec<RuleConfig>,
}

/// A routing rule as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// "from", "to", "cc", "to/cc" or "subject".
    pub field: String,
    /// "is", "contains", "start", "end" or "regexp".
    pub operator: String,
    /// Value to compare against, or the pattern for "regexp".
    pub value: String,
    /// "copy" or "move".
    pub action: String,
    /// Space key, or "_group_0" / "_group_1" for regexp rules.
    pub space: String,
    /// "blog" or "page".
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

/// Content and attachment extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Content types kept from `multipart/alternative`, most preferred first.
    pub preferred_content_types: Vec<String>,
    /// Maximum attachment size in bytes (default: 104857600 = 100 MB).
    pub max_attachment_bytes: u64,
    /// Maximum number of attachments per message; negative means unlimited.
    pub max_attachment_count: i64,
    /// Allowed attachment types. Built-in list when absent.
    pub file_types: Option<Vec<FileTypeEntry>>,
}

// ── Default implementations ─────────────────────────────────────

fn default_content_type() -> String {
    ContentKind::Blog.as_str().to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_space: String::new(),
            default_content_type: default_content_type(),
            known_spaces: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            preferred_content_types: default_preferred_content_types(),
            max_attachment_bytes: 100 * 1024 * 1024, // 100 MB
            max_attachment_count: -1,
            file_types: None,
        }
    }
}

fn default_preferred_content_types() -> Vec<String> {
    ["text/html", "application/xhtml+xml", "text/plain"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// ── Accepted configuration ──────────────────────────────────────

/// Validated, immutable configuration shared by the extractor and the router.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub default_space: String,
    pub default_content_type: ContentKind,
    /// Rules in evaluation order.
    pub rules: Vec<Rule>,
    pub preferred_content_types: Vec<String>,
    pub max_attachment_bytes: u64,
    /// Negative means unlimited.
    pub max_attachment_count: i64,
}

impl Default for Configuration {
    fn default() -> Self {
        let extraction = ExtractionConfig::default();
        Self {
            default_space: String::new(),
            default_content_type: ContentKind::Blog,
            rules: Vec::new(),
            preferred_content_types: extraction.preferred_content_types,
            max_attachment_bytes: extraction.max_attachment_bytes,
            max_attachment_count: extraction.max_attachment_count,
        }
    }
}

impl Configuration {
    /// Validate a configuration file.
    ///
    /// Every rule is checked against `spaces`; the first invalid rule rejects
    /// the whole configuration.
    pub fn accept(file: &ConfigFile, spaces: &dyn SpaceValidator) -> Result<Self> {
        let default_content_type: ContentKind = file.routing.default_content_type.parse()?;

        let rules = file
            .routing
            .rules
            .iter()
            .enumerate()
            .map(|(i, raw)| Rule::from_config(raw, spaces).map_err(|e| e.at_rule(i)))
            .collect::<std::result::Result<Vec<_>, RuleValidationError>>()?;

        tracing::debug!(rules = rules.len(), "Accepted configuration");

        Ok(Self {
            default_space: file.routing.default_space.clone(),
            default_content_type,
            rules,
            preferred_content_types: file
                .extraction
                .preferred_content_types
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            max_attachment_bytes: file.extraction.max_attachment_bytes,
            max_attachment_count: file.extraction.max_attachment_count,
        })
    }
}

impl ConfigFile {
    /// Spaces listed under `routing.known_spaces`.
    pub fn known_spaces(&self) -> KnownSpaces {
        KnownSpaces::new(self.routing.known_spaces.iter().cloned())
    }

    /// The configured attachment allow-list, or the built-in one.
    pub fn file_type_bucket(&self) -> FileTypeBucket {
        match &self.extraction.file_types {
            Some(entries) => FileTypeBucket::new(entries.iter().cloned()),
            None => FileTypeBucket::default(),
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> ConfigFile {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match load_config_from(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path.display(), "Loaded config");
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load config, using defaults"
                    );
                }
            }
        }
    }
    ConfigFile::default()
}

/// Load configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MailspaceError::FileNotFound(path.to_path_buf())
        } else {
            MailspaceError::io(path, e)
        }
    })?;
    toml::from_str::<ConfigFile>(&contents)
        .map_err(|e| MailspaceError::Config(format!("{}: {e}", path.display())))
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSPACE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailspace").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &ConfigFile) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailspace")
}

/// Return the log file path.
pub fn log_file_path(config: &ConfigFile) -> PathBuf {
    cache_dir(config).join("mailspace.log")
}
