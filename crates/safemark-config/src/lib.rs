//! Configuration management for safemark.
//!
//! Parses `safemark.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ```toml
//! [policy]
//! allowed_elements = ["p", "a", "em", "strong"]
//! skip_html = false
//! unwrap_disallowed = true
//!
//! [markdown]
//! gfm = true
//! allow_dangerous_html = true
//! normalize_line_breaks = true
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
/// Setting either element list replaces both lists from the file.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the allow-list.
    pub allowed_elements: Option<Vec<String>>,
    /// Override the deny-list.
    pub disallowed_elements: Option<Vec<String>>,
    /// Override the skip-html flag.
    pub skip_html: Option<bool>,
    /// Override the unwrap flag.
    pub unwrap_disallowed: Option<bool>,
}

/// Configuration filename to search for.
pub const CONFIG_FILENAME: &str = "safemark.toml";

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Element and raw HTML policy.
    pub policy: PolicyConfig,
    /// Markdown parsing options.
    pub markdown: MarkdownConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Element and raw HTML policy.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Only these tags are kept.
    pub allowed_elements: Option<Vec<String>>,
    /// These tags are removed.
    pub disallowed_elements: Option<Vec<String>>,
    /// Drop raw HTML instead of showing it as text.
    pub skip_html: bool,
    /// Replace removed elements with their children.
    pub unwrap_disallowed: bool,
}

/// Markdown parsing options.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarkdownConfig {
    /// Enable GitHub Flavored Markdown extensions.
    pub gfm: bool,
    /// Keep raw HTML for the policy pass.
    pub allow_dangerous_html: bool,
    /// Turn single line breaks into paragraph breaks.
    pub normalize_line_breaks: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            gfm: true,
            allow_dangerous_html: true,
            normalize_line_breaks: true,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `safemark.toml` in current directory and parents,
    /// falling back to defaults.
    ///
    /// CLI settings are applied after loading; validation runs last.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails, or
    /// the resulting configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = std::env::current_dir()
            .ok()
            .and_then(|cwd| Self::discover_config(&cwd))
        {
            tracing::debug!(path = %discovered.display(), "Discovered config file");
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if settings.allowed_elements.is_some() || settings.disallowed_elements.is_some() {
            self.policy
                .allowed_elements
                .clone_from(&settings.allowed_elements);
            self.policy
                .disallowed_elements
                .clone_from(&settings.disallowed_elements);
        }
        if let Some(skip_html) = settings.skip_html {
            self.policy.skip_html = skip_html;
        }
        if let Some(unwrap_disallowed) = settings.unwrap_disallowed {
            self.policy.unwrap_disallowed = unwrap_disallowed;
        }
    }

    /// Search for config file in `start` and its parents.
    fn discover_config(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if both element lists are set or a
    /// list contains an empty tag name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let policy = &self.policy;
        if policy.allowed_elements.is_some() && policy.disallowed_elements.is_some() {
            return Err(ConfigError::Validation(
                "policy.allowed_elements and policy.disallowed_elements cannot both be set"
                    .to_owned(),
            ));
        }
        require_tag_names(policy.allowed_elements.as_deref(), "policy.allowed_elements")?;
        require_tag_names(
            policy.disallowed_elements.as_deref(),
            "policy.disallowed_elements",
        )?;
        Ok(())
    }
}

/// Require every tag name in a list to be non-empty.
fn require_tag_names(tags: Option<&[String]>, field: &str) -> Result<(), ConfigError> {
    if tags.is_some_and(|tags| tags.iter().any(|tag| tag.trim().is_empty())) {
        return Err(ConfigError::Validation(format!(
            "{field} cannot contain empty tag names"
        )));
    }
    Ok(())
}
