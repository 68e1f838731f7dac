//! Configuration management for ked.
//!
//! Parses `ked.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! `kroki.server_url` supports environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ked_render::{
    ConfigProvider, DEFAULT_CACHE_ENTRIES, DEFAULT_SERVER_URL, DEFAULT_URL_LENGTH_THRESHOLD,
    DiagramType, OutputFormat, PostFormat, RenderSettings, ZoomLimits,
};
use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override Kroki server URL.
    pub server_url: Option<String>,
    /// Override forced POST.
    pub always_use_post: Option<bool>,
    /// Override POST body format ("plain" or "json").
    pub post_format: Option<String>,
    /// Override request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Override debounce delay in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Override render cache enabled flag.
    pub cache_enabled: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "ked.toml";

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rendering service configuration.
    pub kroki: KrokiConfig,
    /// Editor behavior.
    pub editor: EditorConfig,
    /// Viewport zoom limits.
    pub zoom: ZoomConfig,
    /// Render cache.
    pub cache: CacheConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Kroki service configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KrokiConfig {
    /// Base URL of the Kroki-compatible service.
    pub server_url: String,
    /// Send every request as POST.
    pub always_use_post: bool,
    /// Maximum GET URL length, in characters, before switching to POST.
    pub url_length_threshold: usize,
    /// Request timeout in milliseconds.
    pub post_request_timeout: u64,
    /// POST body format: "plain" or "json".
    pub post_format: String,
}

impl Default for KrokiConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            always_use_post: false,
            url_length_threshold: DEFAULT_URL_LENGTH_THRESHOLD,
            post_request_timeout: 30_000,
            post_format: PostFormat::Plain.as_str().to_owned(),
        }
    }
}

/// Editor configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Delay after the last edit before rendering, in milliseconds.
    pub debounce_delay: u64,
    /// Render automatically on edits.
    pub auto_refresh: bool,
    pub default_diagram_type: String,
    pub default_output_format: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce_delay: 1000,
            auto_refresh: true,
            default_diagram_type: "plantuml".to_owned(),
            default_output_format: "svg".to_owned(),
        }
    }
}

/// Zoom configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    pub scale_step: f64,
    /// Padding kept around the diagram when fitting to the viewport.
    pub reset_padding: f64,
    /// Keep the user's zoom/pan across re-renders.
    pub preserve_state_on_update: bool,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        let limits = ZoomLimits::default();
        Self {
            min_scale: limits.min_scale,
            max_scale: limits.max_scale,
            scale_step: limits.scale_step,
            reset_padding: limits.fit_padding,
            preserve_state_on_update: true,
        }
    }
}

/// Render cache configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_CACHE_ENTRIES,
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
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`kroki.server_url`").
        field: String,
        /// Error message (e.g., "${`KROKI_URL`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

/// Require a number to be finite and strictly positive.
fn require_positive(value: f64, field: &str) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `ked.toml` in current directory and parents,
    /// falling back to defaults.
    ///
    /// CLI settings are applied after loading and validated with the rest of
    /// the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
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
        } else if let Some(discovered) = Self::discover_config() {
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
        if let Some(server_url) = &settings.server_url {
            self.kroki.server_url.clone_from(server_url);
        }
        if let Some(always_use_post) = settings.always_use_post {
            self.kroki.always_use_post = always_use_post;
        }
        if let Some(post_format) = &settings.post_format {
            self.kroki.post_format.clone_from(post_format);
        }
        if let Some(timeout_ms) = settings.timeout_ms {
            self.kroki.post_request_timeout = timeout_ms;
        }
        if let Some(debounce_ms) = settings.debounce_ms {
            self.editor.debounce_delay = debounce_ms;
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            self.cache.enabled = cache_enabled;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
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

        config.expand_env_vars()?;
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.kroki.server_url = expand::expand_env(&self.kroki.server_url, "kroki.server_url")?;
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_kroki()?;
        self.validate_editor()?;
        self.validate_zoom()?;
        Ok(())
    }

    fn validate_kroki(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.kroki.server_url, "kroki.server_url")?;
        require_http_url(&self.kroki.server_url, "kroki.server_url")?;

        if self.kroki.url_length_threshold == 0 {
            return Err(ConfigError::Validation(
                "kroki.url_length_threshold must be greater than 0".to_owned(),
            ));
        }
        if self.kroki.post_request_timeout == 0 {
            return Err(ConfigError::Validation(
                "kroki.post_request_timeout must be greater than 0".to_owned(),
            ));
        }
        self.post_format()?;
        Ok(())
    }

    fn validate_editor(&self) -> Result<(), ConfigError> {
        self.default_request_kind()?;
        Ok(())
    }

    fn validate_zoom(&self) -> Result<(), ConfigError> {
        require_positive(self.zoom.min_scale, "zoom.min_scale")?;
        require_positive(self.zoom.max_scale, "zoom.max_scale")?;
        require_positive(self.zoom.scale_step, "zoom.scale_step")?;

        if self.zoom.min_scale >= self.zoom.max_scale {
            return Err(ConfigError::Validation(
                "zoom.min_scale must be less than zoom.max_scale".to_owned(),
            ));
        }
        if !self.zoom.reset_padding.is_finite() || self.zoom.reset_padding < 0.0 {
            return Err(ConfigError::Validation(
                "zoom.reset_padding cannot be negative".to_owned(),
            ));
        }
        Ok(())
    }

    /// Parsed `kroki.post_format`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for values other than "plain" and "json".
    pub fn post_format(&self) -> Result<PostFormat, ConfigError> {
        PostFormat::parse(&self.kroki.post_format).ok_or_else(|| {
            ConfigError::Validation(format!(
                "kroki.post_format must be \"plain\" or \"json\", got \"{}\"",
                self.kroki.post_format
            ))
        })
    }

    /// Default diagram type and output format for new documents.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the type or format is unknown, or
    /// the type cannot be rendered in that format.
    pub fn default_request_kind(&self) -> Result<(DiagramType, OutputFormat), ConfigError> {
        let diagram_type =
            DiagramType::parse(&self.editor.default_diagram_type).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "editor.default_diagram_type: unknown diagram type \"{}\"",
                    self.editor.default_diagram_type
                ))
            })?;
        let output_format =
            OutputFormat::parse(&self.editor.default_output_format).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "editor.default_output_format: unknown output format \"{}\"",
                    self.editor.default_output_format
                ))
            })?;
        if !diagram_type.supports(output_format) {
            return Err(ConfigError::Validation(format!(
                "editor.default_output_format: {diagram_type} cannot be rendered as {output_format}"
            )));
        }
        Ok((diagram_type, output_format))
    }

    #[must_use]
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.editor.debounce_delay)
    }

    /// Render settings for the core pipeline.
    ///
    /// Assumes the configuration has been validated; an invalid POST format
    /// falls back to plain.
    #[must_use]
    pub fn to_render_settings(&self) -> RenderSettings {
        RenderSettings {
            always_use_post: self.kroki.always_use_post,
            url_length_threshold: self.kroki.url_length_threshold,
            request_timeout: Duration::from_millis(self.kroki.post_request_timeout),
            post_format: self.post_format().unwrap_or_default(),
            debounce_delay: self.debounce_delay(),
            preserve_zoom_on_update: self.zoom.preserve_state_on_update,
            zoom: ZoomLimits {
                min_scale: self.zoom.min_scale,
                max_scale: self.zoom.max_scale,
                scale_step: self.zoom.scale_step,
                fit_padding: self.zoom.reset_padding,
            },
            ..RenderSettings::for_server(&self.kroki.server_url)
        }
    }
}

impl ConfigProvider for Config {
    fn render_settings(&self) -> RenderSettings {
        self.to_render_settings()
    }
}
