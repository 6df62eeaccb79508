//! Configuration management for Brocatel.
//!
//! Parses `brocatel.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `story.source_dir`
//! - `story.entry`
//! - `story.output`
//! - `gettext.output`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override story source directory.
    pub source_dir: Option<PathBuf>,
    /// Override entry file stem.
    pub entry: Option<String>,
    /// Override bundle output path.
    pub output: Option<PathBuf>,
    /// Override debug flag.
    pub debug: Option<bool>,
    /// Override translation template output path.
    pub gettext_output: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "brocatel.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Story configuration (paths are relative strings from TOML).
    story: StoryConfigRaw,
    /// Compiler switches.
    pub compiler: CompilerConfig,
    /// Translation template configuration.
    gettext: GettextConfigRaw,

    /// Resolved story configuration (set after loading).
    #[serde(skip)]
    pub story_resolved: StoryConfig,
    /// Resolved translation template path (set after loading).
    #[serde(skip)]
    pub gettext_output: Option<PathBuf>,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw story configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StoryConfigRaw {
    source_dir: Option<String>,
    entry: Option<String>,
    output: Option<String>,
}

/// Resolved story configuration with absolute paths.
#[derive(Debug, Default)]
pub struct StoryConfig {
    /// Directory holding `<stem>.md` files.
    pub source_dir: PathBuf,
    /// Entry file stem.
    pub entry: String,
    /// Explicit bundle path.
    pub output: Option<PathBuf>,
}

impl StoryConfig {
    /// Bundle path: the configured one, or `<entry>.lua` beside the sources.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.source_dir.join(format!("{}.lua", self.entry)))
    }
}

/// Compiler switches.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Record positions in the bundle for runtime debugging.
    pub debug: bool,
    /// Treat every source line as its own paragraph.
    pub auto_new_line: bool,
    /// Split multi-line paragraphs into one paragraph per line.
    pub split_paragraphs: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            auto_new_line: false,
            split_paragraphs: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct GettextConfigRaw {
    output: Option<String>,
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
        /// Config field path (e.g., "`story.source_dir`").
        field: String,
        /// Error message (e.g., "${`STORY_DIR`} not set").
        message: String,
    },
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `brocatel.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the resulting configuration is invalid.
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
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(source_dir) = &settings.source_dir {
            self.story_resolved.source_dir.clone_from(source_dir);
        }
        if let Some(entry) = &settings.entry {
            self.story_resolved.entry.clone_from(entry);
        }
        if let Some(output) = &settings.output {
            self.story_resolved.output = Some(output.clone());
        }
        if let Some(debug) = settings.debug {
            self.compiler.debug = debug;
        }
        if let Some(gettext_output) = &settings.gettext_output {
            self.gettext_output = Some(gettext_output.clone());
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

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            story: StoryConfigRaw::default(),
            compiler: CompilerConfig::default(),
            gettext: GettextConfigRaw::default(),
            story_resolved: StoryConfig {
                source_dir: base.to_path_buf(),
                entry: "main".to_owned(),
                output: None,
            },
            gettext_output: None,
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let entry = &self.story_resolved.entry;
        if entry.is_empty() {
            return Err(ConfigError::Validation(
                "story.entry cannot be empty".to_owned(),
            ));
        }
        if entry.ends_with(".md") {
            return Err(ConfigError::Validation(format!(
                "story.entry must be a file stem without .md, got {entry}"
            )));
        }
        if entry.contains(['/', '\\']) {
            return Err(ConfigError::Validation(format!(
                "story.entry must name a file inside story.source_dir, got {entry}"
            )));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        expand::expand_opt(&mut self.story.source_dir, "story.source_dir")?;
        expand::expand_opt(&mut self.story.entry, "story.entry")?;
        expand::expand_opt(&mut self.story.output, "story.output")?;
        expand::expand_opt(&mut self.gettext.output, "gettext.output")?;
        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.story_resolved = StoryConfig {
            source_dir: config_dir.join(self.story.source_dir.as_deref().unwrap_or(".")),
            entry: self.story.entry.clone().unwrap_or_else(|| "main".to_owned()),
            output: self.story.output.as_deref().map(|p| config_dir.join(p)),
        };
        self.gettext_output = self.gettext.output.as_deref().map(|p| config_dir.join(p));
    }
}
