//! Configuration module for the dev server.
//!
//! Layered configuration:
//! - Default values
//! - `<config_dir>/storydev.toml`
//! - Environment variable overrides
//! - CLI argument overrides (applied by the caller)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SD_` and use double underscores
//! to separate nested levels:
//! - `SD_SERVER__PORT=6007` sets `server.port`
//! - `SD_FEATURES__STORY_STORE_V7=true` sets `features.story_store_v7`
//! - `SD_FILE_WATCH__DEBOUNCE_MS=250` sets `file_watch.debounce_ms`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::stories::StoriesEntry;

/// Name of the settings file inside the config directory.
pub const SETTINGS_FILE: &str = "storydev.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding the workshop configuration (`.storybook` by default)
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Directory import paths are computed against (current dir when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Story specifiers, in declaration order
    #[serde(default)]
    pub stories: Vec<StoriesEntry>,

    /// Preview annotation files (`preview.js` and addon previews)
    #[serde(default)]
    pub preview_annotations: Vec<String>,

    #[serde(default)]
    pub features: FeaturesConfig,

    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub file_watch: FileWatchConfig,

    /// Options forwarded to the preview bundler
    #[serde(default)]
    pub builder: BuilderOptions,

    #[serde(default)]
    pub framework: FrameworkConfig,

    /// External bundler commands per target
    #[serde(default)]
    pub builders: BuildersConfig,

    /// Capabilities to register regardless of detection
    #[serde(default)]
    pub plugins: Vec<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FeaturesConfig {
    /// Serve `stories.json` even without the v7 store
    #[serde(default)]
    pub build_stories_json: bool,

    /// On-demand story store; selects the consolidated virtual entries
    #[serde(default)]
    pub story_store_v7: bool,
}

impl FeaturesConfig {
    /// Whether the active feature set needs a story index at startup.
    pub fn needs_index(&self) -> bool {
        self.build_stories_json || self.story_store_v7
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoreConfig {
    #[serde(default)]
    pub disable_telemetry: bool,

    /// Remote collector for telemetry events; events are only logged when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_endpoint: Option<String>,

    /// Where builders write manifests and caches
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Interface to bind; all interfaces when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// User static directories mounted at the server root
    #[serde(default)]
    pub static_dirs: Vec<PathBuf>,

    #[serde(default = "default_true")]
    pub open: bool,

    #[serde(default)]
    pub ci: bool,

    #[serde(default)]
    pub smoke_test: bool,

    /// Skip the preview build entirely
    #[serde(default)]
    pub ignore_preview: bool,

    /// Log both builders' configuration before starting them
    #[serde(default)]
    pub debug_config: bool,

    /// Capacity of the server channel broadcast buffer, at least 1
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: NonZeroUsize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FileWatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Invalidation coalescing window
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Emit once more at the end of a window that saw suppressed calls
    #[serde(default)]
    pub trailing: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct BuilderOptions {
    /// Compile stories on first import instead of up front
    #[serde(default)]
    pub lazy_compilation: bool,

    #[serde(default)]
    pub fs_cache: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrameworkConfig {
    /// Framework package imported by the legacy init entry
    #[serde(default = "default_framework")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svelte: Option<SvelteOptions>,
}

/// Svelte compiler options the preview bundler understands.
///
/// Unknown keys are rejected rather than passed through.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SvelteOptions {
    #[serde(default = "default_svelte_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub emit_css: bool,

    #[serde(default = "default_true")]
    pub hot: bool,

    /// Attach component docs to `.svelte` modules
    #[serde(default = "default_true")]
    pub docgen: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct BuildersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<CommandConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<CommandConfig>,
}

/// An external bundler process.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommandConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Regex matched against stdout lines; the build counts as started on first match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides
    #[serde(default)]
    pub modules: IndexMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_config_dir() -> PathBuf {
    PathBuf::from(".storybook")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("node_modules/.cache/storydev")
}
fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    6006
}
fn default_channel_capacity() -> NonZeroUsize {
    const CAPACITY: NonZeroUsize = NonZeroUsize::new(100).unwrap();
    CAPACITY
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_framework() -> String {
    "@storybook/react".to_string()
}
fn default_svelte_extensions() -> Vec<String> {
    vec![".svelte".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            config_dir: default_config_dir(),
            working_dir: None,
            stories: Vec::new(),
            preview_annotations: Vec::new(),
            features: FeaturesConfig::default(),
            core: CoreConfig::default(),
            server: ServerConfig::default(),
            file_watch: FileWatchConfig::default(),
            builder: BuilderOptions::default(),
            framework: FrameworkConfig::default(),
            builders: BuildersConfig::default(),
            plugins: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            disable_telemetry: false,
            telemetry_endpoint: None,
            cache_dir: default_cache_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: None,
            static_dirs: Vec::new(),
            open: true,
            ci: false,
            smoke_test: false,
            ignore_preview: false,
            debug_config: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for FileWatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            trailing: false,
        }
    }
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            name: default_framework(),
            svelte: None,
        }
    }
}

impl Default for SvelteOptions {
    fn default() -> Self {
        Self {
            extensions: default_svelte_extensions(),
            emit_css: false,
            hot: true,
            docgen: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: IndexMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration for a config directory from all sources.
    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        let config_dir = config_dir.as_ref();
        let mut settings = Self::load_from(config_dir.join(SETTINGS_FILE))?;
        settings.config_dir = config_dir.to_path_buf();
        Ok(settings)
    }

    /// Load configuration from a specific file plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nesting, single underscore stays in field names
            .merge(Env::prefixed("SD_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Directory import paths are relative to.
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Config directory resolved against the working directory.
    pub fn resolved_config_dir(&self) -> PathBuf {
        if self.config_dir.is_absolute() {
            self.config_dir.clone()
        } else {
            self.working_dir().join(&self.config_dir)
        }
    }

    /// Svelte options when the framework is svelte-based, defaults filled in.
    pub fn svelte_options(&self) -> Option<SvelteOptions> {
        if self.framework.name.contains("svelte") {
            Some(self.framework.svelte.clone().unwrap_or_default())
        } else {
            None
        }
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in `config_dir`.
    pub fn init_config_file(
        config_dir: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = config_dir.as_ref().join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let settings = Settings {
            stories: vec![StoriesEntry::Glob(
                "../src/**/*.stories.@(js|jsx|ts|tsx)".to_string(),
            )],
            ..Settings::default()
        };
        settings.save(&config_path)?;

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.server.port, 6006);
        assert_eq!(settings.file_watch.debounce_ms, 100);
        assert!(!settings.file_watch.trailing);
        assert!(!settings.features.needs_index());
        assert!(settings.stories.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(SETTINGS_FILE);

        let toml_content = r#"
stories = ["../src/**/*.stories.tsx", { directory = "../lib", title_prefix = "Lib" }]
preview_annotations = ["./preview.js"]

[features]
story_store_v7 = true

[server]
port = 9009
ci = true

[builder]
lazy_compilation = true
"#;
        std::fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load(temp_dir.path()).unwrap();
        assert_eq!(settings.server.port, 9009);
        assert!(settings.server.ci);
        assert!(settings.features.story_store_v7);
        assert!(settings.features.needs_index());
        assert!(settings.builder.lazy_compilation);
        assert_eq!(settings.stories.len(), 2);
        assert_eq!(settings.preview_annotations, vec!["./preview.js".to_string()]);
        assert_eq!(settings.config_dir, temp_dir.path());
    }

    #[test]
    fn test_svelte_options_reject_unknown_keys() {
        let result: Result<SvelteOptions, _> = toml::from_str("hot = false\npreprocess = true\n");
        assert!(result.is_err());

        let options: SvelteOptions = toml::from_str("hot = false").unwrap();
        assert!(!options.hot);
        assert!(options.docgen);
        assert_eq!(options.extensions, vec![".svelte".to_string()]);
    }

    #[test]
    fn test_svelte_options_only_for_svelte_frameworks() {
        let mut settings = Settings::default();
        assert!(settings.svelte_options().is_none());

        settings.framework.name = "@storybook/svelte-vite".to_string();
        assert_eq!(settings.svelte_options(), Some(SvelteOptions::default()));
    }

    #[test]
    fn test_init_config_file_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.exists());
        assert!(Settings::init_config_file(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());

        let settings = Settings::load(temp_dir.path()).unwrap();
        assert_eq!(settings.stories.len(), 1);
    }
}
