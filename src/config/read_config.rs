//! Configuration file reading, parsing, and validation.
//!
//! Locates and parses the INI-format configuration file, layers command-line
//! overrides on top, and validates the result. Validation failures are fatal:
//! the process must not come up with a partially-configured sync engine.

use std::env;
use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use thiserror::Error;
use url::Url;

use super::{CloneMethod, Config, FsConfig, GitConfig, GitlabConfig, PullMethod};

// =============================================================================
// Constants - Default Values
// =============================================================================

const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";
const DEFAULT_GROUP_IDS: &[u64] = &[9970];
const DEFAULT_INCLUDE_CURRENT_USER: bool = true;
const DEFAULT_MOUNT_OPTIONS: &str = "nodev,nosuid";
const DEFAULT_REMOTE_NAME: &str = "origin";
const DEFAULT_DEPTH: u32 = 0;
const DEFAULT_QUEUE_SIZE: usize = 200;
const DEFAULT_WORKER_COUNT: usize = 5;

const ENV_CONFIG_FILE: &str = "GITLABFS_CONFIG_FILE";
const DEFAULT_CONFIG_FILENAME: &str = ".config/gitlabfs.ini";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid integer '{value}' for key '{key}'")]
    InvalidInteger { key: String, value: String },

    #[error("invalid boolean '{value}' for key '{key}'")]
    InvalidBoolean { key: String, value: String },

    #[error("invalid gitlab url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("pull_method must be either \"http\" or \"ssh\", got '{0}'")]
    InvalidPullMethod(String),

    #[error("on_clone must be either \"init\" or \"clone\", got '{0}'")]
    InvalidCloneMethod(String),

    #[error("queue_size must be at least 1, got {0}")]
    InvalidQueueSize(usize),

    #[error("worker_count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    #[error("invalid override key '{key}': {message}")]
    InvalidOverrideKey { key: String, message: String },
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// =============================================================================
// ConfigSource
// =============================================================================

/// Specifies how to locate and layer configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    /// Explicit config file path from the CLI. If specified and missing,
    /// error. If None, fall back to GITLABFS_CONFIG_FILE, then
    /// ~/.config/gitlabfs.ini.
    pub config_file: Option<PathBuf>,

    /// Individual key=value overrides (applied last).
    /// Keys use dot-notation: "git.auto_pull", "gitlab.token".
    pub overrides: Vec<(String, String)>,
}

// =============================================================================
// Value Parsing
// =============================================================================

impl PullMethod {
    /// Parse a config value into a pull method.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "http" => Ok(PullMethod::Http),
            "ssh" => Ok(PullMethod::Ssh),
            _ => Err(ConfigError::InvalidPullMethod(s.to_string())),
        }
    }
}

impl CloneMethod {
    /// Parse a config value into a clone method.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "init" => Ok(CloneMethod::Init),
            "clone" => Ok(CloneMethod::Clone),
            _ => Err(ConfigError::InvalidCloneMethod(s.to_string())),
        }
    }
}

fn parse_bool_value(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_u64_value(key: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| ConfigError::InvalidInteger {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize_value(key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| ConfigError::InvalidInteger {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32_value(key: &str, value: &str) -> Result<u32> {
    value.trim().parse().map_err(|_| ConfigError::InvalidInteger {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Parse a comma-separated list of numeric ids.
fn parse_id_list(key: &str, value: &str) -> Result<Vec<u64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_u64_value(key, s))
        .collect()
}

/// Split a comma-separated option string, dropping empty entries.
fn parse_comma_separated(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// =============================================================================
// Config File Resolution
// =============================================================================

/// Information about how the config file was resolved.
#[derive(Debug)]
pub struct ResolvedConfigFile {
    /// The path to the config file, if one was found.
    pub path: Option<PathBuf>,
    /// Warning message if the env var pointed at a nonexistent file.
    pub warning: Option<String>,
}

/// Resolve which config file to use based on the ConfigSource and environment.
fn resolve_config_file(source: &ConfigSource) -> Result<ResolvedConfigFile> {
    // If an explicit path was provided, it must exist.
    if let Some(ref path) = source.config_file {
        if path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(path.clone()),
                warning: None,
            });
        } else {
            return Err(ConfigError::FileNotFound(path.clone()));
        }
    }

    if let Ok(env_path) = env::var(ENV_CONFIG_FILE) {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(path),
                warning: None,
            });
        } else {
            // Warn but continue with defaults.
            return Ok(ResolvedConfigFile {
                path: None,
                warning: Some(format!(
                    "config file specified by {} does not exist: {}",
                    ENV_CONFIG_FILE, env_path
                )),
            });
        }
    }

    if let Some(home) = home_dir() {
        let default_path = home.join(DEFAULT_CONFIG_FILENAME);
        if default_path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(default_path),
                warning: None,
            });
        }
    }

    Ok(ResolvedConfigFile {
        path: None,
        warning: None,
    })
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

/// Default root for local working copies: $XDG_DATA_HOME/gitlabfs, falling
/// back to ~/.local/share/gitlabfs.
fn default_clone_location() -> PathBuf {
    if let Some(data_home) = env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join("gitlabfs");
    }
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local/share")
        .join("gitlabfs")
}

// =============================================================================
// Default Config
// =============================================================================

/// Create a Config with all default values.
fn default_config() -> Config {
    Config {
        fs: FsConfig {
            mountpoint: None,
            mount_options: parse_comma_separated(DEFAULT_MOUNT_OPTIONS),
        },
        gitlab: GitlabConfig {
            url: DEFAULT_GITLAB_URL.to_string(),
            token: None,
            group_ids: DEFAULT_GROUP_IDS.to_vec(),
            user_ids: Vec::new(),
            include_current_user: DEFAULT_INCLUDE_CURRENT_USER,
        },
        git: GitConfig {
            clone_location: default_clone_location(),
            remote_name: DEFAULT_REMOTE_NAME.to_string(),
            pull_method: PullMethod::Http,
            on_clone: CloneMethod::Init,
            auto_pull: false,
            depth: DEFAULT_DEPTH,
            queue_size: DEFAULT_QUEUE_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
        },
    }
}

// =============================================================================
// INI Parsing
// =============================================================================

/// Apply an INI file's contents to a Config, layering on top of existing
/// values.
fn apply_ini_to_config(config: &mut Config, ini: &Ini) -> Result<()> {
    // [fs] section
    if let Some(mountpoint) = ini.get("fs", "mountpoint") {
        config.fs.mountpoint = Some(PathBuf::from(mountpoint));
    }
    if let Some(options) = ini.get("fs", "mountoptions") {
        config.fs.mount_options = parse_comma_separated(&options);
    }

    // [gitlab] section
    if let Some(url) = ini.get("gitlab", "url") {
        config.gitlab.url = url;
    }
    if let Some(token) = ini.get("gitlab", "token") {
        config.gitlab.token = if token.is_empty() { None } else { Some(token) };
    }
    if let Some(ids) = ini.get("gitlab", "group_ids") {
        config.gitlab.group_ids = parse_id_list("gitlab.group_ids", &ids)?;
    }
    if let Some(ids) = ini.get("gitlab", "user_ids") {
        config.gitlab.user_ids = parse_id_list("gitlab.user_ids", &ids)?;
    }
    if let Some(v) = ini.get("gitlab", "include_current_user") {
        config.gitlab.include_current_user = parse_bool_value("gitlab.include_current_user", &v)?;
    }

    // [git] section
    if let Some(location) = ini.get("git", "clone_location") {
        config.git.clone_location = PathBuf::from(location);
    }
    if let Some(remote) = ini.get("git", "remote") {
        config.git.remote_name = remote;
    }
    if let Some(v) = ini.get("git", "pull_method") {
        config.git.pull_method = PullMethod::parse(&v)?;
    }
    if let Some(v) = ini.get("git", "on_clone") {
        config.git.on_clone = CloneMethod::parse(&v)?;
    }
    if let Some(v) = ini.get("git", "auto_pull") {
        config.git.auto_pull = parse_bool_value("git.auto_pull", &v)?;
    }
    if let Some(v) = ini.get("git", "depth") {
        config.git.depth = parse_u32_value("git.depth", &v)?;
    }
    if let Some(v) = ini.get("git", "queue_size") {
        config.git.queue_size = parse_usize_value("git.queue_size", &v)?;
    }
    if let Some(v) = ini.get("git", "worker_count") {
        config.git.worker_count = parse_usize_value("git.worker_count", &v)?;
    }

    Ok(())
}

/// Load and parse an INI file.
fn load_ini(path: &Path) -> Result<Ini> {
    let mut ini = Ini::new();
    ini.load(path).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e,
    })?;
    Ok(ini)
}

// =============================================================================
// Override Application
// =============================================================================

/// Apply a single key=value override to the config.
fn apply_override(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.splitn(2, '.').collect();

    match parts.as_slice() {
        ["fs", param] => apply_fs_override(config, param, value),
        ["gitlab", param] => apply_gitlab_override(config, param, value),
        ["git", param] => apply_git_override(config, param, value),
        _ => Err(ConfigError::InvalidOverrideKey {
            key: key.to_string(),
            message: "unrecognized key format".to_string(),
        }),
    }
}

fn apply_fs_override(config: &mut Config, param: &str, value: &str) -> Result<()> {
    match param {
        "mountpoint" => {
            config.fs.mountpoint = Some(PathBuf::from(value));
            Ok(())
        }
        "mountoptions" => {
            config.fs.mount_options = parse_comma_separated(value);
            Ok(())
        }
        _ => Err(ConfigError::InvalidOverrideKey {
            key: format!("fs.{}", param),
            message: "unknown parameter".to_string(),
        }),
    }
}

fn apply_gitlab_override(config: &mut Config, param: &str, value: &str) -> Result<()> {
    match param {
        "url" => {
            config.gitlab.url = value.to_string();
            Ok(())
        }
        "token" => {
            config.gitlab.token = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            };
            Ok(())
        }
        "group_ids" => {
            config.gitlab.group_ids = parse_id_list("gitlab.group_ids", value)?;
            Ok(())
        }
        "user_ids" => {
            config.gitlab.user_ids = parse_id_list("gitlab.user_ids", value)?;
            Ok(())
        }
        "include_current_user" => {
            config.gitlab.include_current_user =
                parse_bool_value("gitlab.include_current_user", value)?;
            Ok(())
        }
        _ => Err(ConfigError::InvalidOverrideKey {
            key: format!("gitlab.{}", param),
            message: "unknown parameter".to_string(),
        }),
    }
}

fn apply_git_override(config: &mut Config, param: &str, value: &str) -> Result<()> {
    match param {
        "clone_location" => {
            config.git.clone_location = PathBuf::from(value);
            Ok(())
        }
        "remote" => {
            config.git.remote_name = value.to_string();
            Ok(())
        }
        "pull_method" => {
            config.git.pull_method = PullMethod::parse(value)?;
            Ok(())
        }
        "on_clone" => {
            config.git.on_clone = CloneMethod::parse(value)?;
            Ok(())
        }
        "auto_pull" => {
            config.git.auto_pull = parse_bool_value("git.auto_pull", value)?;
            Ok(())
        }
        "depth" => {
            config.git.depth = parse_u32_value("git.depth", value)?;
            Ok(())
        }
        "queue_size" => {
            config.git.queue_size = parse_usize_value("git.queue_size", value)?;
            Ok(())
        }
        "worker_count" => {
            config.git.worker_count = parse_usize_value("git.worker_count", value)?;
            Ok(())
        }
        _ => Err(ConfigError::InvalidOverrideKey {
            key: format!("git.{}", param),
            message: "unknown parameter".to_string(),
        }),
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validate a fully-layered configuration.
///
/// Errors here are fatal at startup: the sync engine and tree are only built
/// from a configuration that passed this check.
fn validate_config(config: &Config) -> Result<()> {
    Url::parse(&config.gitlab.url).map_err(|e| ConfigError::InvalidUrl {
        url: config.gitlab.url.clone(),
        message: e.to_string(),
    })?;

    if config.git.queue_size < 1 {
        return Err(ConfigError::InvalidQueueSize(config.git.queue_size));
    }
    if config.git.worker_count < 1 {
        return Err(ConfigError::InvalidWorkerCount(config.git.worker_count));
    }

    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

/// Result of reading configuration, including any warnings.
#[derive(Debug)]
pub struct ConfigResult {
    /// The parsed, validated configuration.
    pub config: Config,
    /// Any warnings generated during config loading.
    pub warnings: Vec<String>,
}

/// Read, layer, and validate configuration from the specified sources.
///
/// Configuration is layered in this order:
/// 1. Built-in defaults
/// 2. Config file (from CLI, env var, or ~/.config/gitlabfs.ini)
/// 3. Individual overrides (applied last)
pub fn read_config(source: &ConfigSource) -> Result<ConfigResult> {
    let mut warnings = Vec::new();

    let mut config = default_config();

    let resolved = resolve_config_file(source)?;
    if let Some(warning) = resolved.warning {
        warnings.push(warning);
    }
    if let Some(ref path) = resolved.path {
        let ini = load_ini(path)?;
        apply_ini_to_config(&mut config, &ini)?;
    }

    for (key, value) in &source.overrides {
        apply_override(&mut config, key, value)?;
    }

    validate_config(&config)?;

    Ok(ConfigResult { config, warnings })
}

// =============================================================================
// Tests
// =============================================================================
