//! Configuration for videoforge.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VIDEOFORGE_HOME plus provider credentials)
//! 2. Config file (.videoforge/config.yaml)
//! 3. Defaults (~/.videoforge)
//!
//! Provider credentials are env-only and never read from the config file.
//! Config file discovery searches the current directory and parents for
//! .videoforge/config.yaml.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub limits: Option<LimitsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to config file)
    pub home: Option<String>,
    /// Scratch root for per-request work areas
    pub work_root: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub image_timeout_seconds: Option<u64>,
    pub animation_timeout_seconds: Option<u64>,
    pub avatar_timeout_seconds: Option<u64>,
    pub poll_interval_seconds: Option<u64>,
    pub delivery_ceiling_bytes: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to videoforge home (token store, defaults root)
    pub home: PathBuf,
    /// Root directory for per-request work areas
    pub work_root: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Polling and delivery limits
    pub limits: Limits,
    /// Provider credentials read from the environment
    pub credentials: Credentials,
}

#[derive(Debug, Clone)]
pub struct Limits {
    pub image_timeout: Duration,
    pub animation_timeout: Duration,
    pub avatar_timeout: Duration,
    pub poll_interval: Duration,
    /// Files above this size are delivered as a path reference
    pub delivery_ceiling_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            image_timeout: Duration::from_secs(300),
            animation_timeout: Duration::from_secs(600),
            avatar_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(10),
            delivery_ceiling_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Provider credentials, all optional. A missing credential makes the
/// corresponding stage report `Unavailable` instead of attempting a call.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub anthropic_api_key: Option<String>,
    pub xai_api_key: Option<String>,
    pub fal_key: Option<String>,
    pub runway_api_key: Option<String>,
    pub pexels_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub youtube_client_id: Option<String>,
    pub youtube_client_secret: Option<String>,
}

impl Credentials {
    fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            xai_api_key: var("XAI_API_KEY"),
            fal_key: var("FAL_KEY"),
            runway_api_key: var("RUNWAY_API_KEY"),
            pexels_api_key: var("PEXELS_API_KEY"),
            elevenlabs_api_key: var("ELEVENLABS_API_KEY"),
            youtube_client_id: var("YOUTUBE_CLIENT_ID"),
            youtube_client_secret: var("YOUTUBE_CLIENT_SECRET"),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".videoforge").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn limits_from_file(file: Option<&LimitsConfig>) -> Limits {
    let defaults = Limits::default();
    match file {
        None => defaults,
        Some(l) => Limits {
            image_timeout: l
                .image_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.image_timeout),
            animation_timeout: l
                .animation_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.animation_timeout),
            avatar_timeout: l
                .avatar_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.avatar_timeout),
            poll_interval: l
                .poll_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            delivery_ceiling_bytes: l
                .delivery_ceiling_bytes
                .unwrap_or(defaults.delivery_ceiling_bytes),
        },
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".videoforge");

    let config_file = find_config_file();

    let (home, work_root, limits) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        // Base directory is the parent of .videoforge/
        let base_dir = config_path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));

        let home = if let Ok(env_home) = std::env::var("VIDEOFORGE_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            let dot_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(dot_dir, home_path)
        } else {
            default_home.clone()
        };

        let work_root = if let Some(ref work_path) = config.paths.work_root {
            resolve_path(base_dir, work_path)
        } else {
            home.join("work")
        };

        (home, work_root, limits_from_file(config.limits.as_ref()))
    } else {
        let home = std::env::var("VIDEOFORGE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        let work_root = home.join("work");

        (home, work_root, Limits::default())
    };

    Ok(ResolvedConfig {
        home,
        work_root,
        config_file,
        limits,
        credentials: Credentials::from_env(),
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Get the videoforge home directory.
pub fn videoforge_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the work-area root ($VIDEOFORGE_HOME/work unless overridden)
pub fn work_root() -> Result<PathBuf> {
    Ok(config()?.work_root.clone())
}

/// Path to the stored publishing-sink token ($VIDEOFORGE_HOME/youtube_token.json)
pub fn youtube_token_path() -> Result<PathBuf> {
    Ok(config()?.home.join("youtube_token.json"))
}
