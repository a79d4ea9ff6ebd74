//! Configuration for engine paths and limits.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CARDEA_HOME)
//! 2. Config file (.cardea/config.yaml)
//! 3. Defaults (~/.cardea)
//!
//! Config file discovery searches the current directory and its parents for
//! .cardea/config.yaml; paths in the file are relative to the .cardea
//! directory.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::VerifierLimits;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub limits: Option<VerifierLimits>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine home directory (relative to the config file's directory)
    pub home: Option<String>,
    /// Object storage root (relative to home when relative)
    pub objects: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Engine home (document store, signing key)
    pub home: PathBuf,
    /// Object storage root
    pub objects: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Verification bounds
    pub limits: VerifierLimits,
}

impl ResolvedConfig {
    /// SQLite document store path ($HOME/store.db)
    pub fn store_path(&self) -> PathBuf {
        self.home.join("store.db")
    }

    /// Ed25519 signing key seed path ($HOME/signing.key)
    pub fn signing_key_path(&self) -> PathBuf {
        self.home.join("signing.key")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".cardea").join("config.yaml");
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

/// Resolve a path that may be relative to a base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path_str)
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".cardea");

    let config_file = find_config_file();

    let (home, objects, limits) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;
        let cardea_dir = config_path.parent().unwrap_or(Path::new("."));

        let home = if let Ok(env_home) = std::env::var("CARDEA_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            resolve_path(cardea_dir, home_path)
        } else {
            default_home.clone()
        };

        let objects = match config.paths.objects {
            Some(ref objects_path) => resolve_path(&home, objects_path),
            None => home.join("objects"),
        };

        (home, objects, config.limits.unwrap_or_default())
    } else {
        let home = std::env::var("CARDEA_HOME")
            .map(PathBuf::from)
            .unwrap_or(default_home);
        let objects = home.join("objects");
        (home, objects, VerifierLimits::default())
    };

    Ok(ResolvedConfig {
        home,
        objects,
        config_file,
        limits,
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

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
