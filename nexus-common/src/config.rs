//! Configuration loading and root folder resolution
//!
//! Resolution priority used by every Nexus tool:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "NEXUS_ROOT";

/// Default backend base URL
pub const DEFAULT_API_BASE_URL: &str = "https://nexus-host-backend.onrender.com/api";

/// Logging section of the TOML config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `[scanner]` section of the TOML config
///
/// Every field is optional; absent values fall back to compiled defaults in
/// the scanner crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScannerToml {
    pub scan_interval_ms: Option<u64>,
    pub duplicate_cooldown_ms: Option<u64>,
    pub verify_max_attempts: Option<u32>,
    pub rate_limit_backoff_ms: Option<u64>,
    pub recent_scans_capacity: Option<usize>,
    pub preferred_width: Option<u32>,
    pub preferred_height: Option<u32>,
    pub status_check_interval_ms: Option<u64>,
}

/// Contents of a Nexus TOML config file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scanner: ScannerToml,
}

impl TomlConfig {
    /// Backend base URL, falling back to the compiled default
    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }
}

/// Default config file location for a tool: `<config_dir>/nexus/<tool>.toml`
pub fn default_config_path(tool_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nexus").join(format!("{}.toml", tool_name)))
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
}

/// Load a TOML config file, using defaults when it does not exist
///
/// A file that exists but does not parse is an error.
pub fn load_toml_config_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    match path {
        Some(path) if path.exists() => load_toml_config(path),
        Some(path) => {
            debug!("Config file {} not found, using defaults", path.display());
            Ok(TomlConfig::default())
        }
        None => Ok(TomlConfig::default()),
    }
}

/// Root folder resolver following the 4-tier priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    tool_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    /// Resolve the root folder
    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
            warn!("{} is set but empty, ignoring", ROOT_FOLDER_ENV);
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        debug!(tool = %self.tool_name, "Using default root folder");
        default_root_folder()
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("nexus"))
        .unwrap_or_else(|| PathBuf::from("./nexus_data"))
}

/// Creates the root folder and names the files kept inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root folder (and parents) if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            debug!("Created root folder {}", self.root.display());
        }
        Ok(())
    }

    /// Cached scanner session state (counters) surviving restarts
    pub fn session_cache_path(&self) -> PathBuf {
        self.root.join("scan_session.json")
    }

    /// Bearer credential written by the login flow
    pub fn credential_path(&self) -> PathBuf {
        self.root.join("nexus_host_token")
    }
}
