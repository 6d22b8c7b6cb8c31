//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`TQ_ROOT_FOLDER`, then `TQ_ROOT`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops startup: a warning is logged
//! and compiled defaults are used.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Primary root folder environment variable
pub const ROOT_FOLDER_ENV: &str = "TQ_ROOT_FOLDER";
/// Short alias accepted for the root folder
pub const ROOT_ENV: &str = "TQ_ROOT";
/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "tunequiz.db";

/// Defaults compiled into the binary for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind_address: "127.0.0.1".to_string(),
            port: 5740,
            log_level: "info".to_string(),
        }
    }
}

/// Contents of `<module>.toml`
///
/// Every key is optional. The interval triggers default to 0 (disabled): an
/// external scheduler is expected to call the batch endpoints.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    /// Seconds between in-process reconciliation runs (0 = disabled)
    pub reconciliation_interval_secs: u64,
    /// Seconds between in-process retention cleanups (0 = disabled)
    pub retention_interval_secs: u64,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn bind_address_or_default(&self) -> String {
        self.bind_address
            .clone()
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().bind_address)
    }

    pub fn port_or_default(&self) -> u16 {
        self.port
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().port)
    }

    pub fn log_level_or_default(&self) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().log_level)
    }
}

/// Resolves the root folder for one module
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config: TomlConfig,
}

impl RootFolderResolver {
    /// Create a resolver, loading `<module>.toml` from the platform config directory
    pub fn new(module_name: &str) -> Self {
        let config = match config_file_path(module_name) {
            Some(path) => match TomlConfig::load(&path) {
                Ok(config) => {
                    info!("Loaded config file: {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Ignoring config file {}: {}", path.display(), e);
                    TomlConfig::default()
                }
            },
            None => TomlConfig::default(),
        };

        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config,
        }
    }

    /// Create a resolver from an already-loaded config (tests, explicit `--config`)
    pub fn with_config(module_name: &str, config: TomlConfig) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config,
        }
    }

    /// Set the command-line override
    pub fn cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// The TOML config this resolver consulted
    pub fn config(&self) -> &TomlConfig {
        &self.config
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variables
        for var in [ROOT_FOLDER_ENV, ROOT_ENV] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.config.root_folder {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        warn!(
            module = %self.module_name,
            "No root folder configured, using compiled default"
        );
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates files inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

/// `<config dir>/tunequiz/<module>.toml`, falling back to `/etc/tunequiz` on Linux
fn config_file_path(module_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", module_name);

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("tunequiz").join(&file_name)) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/tunequiz").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("tunequiz"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tunequiz"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("tunequiz"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/tunequiz"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("tunequiz"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\tunequiz"))
    } else {
        PathBuf::from("./tunequiz_data")
    }
}
