//! Configuration loading and folder resolution
//!
//! Every setting resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`JUKEBOX_*`)
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing config file is not an error; a config file that exists but
//! cannot be parsed is.

use crate::models::NodeRole;
use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the library root
pub const LIBRARY_ROOT_ENV: &str = "JUKEBOX_LIBRARY_ROOT";

/// Environment variable overriding the data folder (database location)
pub const DATA_FOLDER_ENV: &str = "JUKEBOX_DATA_FOLDER";

/// Database file name inside the data folder
pub const DATABASE_FILE: &str = "jukebox.db";

/// OS-dependent compiled defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledDefaults {
    pub library_root: PathBuf,
    pub data_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let data_folder = if cfg!(target_os = "linux") {
            // ~/.local/share/jukebox (or /var/lib/jukebox for system-wide)
            dirs::data_local_dir()
                .map(|d| d.join("jukebox"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/jukebox"))
        } else if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("jukebox"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/jukebox"))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("jukebox"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\jukebox"))
        } else {
            PathBuf::from("./jukebox_data")
        };

        Self {
            library_root: home.join("Music"),
            data_folder,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Which connected slaves receive master pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOutPolicy {
    /// Only the earliest-connected slave
    #[default]
    First,
    /// Every connected slave
    All,
}

impl fmt::Display for FanOutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanOutPolicy::First => f.write_str("first"),
            FanOutPolicy::All => f.write_str("all"),
        }
    }
}

impl FromStr for FanOutPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(FanOutPolicy::First),
            "all" => Ok(FanOutPolicy::All),
            other => Err(format!("unknown fan-out policy '{}' (expected first or all)", other)),
        }
    }
}

/// `[node]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub role: Option<NodeRole>,
    pub id: Option<String>,
}

/// `[library]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
    pub root: Option<PathBuf>,
    /// Reconcile the albums/songs collections against the filesystem at startup
    pub scan_on_startup: Option<bool>,
}

/// `[store]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub database: Option<PathBuf>,
}

/// `[control]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    /// Listen address on the master
    pub bind: Option<String>,
    pub port: Option<u16>,
    /// `host:port` a slave dials
    pub master_address: Option<String>,
    pub fan_out: Option<FanOutPolicy>,
    /// Sent as `AUTH|user|password` by a slave after connecting
    pub user: Option<String>,
    pub password: Option<String>,
}

/// `[pubsub]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PubSubSection {
    /// WebSocket URL of the realtime server
    pub socket_url: Option<String>,
    /// Base URL for the fire-and-forget HTTP endpoints
    pub http_url: Option<String>,
}

/// `[api]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// Local HTTP API listen address; the API is disabled when unset
    pub bind: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full EnvFilter directive
    pub level: Option<String>,

    /// Directory for a daily-rotating log file (stderr only if not specified)
    pub file: Option<PathBuf>,
}

/// `[timing]` section
///
/// Every field has a compiled default, so a partial section is fine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Coordinator tick
    pub tick_ms: u64,
    /// Socket messages handled per tick
    pub socket_drain_per_tick: usize,
    /// Periodic validation sweep of not-yet-validated entries
    pub validation_sweep_secs: u64,
    /// Store change feed poll interval
    pub feed_poll_ms: u64,
    /// Grace added to the expected duration before a track is forced out
    pub safety_grace_secs: u64,
    pub position_event_interval_ms: u64,
    pub autofill_startup_grace_secs: u64,
    pub autofill_interval_secs: u64,
    pub autofill_cooldown_secs: u64,
    pub autofill_attempts: u32,
    pub reconnect_interval_secs: u64,
    pub reconnect_max_attempts: u32,
    pub heartbeat_interval_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 250,
            socket_drain_per_tick: 10,
            validation_sweep_secs: 10,
            feed_poll_ms: 500,
            safety_grace_secs: 10,
            position_event_interval_ms: 1000,
            autofill_startup_grace_secs: 5,
            autofill_interval_secs: 2,
            autofill_cooldown_secs: 5,
            autofill_attempts: 3,
            reconnect_interval_secs: 5,
            reconnect_max_attempts: 10,
            heartbeat_interval_secs: 15,
        }
    }
}

impl TimingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn validation_sweep(&self) -> Duration {
        Duration::from_secs(self.validation_sweep_secs.max(1))
    }

    pub fn feed_poll(&self) -> Duration {
        Duration::from_millis(self.feed_poll_ms.max(1))
    }

    pub fn safety_grace(&self) -> Duration {
        Duration::from_secs(self.safety_grace_secs)
    }

    pub fn position_event_interval(&self) -> Duration {
        Duration::from_millis(self.position_event_interval_ms.max(1))
    }

    pub fn autofill_startup_grace(&self) -> Duration {
        Duration::from_secs(self.autofill_startup_grace_secs)
    }

    pub fn autofill_interval(&self) -> Duration {
        Duration::from_secs(self.autofill_interval_secs.max(1))
    }

    pub fn autofill_cooldown(&self) -> Duration {
        Duration::from_secs(self.autofill_cooldown_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

/// Bootstrap configuration loaded from TOML file
///
/// All sections are optional; anything missing falls through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub node: NodeSection,
    pub library: LibrarySection,
    pub store: StoreSection,
    pub control: ControlSection,
    pub pubsub: PubSubSection,
    pub api: ApiSection,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one, the platform locations are
    /// searched and a missing file yields the defaults with a warning.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!("Config file not found: {:?}", path)));
                }
                path.to_path_buf()
            }
            None => match discover_config_file() {
                Some(path) => path,
                None => {
                    warn!("No config file found, using defaults");
                    return Ok((Self::default(), None));
                }
            },
        };

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{:?}: {}", path, e)))?;
        info!("Loaded TOML configuration from {:?}", path);
        Ok((config, Some(path)))
    }
}

/// Platform config file locations, most specific first
pub fn config_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("jukebox").join("config.toml"));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc/jukebox/config.toml"));
    }
    candidates
}

fn discover_config_file() -> Option<PathBuf> {
    config_file_candidates().into_iter().find(|p| p.exists())
}

/// Resolves a folder setting: CLI → environment → TOML → compiled default
pub struct FolderResolver {
    env_var: &'static str,
    default: PathBuf,
}

impl FolderResolver {
    /// Library root (`JUKEBOX_LIBRARY_ROOT`, default `~/Music`)
    pub fn library_root() -> Self {
        Self {
            env_var: LIBRARY_ROOT_ENV,
            default: CompiledDefaults::for_current_platform().library_root,
        }
    }

    /// Data folder holding the database (`JUKEBOX_DATA_FOLDER`)
    pub fn data_folder() -> Self {
        Self {
            env_var: DATA_FOLDER_ENV,
            default: CompiledDefaults::for_current_platform().data_folder,
        }
    }

    pub fn resolve(&self, cli: Option<&Path>, toml: Option<&Path>) -> PathBuf {
        if let Some(path) = cli {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(self.env_var) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = toml {
            return path.to_path_buf();
        }

        self.default.clone()
    }
}

/// Creates the data folder and locates the database inside it
pub struct DataFolderInitializer {
    root: PathBuf,
}

impl DataFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Safe to call repeatedly
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!("Created data folder {:?}", self.root);
        }
        Ok(())
    }
}
