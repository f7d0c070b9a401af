//! Node configuration
//!
//! Command-line arguments (with `JUKEBOX_*` environment fallbacks) layered
//! over the TOML file and compiled defaults. See [`jukebox_common::config`]
//! for the file format and folder resolution.

use crate::error::{Error, Result};
use clap::Parser;
use jukebox_common::config::{
    DataFolderInitializer, FanOutPolicy, FolderResolver, TimingConfig, TomlConfig,
};
use jukebox_common::NodeRole;
use std::path::PathBuf;

/// Default control-channel listen address on the master
pub const DEFAULT_CONTROL_BIND: &str = "0.0.0.0:5710";

/// `--database` value selecting the in-process store
pub const MEMORY_DATABASE: &str = "memory";

/// Command-line arguments for jukebox-node
#[derive(Parser, Debug, Default)]
#[command(name = "jukebox-node")]
#[command(about = "Multi-node jukebox coordinator")]
#[command(version)]
pub struct Cli {
    /// Path to TOML config file
    #[arg(short, long, env = "JUKEBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// master or slave
    #[arg(short, long, env = "JUKEBOX_ROLE")]
    pub role: Option<NodeRole>,

    /// Identifier written as ownerNodeId on enqueued entries
    #[arg(long, env = "JUKEBOX_NODE_ID")]
    pub node_id: Option<String>,

    /// Root folder containing one sub-folder per album
    #[arg(long)]
    pub library_root: Option<PathBuf>,

    /// Folder holding the database
    #[arg(long)]
    pub data_folder: Option<PathBuf>,

    /// Database file, or "memory" for a non-persistent store
    #[arg(long, env = "JUKEBOX_DATABASE")]
    pub database: Option<String>,

    /// Control-channel listen address (master)
    #[arg(long, env = "JUKEBOX_CONTROL_BIND")]
    pub control_bind: Option<String>,

    /// Master control address as host:port (slave)
    #[arg(short, long, env = "JUKEBOX_MASTER")]
    pub master: Option<String>,

    /// Pub/sub WebSocket URL
    #[arg(long, env = "JUKEBOX_PUBSUB_URL")]
    pub pubsub_url: Option<String>,

    /// Base URL of the fire-and-forget HTTP endpoints
    #[arg(long, env = "JUKEBOX_HTTP_URL")]
    pub http_url: Option<String>,

    /// Local HTTP API listen address
    #[arg(long, env = "JUKEBOX_API_BIND")]
    pub api_bind: Option<String>,

    /// Skip reconciling albums/songs against the library at startup
    #[arg(long)]
    pub no_scan: bool,

    /// Log level or EnvFilter directive
    #[arg(long, env = "JUKEBOX_LOG")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

/// Fully resolved settings for one node
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub role: NodeRole,
    pub node_id: String,
    pub library_root: PathBuf,
    pub database: DatabaseLocation,
    pub scan_on_startup: bool,
    pub control_bind: String,
    pub master_address: Option<String>,
    pub fan_out: FanOutPolicy,
    pub credentials: Option<(String, String)>,
    pub pubsub_url: Option<String>,
    pub http_url: Option<String>,
    pub api_bind: Option<String>,
    pub timing: TimingConfig,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

impl NodeConfig {
    /// Load the TOML file named by (or discovered for) `cli` and resolve
    pub fn load(cli: &Cli) -> Result<Self> {
        let (toml, config_file) = TomlConfig::load(cli.config.as_deref())?;
        let mut config = Self::resolve(cli, toml)?;
        config.config_file = config_file;
        Ok(config)
    }

    /// Merge CLI over TOML over defaults
    pub fn resolve(cli: &Cli, toml: TomlConfig) -> Result<Self> {
        let role = cli.role.or(toml.node.role).unwrap_or(NodeRole::Master);

        let node_id = cli
            .node_id
            .clone()
            .or(toml.node.id)
            .unwrap_or_else(|| default_node_id(role));

        let library_root = FolderResolver::library_root()
            .resolve(cli.library_root.as_deref(), toml.library.root.as_deref());

        let database = match cli.database.as_deref() {
            Some(MEMORY_DATABASE) => DatabaseLocation::Memory,
            Some(path) => DatabaseLocation::File(PathBuf::from(path)),
            None => match toml.store.database {
                Some(path) if path.as_os_str() == MEMORY_DATABASE => DatabaseLocation::Memory,
                Some(path) => DatabaseLocation::File(path),
                None => {
                    let data_folder =
                        FolderResolver::data_folder().resolve(cli.data_folder.as_deref(), None);
                    DatabaseLocation::File(DataFolderInitializer::new(data_folder).database_path())
                }
            },
        };

        let control_bind = cli.control_bind.clone().unwrap_or_else(|| {
            match (toml.control.bind.as_deref(), toml.control.port) {
                (Some(bind), Some(port)) => format!("{}:{}", bind, port),
                (Some(bind), None) => bind.to_string(),
                (None, Some(port)) => format!("0.0.0.0:{}", port),
                (None, None) => DEFAULT_CONTROL_BIND.to_string(),
            }
        });

        let master_address = cli.master.clone().or(toml.control.master_address);
        if role == NodeRole::Slave && master_address.is_none() {
            return Err(Error::Config(
                "a slave needs the master control address (--master or control.master_address)"
                    .to_string(),
            ));
        }

        let credentials = match (toml.control.user, toml.control.password) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        };

        let log_level = cli
            .log_level
            .clone()
            .or(toml.logging.level)
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            role,
            node_id,
            library_root,
            database,
            scan_on_startup: !cli.no_scan && toml.library.scan_on_startup.unwrap_or(true),
            control_bind,
            master_address,
            fan_out: toml.control.fan_out.unwrap_or_default(),
            credentials,
            pubsub_url: cli.pubsub_url.clone().or(toml.pubsub.socket_url),
            http_url: cli.http_url.clone().or(toml.pubsub.http_url),
            api_bind: cli.api_bind.clone().or(toml.api.bind),
            timing: toml.timing,
            log_level,
            log_file: toml.logging.file,
            config_file: None,
        })
    }
}

fn default_node_id(role: NodeRole) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", role, &suffix[..8])
}
