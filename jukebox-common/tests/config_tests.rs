//! Configuration loading and folder resolution
//!
//! Uses serial_test: tests that touch JUKEBOX_* environment variables are
//! marked #[serial] so they never run in parallel.

use jukebox_common::config::{
    CompiledDefaults, DataFolderInitializer, FanOutPolicy, FolderResolver, TomlConfig,
    DATA_FOLDER_ENV, LIBRARY_ROOT_ENV,
};
use jukebox_common::NodeRole;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.library_root.as_os_str().is_empty());
    assert!(!defaults.data_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert!(defaults.log_file.is_none());

    let path_str = defaults.library_root.to_string_lossy();
    assert!(path_str.contains("Music"), "library default should be ~/Music");
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(LIBRARY_ROOT_ENV);

    let resolved = FolderResolver::library_root().resolve(None, None);
    assert_eq!(resolved, CompiledDefaults::for_current_platform().library_root);
}

#[test]
#[serial]
fn test_resolver_priority_order() {
    env::remove_var(LIBRARY_ROOT_ENV);
    let resolver = FolderResolver::library_root();
    let cli = Path::new("/tmp/jukebox-cli");
    let toml = Path::new("/tmp/jukebox-toml");

    // TOML beats the default
    assert_eq!(resolver.resolve(None, Some(toml)), PathBuf::from(toml));

    // Environment beats TOML
    env::set_var(LIBRARY_ROOT_ENV, "/tmp/jukebox-env");
    assert_eq!(
        resolver.resolve(None, Some(toml)),
        PathBuf::from("/tmp/jukebox-env")
    );

    // CLI beats everything
    assert_eq!(resolver.resolve(Some(cli), Some(toml)), PathBuf::from(cli));

    env::remove_var(LIBRARY_ROOT_ENV);
}

#[test]
#[serial]
fn test_resolver_ignores_blank_env_var() {
    env::set_var(DATA_FOLDER_ENV, "  ");
    let resolved = FolderResolver::data_folder().resolve(None, None);
    assert_eq!(resolved, CompiledDefaults::for_current_platform().data_folder);
    env::remove_var(DATA_FOLDER_ENV);
}

#[test]
fn test_initializer_database_path() {
    let root = PathBuf::from("/tmp/jukebox-test-root");
    let initializer = DataFolderInitializer::new(root.clone());

    assert_eq!(initializer.database_path(), root.join("jukebox.db"));
}

#[test]
fn test_initializer_idempotent_directory_creation() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("nested").join("data");
    let initializer = DataFolderInitializer::new(root.clone());

    assert!(!initializer.database_exists());
    initializer.ensure_directory_exists().unwrap();
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
}

#[test]
fn test_full_toml_file() {
    let content = r#"
        [node]
        role = "slave"
        id = "lobby-display"

        [library]
        root = "/srv/music"
        scan_on_startup = false

        [store]
        database = "/var/lib/jukebox/jukebox.db"

        [control]
        port = 5000
        master_address = "10.0.0.2:5000"
        fan_out = "all"

        [pubsub]
        socket_url = "ws://10.0.0.2:3001"
        http_url = "http://10.0.0.2:3001"

        [api]
        bind = "127.0.0.1:8080"

        [timing]
        reconnect_max_attempts = 3

        [logging]
        level = "debug"
        file = "/var/log/jukebox"
    "#;

    let config = TomlConfig::from_toml_str(content).unwrap();

    assert_eq!(config.node.role, Some(NodeRole::Slave));
    assert_eq!(config.node.id.as_deref(), Some("lobby-display"));
    assert_eq!(config.library.root, Some(PathBuf::from("/srv/music")));
    assert_eq!(config.library.scan_on_startup, Some(false));
    assert_eq!(config.control.port, Some(5000));
    assert_eq!(config.control.fan_out, Some(FanOutPolicy::All));
    assert_eq!(config.pubsub.socket_url.as_deref(), Some("ws://10.0.0.2:3001"));
    assert_eq!(config.api.bind.as_deref(), Some("127.0.0.1:8080"));
    assert_eq!(config.timing.reconnect_max_attempts, 3);
    assert_eq!(config.timing.heartbeat_interval_secs, 15);
    assert_eq!(config.logging.level.as_deref(), Some("debug"));
    assert_eq!(config.logging.file, Some(PathBuf::from("/var/log/jukebox")));
}

#[test]
fn test_empty_toml_is_all_defaults() {
    let config = TomlConfig::from_toml_str("").unwrap();
    assert!(config.node.role.is_none());
    assert!(config.api.bind.is_none());
    assert_eq!(config.timing, Default::default());
}

#[test]
fn test_malformed_toml_is_error() {
    assert!(TomlConfig::from_toml_str("[node\nrole = ").is_err());
    assert!(TomlConfig::from_toml_str("[node]\nrole = \"observer\"").is_err());
}

#[test]
fn test_load_explicit_path() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[node]\nrole = \"master\"\n").unwrap();

    let (config, loaded_from) = TomlConfig::load(Some(&path)).unwrap();
    assert_eq!(config.node.role, Some(NodeRole::Master));
    assert_eq!(loaded_from, Some(path));
}

#[test]
fn test_load_missing_explicit_path_is_error() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("nope.toml");
    assert!(TomlConfig::load(Some(&missing)).is_err());
}
