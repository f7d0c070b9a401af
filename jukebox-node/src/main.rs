//! Jukebox node - main entry point
//!
//! Starts one node in the configured role: opens the tracklist store, scans
//! the library (master), spawns the control channel, the pub/sub bridge, the
//! change feed and the coordinator loop, and serves the local HTTP API until
//! Ctrl+C or SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jukebox_common::config::DataFolderInitializer;
use jukebox_common::events::EventBus;
use jukebox_node::api::{self, AppContext};
use jukebox_node::bridge::{ChangeFeed, HttpNotifier, Outbox, PubSubClient, ReconnectPolicy};
use jukebox_node::config::{Cli, DatabaseLocation, NodeConfig};
use jukebox_node::control::{ControlClient, ControlLink, ControlServer};
use jukebox_node::coordinator::{Coordinator, CoordinatorConfig, EVENT_CHANNEL_CAPACITY};
use jukebox_node::library::{LibraryIndex, LibraryScanner};
use jukebox_node::playback::ClockOutput;
use jukebox_node::services::Services;
use jukebox_node::status::StatusBoard;
use jukebox_node::store::{MemoryStore, SqliteStore, TracklistClient, TracklistStore};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = NodeConfig::load(&cli).context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config)?;

    info!(
        "Starting jukebox node '{}' as {} (v{})",
        config.node_id,
        config.role,
        env!("CARGO_PKG_VERSION")
    );
    match &config.config_file {
        Some(path) => info!("Configuration file: {:?}", path),
        None => info!("No configuration file; using defaults"),
    }
    info!("Library root: {}", config.library_root.display());

    let store = open_store(&config.database).await?;

    let bus = Arc::new(EventBus::new(1024));
    let status = StatusBoard::with_bus(bus.clone());
    let client = TracklistClient::new(store.clone(), status.clone());
    let library = Arc::new(LibraryIndex::new(config.library_root.clone()));

    if config.role.is_master() && config.scan_on_startup {
        match LibraryScanner::new(config.library_root.clone())
            .reconcile(store.as_ref())
            .await
        {
            Ok(summary) => info!("Library scan complete: {:?}", summary),
            Err(e) => warn!("Library scan failed: {}", e),
        }
    }

    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let policy = ReconnectPolicy {
        interval: config.timing.reconnect_interval(),
        max_attempts: config.timing.reconnect_max_attempts,
    };

    let mut outbox = Outbox::new();

    if config.role.is_master() {
        let server = ControlServer::bind(&config.control_bind, config.fan_out)
            .await
            .context("Failed to start control channel")?;
        outbox = outbox.with_control(ControlLink::Downstream(server.handle()));
        server.spawn(events_tx.clone(), cancel.clone());
    } else if let Some(master) = &config.master_address {
        let (upstream_tx, upstream_rx) = mpsc::unbounded_channel();
        let mut control =
            ControlClient::new(master.clone(), config.timing.heartbeat_interval(), policy);
        if let Some((user, password)) = &config.credentials {
            control = control.with_credentials(user.clone(), password.clone());
        }
        control.spawn(events_tx.clone(), upstream_rx, cancel.clone());
        outbox = outbox.with_control(ControlLink::Upstream(upstream_tx));
    }

    if let Some(url) = &config.http_url {
        let notifier = HttpNotifier::new(url.clone()).context("Failed to build HTTP client")?;
        outbox = outbox.with_http(notifier);
    }

    if let Some(url) = &config.pubsub_url {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        PubSubClient::new(url.clone(), config.role, policy).spawn(
            events_tx.clone(),
            frames_rx,
            cancel.clone(),
        );
        outbox = outbox.with_pubsub(frames_tx);
    } else {
        info!("No pub/sub URL configured; relying on the store change feed");
    }

    ChangeFeed::new(client.clone(), config.timing.feed_poll()).spawn(events_tx, cancel.clone());

    let services = Services {
        client: client.clone(),
        library,
        bus: bus.clone(),
        status: status.clone(),
        outbox,
    };
    let (coordinator, handle) = Coordinator::new(
        CoordinatorConfig {
            role: config.role,
            node_id: config.node_id.clone(),
            timing: config.timing.clone(),
        },
        services,
        Box::new(ClockOutput::new()),
        events_rx,
    );
    let coordinator_task = coordinator.spawn(cancel.clone());

    match &config.api_bind {
        Some(bind) => {
            let ctx = AppContext {
                handle,
                bus,
                status,
                client,
            };
            api::run(bind, ctx, shutdown_signal())
                .await
                .context("HTTP API failed")?;
        }
        None => {
            info!("HTTP API disabled");
            shutdown_signal().await;
        }
    }

    cancel.cancel();
    if let Err(e) = coordinator_task.await {
        warn!("Coordinator task ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// stderr plus an optional daily-rotating file
fn init_tracing(config: &NodeConfig) -> Result<Option<WorkerGuard>> {
    let directive = if config.log_level.contains('=') {
        config.log_level.clone()
    } else {
        format!(
            "jukebox_node={level},jukebox_common={level},tower_http={level}",
            level = config.log_level
        )
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .context("Invalid log level")?;

    let (file_layer, guard) = match &config.log_file {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "jukebox-node.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn open_store(location: &DatabaseLocation) -> Result<Arc<dyn TracklistStore>> {
    match location {
        DatabaseLocation::Memory => {
            warn!("Using the in-memory tracklist store; nothing is persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
        DatabaseLocation::File(path) => {
            if let Some(folder) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                DataFolderInitializer::new(folder.to_path_buf()).ensure_directory_exists()?;
            }
            let store = SqliteStore::open(path)
                .await
                .with_context(|| format!("Failed to open database {:?}", path))?;
            Ok(Arc::new(store))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
