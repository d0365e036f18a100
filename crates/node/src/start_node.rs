use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use types::errors::NodeError;

use crate::{
    NodeConfig, NodeState,
    key_manager::{FileKeyStorage, KeyStorage, load_or_create_identity_key},
    swarm_manager::build_swarm,
    utils::console::run_console,
};

pub(crate) fn init_logging(log_path: Option<PathBuf>) -> Result<(), NodeError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(log_path) = log_path {
        let log_dir = Path::new(&log_path);

        if !log_dir.exists() {
            std::fs::create_dir_all(log_dir).map_err(|e| {
                NodeError::Error(format!(
                    "Failed to create log directory {}: {e}",
                    log_dir.display()
                ))
            })?;
        }

        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "node.log");

        let file_layer = fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true);

        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);

        registry
            .with(file_layer)
            .with(console_layer)
            .try_init()
            .map_err(|e| NodeError::Error(format!("Failed to install logger: {e}")))?;
        tracing::info!(
            "Logging initialized with file output: {}",
            log_path.display()
        );
    } else {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);

        registry
            .with(console_layer)
            .try_init()
            .map_err(|e| NodeError::Error(format!("Failed to install logger: {e}")))?;
        tracing::info!("Logging initialized with console output only");
    }
    Ok(())
}

/// Boots a node: logging, metrics, key material, swarm and the node loop,
/// then runs until a shutdown signal or until one of the tasks stops.
pub async fn start_node(
    config: NodeConfig,
    log_file: Option<PathBuf>,
    console: bool,
) -> Result<(), NodeError> {
    init_logging(config.log_file_path.clone().or(log_file))?;

    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .map_err(|e| NodeError::Error(format!("Failed to install Prometheus exporter: {e}")))?;
        tracing::info!("Serving metrics on 0.0.0.0:{port}");
    }

    let key_directory = config.resolve_key_directory()?;
    tracing::info!("Using key directory {}", key_directory.display());
    let storage: Arc<dyn KeyStorage> = Arc::new(FileKeyStorage::new(key_directory));

    let keypair = load_or_create_identity_key(storage.as_ref()).inspect_err(|e| {
        tracing::error!("Failed to load identity key: {e}");
    })?;

    let (network_handle, mut swarm) = build_swarm(
        keypair,
        config.libp2p_udp_port,
        config.libp2p_tcp_port,
        &config.allowed_peers,
        &config.topic,
    )?;

    let mut node_state =
        NodeState::new_from_config(&network_handle, config, &swarm.network_events, storage)?;

    let swarm_handle = tokio::spawn(async move {
        swarm.start().await;
    });

    let main_loop_handle = tokio::spawn(async move { node_state.start().await });

    if console {
        tokio::spawn(async move {
            if let Err(e) = run_console(network_handle).await {
                tracing::error!("Console failed: {e}");
            }
            tracing::info!("Console closed");
        });
    }

    let shutdown_signal = async {
        #[cfg(unix)]
        {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = signal::ctrl_c() => {
                            tracing::info!("Received SIGINT, shutting down gracefully...");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, shutting down gracefully...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {e}");
                    let _ = signal::ctrl_c().await;
                    tracing::info!("Received SIGINT, shutting down gracefully...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = signal::ctrl_c().await;
            tracing::info!("Received SIGINT, shutting down gracefully...");
        }
    };

    tokio::select! {
        () = shutdown_signal => {}
        result = swarm_handle => {
            match result {
                Ok(()) => tracing::info!("Swarm stopped"),
                Err(e) => tracing::error!("Swarm error: {}", e),
            }
        }
        result = main_loop_handle => {
            match result {
                Ok(Ok(())) => tracing::info!("Main loop stopped"),
                Ok(Err(e)) => tracing::error!("Main loop failed: {}", e),
                Err(e) => tracing::error!("Main loop panicked: {}", e),
            }
        }
    }

    Ok(())
}
