use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::info;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

mod api;
mod bridge;
mod config;
mod envelope;
mod error;
mod provider;

pub use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("BRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // When invoked as a container HEALTHCHECK, hit /health and exit immediately.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        return healthcheck(&config).await;
    }

    let _log_guard = init_tracing(&config.server)?;

    let config = Arc::new(config);
    let state = Arc::new(bridge::BridgeState::new(Arc::clone(&config))?);

    info!(
        host = %config.server.host,
        port = config.server.port,
        model = %config.openai.default_model,
        timeout_secs = config.openai.timeout_secs,
        openai_configured = state.api_key_configured,
        "llm-bridge starting"
    );

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| format!("binding {}:{}", config.server.host, config.server.port))?;
    info!(addr = %listener.local_addr()?, "listening");

    let trace_layer = tower_http::trace::TraceLayer::new_for_http()
        .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
        .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO));

    let app = api::routes::router(state)
        .layer(trace_layer)
        .layer(CatchPanicLayer::custom(error::handle_panic));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Stdout plus a daily-rotated `bridge.<date>.log` under `server.log_dir`.
///
/// `RUST_LOG` overrides `server.log_level`. The returned guard flushes the
/// file writer on drop and must live as long as `main`.
fn init_tracing(server: &config::ServerConfig) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&server.log_dir)
        .with_context(|| format!("creating log directory {}", server.log_dir))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("bridge")
        .filename_suffix("log")
        .max_log_files(server.log_max_files)
        .build(&server.log_dir)
        .context("building rotating log file appender")?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!(
            "llm_bridge={level},tower_http={level}",
            level = server.log_level
        ))
        .with_context(|| format!("invalid log level `{}`", server.log_level))?,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(guard)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

/// Lightweight healthcheck: GET /health and exit 0 on 200, 1 otherwise.
/// Invoked via `llm-bridge --healthcheck`.
async fn healthcheck(config: &Config) -> anyhow::Result<()> {
    let host = match config.server.host.as_str() {
        "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    let url = format!("http://{host}:{}/health", config.server.port);
    let resp = reqwest::get(&url).await?;

    if resp.status().is_success() {
        std::process::exit(0);
    } else {
        std::process::exit(1);
    }
}
