use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use redsys_gatekeeper::config::LogFormat;
use redsys_gatekeeper::{AppState, Config, IntrospectionClient, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Config is loaded before logging so LOG_FORMAT can pick the output format.
    let config = Config::from_env();
    let (log_format, log_level) = match &config {
        Ok(config) => (config.log_format, config.log_level.clone()),
        Err(_) => (LogFormat::Pretty, "info".to_string()),
    };
    init_tracing(log_format, &log_level);

    info!(
        "Starting RedSys gatekeeper v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

fn init_tracing(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init(),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = %config.port,
        introspection_url = %config.introspection_url,
        client_id = %config.client_id,
        required_scope = %config.required_scope,
        max_retries = config.max_retries,
        token_cache = config.token_cache_enabled(),
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let introspector = IntrospectionClient::new(&config).map_err(|e| {
        error!("Failed to build introspection client: {e}");
        exitcode::SOFTWARE
    })?;

    let state = AppState::new(config.clone(), introspector);
    let app = build_router(state.clone());

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health        - Health check");
    info!("  GET  /ready         - Readiness check");
    info!("  GET  /api/v1/hello  - Public greeting");
    info!("  GET  /api/v1/me     - Authenticated identity");

    // Peer addresses feed rate limiting and trusted-proxy checks
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
