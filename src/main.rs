// src/main.rs
// Process entry point (§9 Process lifecycle): tracing init, config load,
// `AppState` assembly, router bind, graceful shutdown on `POST /shutdown`
// or SIGTERM. Grounded in the teacher's `mira-chat/src/server.rs::run` bind
// sequence, generalized with a `tokio::select!` shutdown signal.

use std::time::Duration;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pilot_agent::mcp::local_server::start_sweeper;
use pilot_agent::{AppState, CONFIG};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let level = match CONFIG.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let state = AppState::new(&*CONFIG).await?;
    let state = std::sync::Arc::new(state);

    start_sweeper(
        &state.browser_states,
        Duration::from_secs(CONFIG.mcp.browser_state_sweep_interval_secs),
    );

    let shutdown = state.shutdown.clone();
    let app = pilot_agent::api::http::build_router(state.clone());

    let addr = CONFIG.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}");

    // `/mcp`'s loopback guard (§4.9) reads the peer address off
    // `ConnectInfo`, so the make-service must record it per connection.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    Ok(())
}

async fn shutdown_signal(token: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = token.cancelled() => {}
    }

    info!("shutdown signal received");
}
