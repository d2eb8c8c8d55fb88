use game_server::config::{config_path, load_config};
use game_server::server::serve;
use game_server::server_state::ServerState;
use game_server::status;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
/// Activates tracing, loads the config, starts the status endpoint when configured and then serves
/// the game port until Ctrl-C.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let path = config_path();
    let config = match load_config(&path).await {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "Initial load error.");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&config.bind_address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(address = %config.bind_address, %error, "Could not bind game port.");
            std::process::exit(1);
        }
    };
    tracing::info!(address = %config.bind_address, "Tic-tac-toe server listening.");

    let state = Arc::new(ServerState::new(config));
    let shutdown = CancellationToken::new();

    if let Some(address) = state.config.status_address.clone() {
        match TcpListener::bind(&address).await {
            Ok(status_listener) => {
                let app = status::router(state.clone());
                let token = shutdown.clone();
                tokio::spawn(async move {
                    tracing::info!(%address, "Status endpoint listening.");
                    let served = axum::serve(status_listener, app)
                        .with_graceful_shutdown(token.cancelled_owned())
                        .await;
                    if let Err(error) = served {
                        tracing::warn!(%error, "Status endpoint stopped.");
                    }
                });
            }
            // The game keeps running without the operator endpoint.
            Err(error) => tracing::warn!(%address, %error, "Could not bind status endpoint."),
        }
    }

    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested.");
                ctrl_c_token.cancel();
            }
            Err(error) => tracing::error!(%error, "Could not listen for Ctrl-C."),
        }
    });

    serve(listener, state, shutdown).await;
    tracing::info!("Server stopped.");
}
