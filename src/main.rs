//! Application entry point.
//!
//! Wires together configuration, logging, the account manager with its
//! persistence queue, the dispatcher, and the HTTP server, then serves
//! until SIGINT/SIGTERM.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use antigravity_proxy::accounts::manager::AccountManager;
use antigravity_proxy::accounts::storage::{AccountStore, SaveQueue};
use antigravity_proxy::api;
use antigravity_proxy::auth::discovery::CloudCodeDiscovery;
use antigravity_proxy::auth::refresh::GoogleTokenRefresher;
use antigravity_proxy::config::Config;
use antigravity_proxy::handler::Dispatcher;
use antigravity_proxy::transport::http::HttpClient;
use antigravity_proxy::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        accounts_file = %config.accounts_file.display(),
        "Starting antigravity-proxy"
    );

    // Load the account pool and start the write-behind persister.
    let store = AccountStore::new(&config.accounts_file);
    let file = store.load()?;
    let saves = SaveQueue::spawn(store);

    let manager = Arc::new(AccountManager::new(
        file,
        Some(saves),
        Arc::new(GoogleTokenRefresher::new()),
        Arc::new(CloudCodeDiscovery::new()),
        &config,
    ));

    let account_count = manager.get_account_count().await;
    tracing::info!(accounts = account_count, "Account pool ready");

    let dispatcher = Dispatcher::new(manager, HttpClient::new(), config.clone());
    let state = AppState { dispatcher };

    let app = api::build_router()
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Listening");

    println!();
    println!("  antigravity-proxy v{} is running", env!("CARGO_PKG_VERSION"));
    println!("  Messages API: http://{listen_addr}/v1/messages");
    println!("  Health:       http://{listen_addr}/health");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully");
    Ok(())
}

/// Set up the tracing subscriber; `RUST_LOG` overrides the defaults.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("antigravity_proxy=info,tower_http=info,warn"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
