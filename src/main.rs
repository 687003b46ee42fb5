use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chainq::config::{RegistryConfig, ServerConfig};
use chainq::{abuse, api, auth, state::AppState, store};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chainq=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting chain queue...");

    let server_config = ServerConfig::from_env();
    let registry_config = RegistryConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());
    let abuse_config = abuse::AbuseConfig::from_env();

    let store = store::from_config(&registry_config);
    let state = match AppState::load(registry_config, store).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load persisted assignments");
            std::process::exit(1);
        }
    };

    if let Some(ref limiter) = abuse_config.rate_limiter {
        abuse::spawn_cleanup(limiter.clone());
    }

    let state = Arc::new(
        state
            .with_auth(auth_config)
            .with_rate_limiter(abuse_config.rate_limiter),
    );

    let mut app = api::router(state);
    if let Some(ref dir) = server_config.static_dir {
        tracing::info!(dir = %dir.display(), "Serving static files");
        app = app.fallback_service(ServeDir::new(dir));
    }

    let listener = match tokio::net::TcpListener::bind(server_config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %server_config.addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on http://{}", server_config.addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
    tracing::info!("Shut down cleanly");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
