//! # ProfileHub API Server
//!
//! Serves user registration, login, profile management and image uploads.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/profilehub \
//! JWT_SECRET=$(openssl rand -hex 32) \
//! cargo run -p profilehub-api
//! ```

use profilehub_api::{
    app::{build_blob_store, build_router, AppState},
    config::Config,
};
use profilehub_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "profilehub_api=debug,profilehub_shared=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "ProfileHub API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let db = create_pool(config.database.pool_config()).await?;
    run_migrations(&db).await?;

    let signer = config.url_signer()?;
    let store = build_blob_store(&config, signer.clone()).await?;

    let bind_address = config.bind_address();
    let state = AppState::new(db.clone(), config, store, signer);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown signal received, closing database pool");
    close_pool(db).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
