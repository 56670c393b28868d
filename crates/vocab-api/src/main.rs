use std::sync::Arc;

use vocab_api::{app_router, AppConfig, AppState, SyncStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vocab_api=info".parse()?),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting vocab-api with config: {:?}", config);

    let store = SyncStore::open(&config.database_path)?;
    let state = AppState::new(config.clone(), store);
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        "vocab-api listening on {} (merge policy: {})",
        config.bind_addr,
        config.merge_policy
    );
    axum::serve(listener, router).await?;
    Ok(())
}
