//! Alliance Federation Engine - Main Server

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use alliance_api::AppState;
use alliance_core::{DirectoryRepository, ProviderRepository, SecretCipher};
use alliance_db::{
    create_pool, run_migrations, AesGcmSecretCipher, DatabaseConfig, PgClientRepository,
    PgDirectoryRepository, PgProviderRepository,
};
use alliance_identity::{
    ClientRegistry, DefaultSourceResolver, MemoryStateStore, ProviderRegistry,
};
use alliance_sync::ReconciliationEngine;
use config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let settings = Settings::load().context("Failed to load configuration")?;

    info!(
        "Starting Alliance Federation Engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    let state = initialize_services(&settings).await?;
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,alliance=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

async fn initialize_services(settings: &Settings) -> Result<AppState> {
    info!("Connecting to PostgreSQL...");
    let db_config = DatabaseConfig {
        url: settings.database.url.clone(),
        max_connections: settings.database.max_connections,
        ..DatabaseConfig::default()
    };

    let pool = create_pool(&db_config)
        .await
        .context("Failed to connect to PostgreSQL")?;
    info!("PostgreSQL connection established");

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations applied");

    let cipher: Arc<dyn SecretCipher> = Arc::new(
        AesGcmSecretCipher::from_base64(&settings.security.encryption_key)
            .context("Invalid encryption key")?,
    );

    let provider_repo: Arc<dyn ProviderRepository> =
        Arc::new(PgProviderRepository::new(pool.clone()));
    let directory: Arc<dyn DirectoryRepository> =
        Arc::new(PgDirectoryRepository::new(pool.clone()));

    let providers = Arc::new(ProviderRegistry::new(
        Arc::clone(&provider_repo),
        Arc::clone(&cipher),
        Arc::new(MemoryStateStore::new()),
        settings.security.public_base_url.clone(),
    ));
    let clients = Arc::new(ClientRegistry::new(
        Arc::new(PgClientRepository::new(pool)),
        Arc::clone(&provider_repo),
        Arc::clone(&cipher),
    ));
    let engine = Arc::new(ReconciliationEngine::new(
        provider_repo,
        Arc::clone(&directory),
        Arc::new(DefaultSourceResolver::new(cipher)),
    ));

    info!("All services initialized successfully");
    Ok(AppState::new(providers, clients, engine, directory))
}

fn create_app(state: AppState) -> Router {
    alliance_api::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
