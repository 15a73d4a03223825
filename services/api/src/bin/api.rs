//! services/api/src/bin/api.rs

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use reflects_api::{
    adapters::{DbAdapter, InMemoryCounterStore, LocalObjectStore, RedisCounterStore},
    config::{Config, CounterBackend},
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use reflects_core::cascade::Obsolescence;
use reflects_core::ports::{CounterStore, ObjectStore};
use reflects_core::rate_limit::RateLimiter;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const MEMORY_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(config.database.connect_options()?)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Rate Limiter ---
    let counter_store: Arc<dyn CounterStore> = match &config.counter_backend {
        CounterBackend::Redis { url } => {
            info!("Connecting to Redis...");
            Arc::new(RedisCounterStore::connect(url).await?)
        }
        CounterBackend::Memory => {
            info!("Using in-process rate limit counters");
            let store = Arc::new(InMemoryCounterStore::new());
            let sweeper = store.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(MEMORY_CLEANUP_INTERVAL);
                loop {
                    interval.tick().await;
                    sweeper.cleanup().await;
                }
            });
            store
        }
    };
    let rate_limiter = Arc::new(RateLimiter::new(counter_store, config.rate_limit_mode));
    info!(mode = rate_limiter.mode().as_str(), "Rate limiter ready");

    // --- 4. Build the Shared AppState ---
    let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
        config.upload_dir.clone(),
        config.upload_base_url.clone(),
    ));
    let app_state = Arc::new(AppState {
        db: db_adapter.clone(),
        config: config.clone(),
        rate_limiter,
        obsolescence: Arc::new(Obsolescence::new(db_adapter, objects.clone())),
        objects,
    });

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let mut app = Router::new()
        .merge(web::router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // Uploaded videos are served back only when their URLs are local paths.
    let upload_path = config.upload_base_url.trim_end_matches('/');
    if upload_path.starts_with('/') && upload_path.len() > 1 {
        tokio::fs::create_dir_all(&config.upload_dir).await?;
        app = app.nest_service(upload_path, ServeDir::new(&config.upload_dir));
    }
    let app = app.layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
