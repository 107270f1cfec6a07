// Weather Lookup API v0.1
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod clock;
mod config;
mod db;
mod errors;
mod helpers;
mod routes;
mod services;

use clock::SystemClock;
use config::AppConfig;
use db::store::SqliteKvStore;
use routes::weather::{AppState, WeatherLookup};
use services::openweather::OpenWeatherClient;
use services::pruner::{PrunerState, SharedPrunerState};

/// OpenAPI document for the Weather Lookup API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Weather Lookup API",
        version = "0.1.0",
        description = "Current-weather lookup for named locations. \
            Results are cached locally for a short freshness window to avoid \
            redundant provider calls, and the most recently viewed locations are \
            kept with their last-known conditions.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Weather", description = "Weather lookup and recent locations"),
        (name = "Pruner", description = "Background cache pruner status"),
    ),
    paths(
        routes::health::health_check,
        routes::weather::get_weather,
        routes::weather::list_recent,
        routes::pruner::get_pruner_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::weather::WeatherResponse,
            routes::weather::RecentSummary,
            routes::weather::RecentLocationResponse,
            services::pruner::PrunerState,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_lookup_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Open the key-value store (runs migrations)
    let store = Arc::new(
        SqliteKvStore::connect(&config.database_url)
            .await
            .expect("Failed to open key-value store"),
    );
    let pool = store.pool().clone();

    // Create OpenWeatherMap client and the lookup service
    let fetcher = OpenWeatherClient::new(&config.openweather_api_url, &config.openweather_api_key);
    let lookup: Arc<WeatherLookup> = Arc::new(services::lookup::LookupService::new(
        store,
        fetcher,
        Arc::new(SystemClock),
        config.lookup_config(),
    ));

    // Start pruning (first sweep runs immediately), then seed recent history on first run
    let pruner_state: SharedPrunerState = Arc::new(RwLock::new(PrunerState::new(
        lookup.config().prune_interval,
    )));
    let pruner = lookup.start_pruner(pruner_state.clone());

    let seeded = lookup.bootstrap_recent_history().await;
    if seeded > 0 {
        tracing::info!("Recent history bootstrapped with {} locations", seeded);
    }
    let recent: Vec<String> = lookup
        .list_recent()
        .await
        .into_iter()
        .map(|e| e.display_name)
        .collect();
    tracing::info!("Recent locations: [{}]", recent.join(", "));

    // CORS: read-only API for the browser front-end, GET only
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .allow_headers(Any);

    let weather_routes = Router::new()
        .route("/api/v1/weather", get(routes::weather::get_weather))
        .route("/api/v1/recent", get(routes::weather::list_recent))
        .with_state(AppState { lookup });

    // Health check uses the SQLite pool to verify store connectivity
    let health_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(pool);

    let pruner_routes = Router::new()
        .route(
            "/api/v1/pruner/status",
            get(routes::pruner::get_pruner_status),
        )
        .with_state(pruner_state);

    let app = Router::new()
        .merge(health_routes)
        .merge(weather_routes)
        .merge(pruner_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server terminated unexpectedly");

    pruner.shutdown().await;
    tracing::info!("Shutdown complete");
}

/// Resolve on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
