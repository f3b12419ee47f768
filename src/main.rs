use penfeel_collab::{
    auth::{Authenticator, JwtAuthenticator, RemoteAuthenticator},
    build_router,
    db::{MemoryDocumentStore, PgDocumentStore},
    services::DocumentStore,
    AppState, Config,
};
use std::panic;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "penfeel_collab=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    info!(
        "Service '{}' running in '{}' environment",
        config.service_name, config.environment
    );

    // Pick the authenticator: remote auth service first, local JWT secret otherwise
    let authenticator: Arc<dyn Authenticator> = if let Some(url) = &config.auth_service_url {
        match RemoteAuthenticator::new(url, Duration::from_secs(config.auth_cache_ttl_secs)) {
            Ok(auth) => Arc::new(auth),
            Err(e) => {
                error!("Failed to set up auth service client: {}", e);
                return;
            }
        }
    } else if let Some(secret) = &config.jwt_secret {
        match JwtAuthenticator::new(secret.clone()) {
            Ok(auth) => Arc::new(auth),
            Err(e) => {
                error!("Invalid JWT configuration: {}", e);
                return;
            }
        }
    } else {
        error!("Neither AUTH_SERVICE_URL nor JWT_SECRET is configured - refusing to start");
        return;
    };

    // Initialize database connection if URL is provided
    let store: Arc<dyn DocumentStore> = match &config.db_url {
        Some(db_url) => match PgDocumentStore::connect(db_url).await {
            Ok(db) => {
                if let Err(e) = db.ensure_schema().await {
                    warn!("Failed to ensure database schema: {}", e);
                }
                info!("Database initialized successfully");
                Arc::new(db)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Falling back to the in-memory document store");
                Arc::new(MemoryDocumentStore::new())
            }
        },
        None => {
            warn!("No database URL configured - documents are kept in memory only");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    let state = AppState::new(authenticator, store, config.outbound_queue_capacity);
    let app_routes = build_router(state, &config);

    // Start the HTTP server
    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            return;
        }
    };

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 Sessions available at ws://{}/api/v1/documents/{{id}}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    if let Err(e) = axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
