//! Roster API Server

use roster_api::auth::{
    MemoryRevocationLedger, PasswordConfig, PgRevocationLedger, RevocationLedger,
    RevocationPruner,
};
use roster_api::{create_router, state::AppState};
use roster_core::{
    AppConfig, LoggingConfig, MemoryProjectStore, MemoryUserStore, PgProjectStore, PgUserStore,
    ProjectStore, UserStore,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("roster_api={},tower_http=info,audit=info", config.level).into()
    });

    if config.json_format {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

struct Stores {
    users: Arc<dyn UserStore>,
    projects: Arc<dyn ProjectStore>,
    ledger: Arc<dyn RevocationLedger>,
}

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    let url = config
        .database
        .postgres_url
        .as_deref()
        .filter(|url| !url.is_empty());

    let Some(url) = url else {
        tracing::warn!("DATABASE_URL is not set; using in-memory stores");
        return Ok(Stores {
            users: Arc::new(MemoryUserStore::new()),
            projects: Arc::new(MemoryProjectStore::new()),
            ledger: Arc::new(MemoryRevocationLedger::new()),
        });
    };

    let pool = roster_core::connect_pool(&config.database, url).await?;

    let users = PgUserStore::from_pool(pool.clone());
    users.ensure_schema().await?;
    // References users, so created second
    let projects = PgProjectStore::from_pool(pool.clone());
    projects.ensure_schema().await?;
    let ledger = PgRevocationLedger::from_pool(pool);
    ledger.ensure_schema().await?;

    Ok(Stores {
        users: Arc::new(users),
        projects: Arc::new(projects),
        ledger: Arc::new(ledger),
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);
    tracing::info!(
        algorithm = %config.auth.algorithm,
        strict_rotation = config.auth.strict_rotation,
        "Configuration loaded"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let stores = open_stores(&config).await?;

    let prune_interval = config.auth.prune_interval_secs;
    let state = Arc::new(AppState::new(
        config,
        stores.users,
        stores.projects,
        stores.ledger,
        PasswordConfig::default(),
    )?);

    let pruner =
        RevocationPruner::new(state.auth.clone(), prune_interval).map(RevocationPruner::spawn);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Roster API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/docs", addr);
    tracing::info!("OpenAPI spec at http://{}/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = pruner {
        handle.abort();
    }

    Ok(())
}
