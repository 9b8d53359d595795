//! # devHelp API Server
//!
//! Multi-tenant backend for devHelp: company signup, authentication,
//! invitations, company user management and platform administration.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/devhelp \
//! JWT_SECRET=... JWT_REFRESH_SECRET=... \
//! cargo run -p devhelp-api
//! ```
//!
//! `DATABASE_URL=memory` runs against the in-memory store.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use devhelp_api::{
    app::{self, AppState},
    config::{Config, LogFormat},
};
use devhelp_shared::{
    db::{migrations, pool},
    mail::{EmailService, HttpMailer, LogMailer},
    store::{memory::MemoryDatabase, postgres::PgDatabase, Database},
    usecases::seed::{self, SeedOutcome},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "devhelp_api=debug,devhelp_shared=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn connect_database(config: &Config) -> anyhow::Result<Arc<dyn Database>> {
    if config.database.is_memory() {
        tracing::warn!("Using the in-memory database; data is lost on restart");
        return Ok(Arc::new(MemoryDatabase::new(config.database.use_transactions)));
    }

    migrations::ensure_database_exists(&config.database.url)
        .await
        .context("failed to ensure database exists")?;

    let mut pool_config = pool::DatabaseConfig::new(config.database.url.clone());
    pool_config.max_connections = config.database.max_connections;

    let db_pool = pool::create_pool(pool_config)
        .await
        .context("failed to connect to database")?;

    migrations::run_migrations(&db_pool)
        .await
        .context("failed to run migrations")?;

    let stats = pool::get_pool_stats(&db_pool);
    tracing::info!(
        total = stats.total_connections,
        idle = stats.idle_connections,
        "Database ready"
    );

    Ok(Arc::new(PgDatabase::new(db_pool, config.database.use_transactions)))
}

fn build_mailer(config: &Config) -> anyhow::Result<Arc<dyn EmailService>> {
    match &config.mail.api_url {
        Some(url) => {
            let mailer = HttpMailer::new(url.clone(), config.mail.api_key.clone(), config.mail.from.clone())
                .context("failed to build mail client")?;
            Ok(Arc::new(mailer))
        }
        None => {
            tracing::info!("MAIL_API_URL not set; emails will be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.api.log_format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.api.environment,
        "devHelp API server starting"
    );

    let db = connect_database(&config).await?;
    let mailer = build_mailer(&config)?;
    let super_admin = config.super_admin.clone();
    let bind_address = config.bind_address();

    let state = AppState::new(config, db, mailer);

    if let Some(admin) = super_admin {
        match seed::seed_super_admin(&state.services, &admin.email, &admin.password).await {
            Ok(SeedOutcome::Created) => tracing::info!(email = %admin.email, "Super admin created"),
            Ok(SeedOutcome::Updated) => tracing::info!(email = %admin.email, "Super admin updated"),
            Ok(SeedOutcome::Skipped) => {}
            Err(e) => return Err(anyhow::anyhow!("failed to seed super admin: {e}")),
        }
    }

    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
