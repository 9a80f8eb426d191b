use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use what_went_wrong_api::{
    app::{self, AppState},
    auth::{JwksKeyResolver, TokenVerifier},
    config::AppConfig,
    database,
    plans::{PgPlanRepository, PlanStore},
};

#[derive(Parser)]
#[command(name = "what-went-wrong-api")]
#[command(about = "What Went Wrong API server")]
#[command(version)]
struct ServerArgs {
    #[arg(long, default_value = "0.0.0.0", help = "Address to bind")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 3000, help = "Port to listen on")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up AUTH0_DOMAIN, DATABASE_URL, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = ServerArgs::parse();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!("Starting What Went Wrong API in {:?} mode", config.environment);

    let pool = database::connect(&config.database)
        .await
        .context("failed to connect to database")?;

    let jwks_url = config.auth.jwks_url()?;
    let resolver = Arc::new(
        JwksKeyResolver::discover(jwks_url, &config.jwks)
            .await
            .context("failed to load signing keys")?,
    );
    let refresh = resolver.clone().spawn_refresh(config.jwks.refresh_interval());

    let verifier = TokenVerifier::new(resolver, config.auth.audience.clone(), config.auth.issuer())
        .with_leeway(config.auth.leeway());
    let plans = PlanStore::new(Arc::new(PgPlanRepository::new(pool)), config.plans.clone());

    let state = AppState::new(
        Arc::new(verifier),
        plans,
        config.auth.expose_failure_detail,
    );

    let bind_addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("What Went Wrong API listening on http://{}", bind_addr);

    axum::serve(listener, app::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    refresh.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
