mod config;

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use civitas_api::assistant::{DisabledGenerator, HttpGenerator, ResponseGenerator};
use civitas_api::auth::{AppState, AppStateInner};
use civitas_api::bootstrap::seed_admin;
use civitas_api::credentials::{Argon2Hasher, CredentialHasher};
use civitas_db::Database;
use civitas_db::queries::SeedOutcome;

use crate::config::{Config, CorsOrigins};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "civitas=info,civitas_api=info,civitas_db=info,tower_http=info".into()
            }),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {:#}", e);
            std::process::exit(1);
        }
    };
    if config.jwt_secret_ephemeral {
        warn!("CIVITAS_JWT_SECRET is unset; using a random secret, tokens will not survive a restart");
    }

    // Schema evolution runs inside open and must finish before we serve.
    let db_path = config.db_path.clone();
    let pool = config.pool.clone();
    let db = tokio::task::spawn_blocking(move || Database::open_with(&db_path, pool)).await??;
    let report = db.evolution_report();
    if report.is_clean() {
        info!(
            "Schema up to date ({} patches applied, {} already present)",
            report.applied.len(),
            report.skipped.len()
        );
    } else {
        warn!("Schema patches failed and were skipped: {}", report.failed.join(", "));
    }

    let hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2Hasher);
    match seed_admin(&db, hasher.as_ref(), &config.admin) {
        Ok(SeedOutcome::Created(id)) => info!("Administrator account {} created", id),
        Ok(SeedOutcome::AlreadyPresent) => {}
        Err(e) => warn!("Administrator seeding failed, continuing: {:#}", e),
    }

    let generator: Arc<dyn ResponseGenerator> = match &config.assistant {
        Some(assistant) => {
            info!("Response generator at {}", assistant.url);
            Arc::new(HttpGenerator::new(
                assistant.url.clone(),
                assistant.api_key.clone(),
                assistant.timeout,
            )?)
        }
        None => {
            warn!("CIVITAS_ASSISTANT_URL is unset; chat, eco tips and policy summaries will fail");
            Arc::new(DisabledGenerator)
        }
    };

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl: config.token_ttl,
        hasher,
        generator,
        transition_policy: config.transition_policy,
        decoy_hash: OnceLock::new(),
    });
    // Hash the login decoy now rather than on the first unknown identifier.
    state.decoy_hash();

    let cors = match &config.cors {
        CorsOrigins::Any => CorsLayer::permissive(),
        CorsOrigins::List(origins) => CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins.clone()))
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE]),
    };

    let app = civitas_api::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Civitas listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
