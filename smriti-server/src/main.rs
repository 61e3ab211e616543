//! Smriti Server - REST API for finding guests in event photos
//!
//! Endpoints:
//! - POST /searches - Start a search (multipart: passkey, file)
//! - POST /searches/{id}/step - Search the next batch of photos
//! - GET /searches/{id} - Progress and links to matched photos
//! - GET /searches/{id}/archive - Matched photos as a zip
//! - DELETE /searches/{id} - Abandon a search and release its face
//! - POST /photos - Upload photos (multipart: passkey, file...)
//!
//! Searches left untouched for `SESSION_TTL_SECS` are dropped by a background sweep.

use std::net::SocketAddr;
use std::sync::Arc;

use smriti_core::{
    AwsConfig, EventDirectory, EventScope, ObjectStore, PipelineConfig, RekognitionRecognizer,
    S3ObjectStore, StaticEventDirectory,
};
use smriti_server::{create_router_with_config, db, AppState, Config, PostgresEventDirectory};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("smriti_server=info,smriti_core=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    let pipeline = PipelineConfig::from_env()?;
    tracing::info!(?config, bucket = %pipeline.bucket, "Starting Smriti server");

    let sdk_config = AwsConfig::from_env().load().await;
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&sdk_config));
    let recognizer = Arc::new(RekognitionRecognizer::new(&sdk_config));

    let directory: Arc<dyn EventDirectory> = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, &config).await?;
            Arc::new(PostgresEventDirectory::new(pool))
        }
        None => Arc::new(static_directory(&config, &pipeline)),
    };

    let state =
        AppState::new(store, recognizer, directory, pipeline).with_session_ttl(config.session_ttl());
    let sweeper = state.spawn_session_sweeper(config.session_sweep_interval());
    let app = create_router_with_config(state, &config);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API docs at http://{}/docs", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    sweeper.abort();

    tracing::info!("Server stopped");
    Ok(())
}

/// Single-event directory from `USER_PASSKEY` / `CLIENT_PASSKEY`
fn static_directory(config: &Config, pipeline: &PipelineConfig) -> StaticEventDirectory {
    match (&config.user_passkey, &config.client_passkey) {
        (Some(guest), Some(owner)) => {
            tracing::info!(prefix = %pipeline.prefix, "Using single-event directory");
            StaticEventDirectory::new().with_event(
                guest.clone(),
                owner.clone(),
                EventScope::new(pipeline.prefix.clone(), pipeline.collection_id.clone()),
            )
        }
        _ => {
            tracing::warn!(
                "No DATABASE_URL and no USER_PASSKEY/CLIENT_PASSKEY: every passkey will be rejected"
            );
            StaticEventDirectory::new()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
