//! Database module for Smriti Server
//!
//! The relational store holds one row per event (`clients`) with its passkeys,
//! storage folder and face collection.

pub mod events;

pub use events::{ClientRecord, PostgresEventDirectory};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

/// Open the connection pool and apply migrations.
pub async fn connect(database_url: &str, config: &Config) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!(
        max_connections = config.database_max_connections,
        "Connected to PostgreSQL and applied migrations"
    );
    Ok(pool)
}
