//! Event directory backed by the `clients` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smriti_core::{EventDirectory, EventScope, SmritiError};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Event row as stored in the database
#[derive(Debug, Clone, FromRow)]
pub struct ClientRecord {
    pub id: Uuid,
    pub name: String,
    pub s3_folder_path: String,
    pub rekognition_collection_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<ClientRecord> for EventScope {
    fn from(record: ClientRecord) -> Self {
        EventScope::new(record.s3_folder_path, record.rekognition_collection_id)
    }
}

/// Repository resolving passkeys against `clients`
#[derive(Clone)]
pub struct PostgresEventDirectory {
    pool: PgPool,
}

impl PostgresEventDirectory {
    /// Create a new directory over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check database connection health
    pub async fn check_health(&self) -> Result<(), SmritiError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| SmritiError::Directory(e.to_string()))?;
        Ok(())
    }

    /// Find the active event whose guest passkey matches
    pub async fn find_by_user_passkey(
        &self,
        passkey: &str,
    ) -> Result<Option<ClientRecord>, sqlx::Error> {
        sqlx::query_as::<_, ClientRecord>(
            r#"
            SELECT id, name, s3_folder_path, rekognition_collection_id, created_at
            FROM clients
            WHERE user_passkey = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(passkey)
        .fetch_optional(&self.pool)
        .await
    }

    /// Find the active event whose owner passkey matches
    pub async fn find_by_client_passkey(
        &self,
        passkey: &str,
    ) -> Result<Option<ClientRecord>, sqlx::Error> {
        sqlx::query_as::<_, ClientRecord>(
            r#"
            SELECT id, name, s3_folder_path, rekognition_collection_id, created_at
            FROM clients
            WHERE client_passkey = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(passkey)
        .fetch_optional(&self.pool)
        .await
    }
}

#[async_trait]
impl EventDirectory for PostgresEventDirectory {
    async fn resolve_guest(&self, passkey: &str) -> smriti_core::Result<Option<EventScope>> {
        let record = self
            .find_by_user_passkey(passkey.trim())
            .await
            .map_err(|e| SmritiError::Directory(e.to_string()))?;
        if let Some(ref r) = record {
            tracing::debug!(event_id = %r.id, event = %r.name, "Guest passkey resolved");
        }
        Ok(record.map(EventScope::from))
    }

    async fn resolve_owner(&self, passkey: &str) -> smriti_core::Result<Option<EventScope>> {
        let record = self
            .find_by_client_passkey(passkey.trim())
            .await
            .map_err(|e| SmritiError::Directory(e.to_string()))?;
        Ok(record.map(EventScope::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_to_scope() {
        let record = ClientRecord {
            id: Uuid::new_v4(),
            name: "Asha & Ravi".into(),
            s3_folder_path: "Wedding_images/asha".into(),
            rekognition_collection_id: "asha_faces".into(),
            created_at: Utc::now(),
        };
        let scope = EventScope::from(record);
        assert_eq!(scope.prefix, "Wedding_images/asha");
        assert_eq!(scope.collection_id, "asha_faces");
    }
}
