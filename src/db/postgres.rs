use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use tracing::{error, info};

use crate::models::{DocumentId, DocumentSnapshot, ParticipantId};
use crate::services::doc_store::{DocumentStore, StoreError};

const UNAVAILABLE: &str = "document service unavailable";

const SCHEMA_SQL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id UUID PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        user_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS document_acl (
        document UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        permission TEXT NOT NULL CHECK (permission IN ('view', 'edit')),
        PRIMARY KEY (document, user_id)
    )
    "#,
];

/// Document row from database
#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentRow {
    id: uuid::Uuid,
    title: String,
    content: String,
    user_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DocumentRow> for DocumentSnapshot {
    fn from(row: DocumentRow) -> Self {
        DocumentSnapshot {
            id: row.id,
            title: row.title,
            content: row.content,
            owner: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn unavailable(op: &str, document: DocumentId, e: SqlxError) -> StoreError {
    error!("Database error during {} of document '{}': {}", op, document, e);
    StoreError::transient(UNAVAILABLE, e)
}

/// Postgres-backed document store
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create the document tables when they are missing.
    pub async fn ensure_schema(&self) -> Result<(), SqlxError> {
        for statement in SCHEMA_SQL {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn log_pool_state(&self, op: &str, document: DocumentId) {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        info!(
            "{} doc {}. Pool connections: {} idle, {} in use",
            op,
            document,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, document: DocumentId, participant: &ParticipantId) -> Result<DocumentSnapshot, StoreError> {
        self.log_pool_state("Loading", document);

        let query_sql = r#"
            SELECT d.id, d.title, d.content, d.user_id, d.created_at, d.updated_at
            FROM documents d
            WHERE d.id = $1
                AND (
                    d.user_id = $2 OR
                    EXISTS (SELECT 1 FROM document_acl da WHERE da.document = d.id AND da.user_id = $2)
                )
        "#;

        sqlx::query_as::<_, DocumentRow>(query_sql)
            .bind(document)
            .bind(participant.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable("load", document, e))?
            .map(DocumentSnapshot::from)
            .ok_or(StoreError::NotFound)
    }

    async fn update(
        &self,
        document: DocumentId,
        participant: &ParticipantId,
        title: &str,
        content: &str,
    ) -> Result<DocumentSnapshot, StoreError> {
        self.log_pool_state("Updating", document);

        let update_sql = r#"
            UPDATE documents d
            SET title = $1,
                content = $2,
                updated_at = NOW()
            WHERE d.id = $3
                AND (
                    d.user_id = $4 OR
                    EXISTS (
                        SELECT 1 FROM document_acl da
                        WHERE da.document = d.id AND da.user_id = $4 AND da.permission = 'edit'
                    )
                )
            RETURNING d.id, d.title, d.content, d.user_id, d.created_at, d.updated_at
        "#;

        let row = sqlx::query_as::<_, DocumentRow>(update_sql)
            .bind(title)
            .bind(content)
            .bind(document)
            .bind(participant.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable("update", document, e))?;

        match row {
            Some(row) => {
                info!("Document updated: {}", document);
                Ok(row.into())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, document: DocumentId, participant: &ParticipantId) -> Result<(), StoreError> {
        self.log_pool_state("Deleting", document);

        let result = sqlx::query("DELETE FROM documents WHERE id = $1 AND user_id = $2")
            .bind(document)
            .bind(participant.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| unavailable("delete", document, e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        info!("Document deleted: {}", document);
        Ok(())
    }
}
