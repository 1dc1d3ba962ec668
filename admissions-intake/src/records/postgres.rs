//! `PostgreSQL` metadata recorder

use super::{DocumentId, DocumentRecord, MetadataRecorder, RecordError};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

const INSERT_DOCUMENT: &str = r"
INSERT INTO documents
    (application_form_id, document_type, original_filename, stored_filename, file_path,
     file_size, compressed_size, mime_type, is_compressed, uploaded_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
RETURNING id
";

/// Writes records into the `documents` table through a connection pool
///
/// Expects `documents.id` to be a `BIGINT`/`BIGSERIAL` column and the size
/// columns to be `BIGINT`.
#[derive(Debug, Clone)]
pub struct PgMetadataRecorder {
    pool: PgPool,
}

impl PgMetadataRecorder {
    /// Wraps an existing pool
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Database` if the database is unreachable.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RecordError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_column(value: u64, column: &str) -> Result<i64, RecordError> {
    i64::try_from(value).map_err(|_| RecordError::Rejected(format!("{column} {value} does not fit BIGINT")))
}

#[async_trait]
impl MetadataRecorder for PgMetadataRecorder {
    async fn record(&self, record: &DocumentRecord) -> Result<DocumentId, RecordError> {
        let stored = &record.stored;
        let id = sqlx::query_scalar::<_, i64>(INSERT_DOCUMENT)
            .bind(record.form_id)
            .bind(&record.category)
            .bind(&record.original_filename)
            .bind(&stored.stored_filename)
            .bind(stored.path.to_string_lossy().into_owned())
            .bind(to_column(stored.original_size, "file_size")?)
            .bind(to_column(stored.final_size, "compressed_size")?)
            .bind(&stored.mime_type)
            .bind(stored.is_compressed)
            .bind(record.uploaded_at)
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!(document_id = id, owner = %record.owner, "document record inserted");
        Ok(id)
    }
}
