//! Metadata storage using SQLite
//!
//! This module handles all persistent state:
//! - Owners (tenants)
//! - Documents (immutable id, editable slug)
//! - Chunks (content + payload bag + embedding blob)
//! - Processing jobs (durable pipeline status)

mod schema;

pub use schema::*;

use crate::embed::EmbeddingSpace;
use crate::error::{Error, Result};
use crate::pipeline::JobStatus;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A tenant that documents belong to
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub created_at: String,
}

impl Owner {
    pub fn new(name: String, display_name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            display_name,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A document row.
///
/// The id is opaque and immutable; every downstream relationship references
/// it. The slug is a routing key and may change at any time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub owner_id: String,
    pub embedding_space: String,
    pub public: bool,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentRecord {
    pub fn space(&self) -> Result<EmbeddingSpace> {
        self.embedding_space.parse()
    }
}

/// Everything needed to create a document during ingestion
#[derive(Debug, Clone)]
pub struct DocumentSpec {
    pub slug: String,
    pub title: String,
    pub owner_id: String,
    pub embedding_space: EmbeddingSpace,
    pub public: bool,
}

/// A persisted chunk row
#[derive(Debug, Clone, FromRow)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub payload_json: String,
    pub embedding: Vec<u8>,
    pub created_at: String,
}

/// A chunk ready for insertion
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i64,
    pub content: String,
    pub payload_json: String,
    pub embedding: Vec<u8>,
}

/// A processing job row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: String,
    pub document_id: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub owner_id: String,
    pub slug: String,
    pub title: String,
    pub embedding_space: String,
    pub status: String,
    pub stage: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProcessingJob {
    pub fn new(file_name: String, content_type: String, spec: &DocumentSpec) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: None,
            file_name,
            content_type,
            owner_id: spec.owner_id.clone(),
            slug: spec.slug.clone(),
            title: spec.title.clone(),
            embedding_space: spec.embedding_space.to_string(),
            status: JobStatus::Pending.to_string(),
            stage: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn job_status(&self) -> Result<JobStatus> {
        self.status.parse()
    }

    pub fn space(&self) -> Result<EmbeddingSpace> {
        self.embedding_space.parse()
    }

    /// Seconds since the job status was last touched
    pub fn seconds_since_update(&self) -> i64 {
        chrono::DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|t| (Utc::now() - t.with_timezone(&Utc)).num_seconds())
            .unwrap_or(i64::MAX)
    }
}

/// Denormalized registry row (document joined with owner display fields)
#[derive(Debug, Clone, FromRow)]
pub struct RegistryRow {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub owner_id: String,
    pub owner_name: String,
    pub embedding_space: String,
    pub public: bool,
    pub active: bool,
}

/// Database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the database file, creating it if missing
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Connect to an in-memory database (tests)
    pub async fn connect_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ===== Owner operations =====

    pub async fn upsert_owner(&self, owner: &Owner) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO owners (id, name, display_name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET display_name = excluded.display_name
            "#,
        )
        .bind(&owner.id)
        .bind(&owner.name)
        .bind(&owner.display_name)
        .bind(&owner.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_owner_by_name(&self, name: &str) -> Result<Option<Owner>> {
        let owner = sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    // ===== Document operations =====

    /// Create the document row. The pipeline calls this strictly before any
    /// chunk write so the chunk foreign key always has a target.
    pub async fn create_document(&self, spec: &DocumentSpec) -> Result<DocumentRecord> {
        let now = Utc::now().to_rfc3339();
        let record = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            slug: spec.slug.clone(),
            title: spec.title.clone(),
            owner_id: spec.owner_id.clone(),
            embedding_space: spec.embedding_space.to_string(),
            public: spec.public,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, slug, title, owner_id, embedding_space, public, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.slug)
        .bind(&record.title)
        .bind(&record.owner_id)
        .bind(&record.embedding_space)
        .bind(record.public)
        .bind(record.active)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let doc = sqlx::query_as::<_, DocumentRecord>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    pub async fn get_document_by_slug(&self, slug: &str) -> Result<Option<DocumentRecord>> {
        let doc = sqlx::query_as::<_, DocumentRecord>("SELECT * FROM documents WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let docs =
            sqlx::query_as::<_, DocumentRecord>("SELECT * FROM documents ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(docs)
    }

    /// Update the editable fields (slug, title). Chunk and job associations
    /// survive because they reference the immutable id.
    pub async fn update_document(&self, id: &str, slug: &str, title: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET slug = ?, title = ?, updated_at = ? WHERE id = ?",
        )
        .bind(slug)
        .bind(title)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Soft-disable or re-enable a document
    pub async fn set_document_active(&self, id: &str, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Rows for the document registry: documents denormalized with owner
    /// display fields, read in one query so a snapshot is internally
    /// consistent.
    pub async fn registry_rows(&self) -> Result<Vec<RegistryRow>> {
        let rows = sqlx::query_as::<_, RegistryRow>(
            r#"
            SELECT d.id, d.slug, d.title, d.owner_id, o.display_name AS owner_name,
                   d.embedding_space, d.public, d.active
            FROM documents d
            JOIN owners o ON o.id = d.owner_id
            ORDER BY d.created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ===== Chunk operations =====

    /// Insert a batch of chunks for a document inside one transaction.
    ///
    /// The owning document must already exist; attempting to write chunks
    /// first is an integrity violation, not a retryable failure.
    pub async fn insert_chunks(&self, document_id: &str, chunks: &[NewChunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        if self.get_document(document_id).await?.is_none() {
            return Err(Error::Integrity(format!(
                "Chunk write attempted before document {} exists",
                document_id
            )));
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (id, document_id, chunk_index, content, payload_json, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.payload_json)
            .bind(&chunk.embedding)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(chunks.len())
    }

    /// All chunks of a document in insertion order
    pub async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            "SELECT * FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    pub async fn count_chunks(&self, document_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn total_chunks(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Delete a document's chunks (re-ingest replaces them)
    pub async fn delete_chunks(&self, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ===== Job operations =====

    pub async fn insert_job(&self, job: &ProcessingJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processing_jobs
                (id, document_id, file_name, content_type, owner_id, slug, title,
                 embedding_space, status, stage, error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.document_id)
        .bind(&job.file_name)
        .bind(&job.content_type)
        .bind(&job.owner_id)
        .bind(&job.slug)
        .bind(&job.title)
        .bind(&job.embedding_space)
        .bind(&job.status)
        .bind(&job.stage)
        .bind(&job.error_message)
        .bind(&job.created_at)
        .bind(&job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<ProcessingJob>> {
        let job = sqlx::query_as::<_, ProcessingJob>("SELECT * FROM processing_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    pub async fn require_job(&self, id: &str) -> Result<ProcessingJob> {
        self.get_job(id)
            .await?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    pub async fn list_jobs(&self) -> Result<Vec<ProcessingJob>> {
        let jobs = sqlx::query_as::<_, ProcessingJob>(
            "SELECT * FROM processing_jobs ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// Persist a status change, always touching `updated_at`
    pub async fn set_job_status(
        &self,
        id: &str,
        status: JobStatus,
        stage: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = ?, stage = ?, error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(stage)
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::JobNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Record which document a job materialized
    pub async fn set_job_document(&self, id: &str, document_id: &str) -> Result<()> {
        sqlx::query("UPDATE processing_jobs SET document_id = ?, updated_at = ? WHERE id = ?")
            .bind(document_id)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Backdate a job's `updated_at` (tests exercising staleness)
    #[doc(hidden)]
    pub async fn backdate_job(&self, id: &str, updated_at: &str) -> Result<()> {
        sqlx::query("UPDATE processing_jobs SET updated_at = ? WHERE id = ?")
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh_db() -> MetaDb {
        let db = MetaDb::connect_memory().await.unwrap();
        db.init_schema().await.unwrap();
        db
    }

    fn spec(owner_id: &str, slug: &str) -> DocumentSpec {
        DocumentSpec {
            slug: slug.to_string(),
            title: "Test Document".to_string(),
            owner_id: owner_id.to_string(),
            embedding_space: EmbeddingSpace::Local,
            public: false,
        }
    }

    async fn seed_owner(db: &MetaDb) -> Owner {
        let owner = Owner::new("acme".to_string(), "Acme Corp".to_string());
        db.upsert_owner(&owner).await.unwrap();
        owner
    }

    fn chunk(index: i64, content: &str) -> NewChunk {
        NewChunk {
            chunk_index: index,
            content: content.to_string(),
            payload_json: r#"{"page_number":1}"#.to_string(),
            embedding: vec![0u8; 16],
        }
    }

    #[tokio::test]
    async fn test_document_roundtrip() {
        let db = fresh_db().await;
        let owner = seed_owner(&db).await;

        let doc = db.create_document(&spec(&owner.id, "handbook")).await.unwrap();
        let by_id = db.get_document(&doc.id).await.unwrap().unwrap();
        let by_slug = db.get_document_by_slug("handbook").await.unwrap().unwrap();

        assert_eq!(by_id.id, doc.id);
        assert_eq!(by_slug.id, doc.id);
        assert!(by_id.active);
    }

    #[tokio::test]
    async fn test_slug_edit_keeps_chunk_association() {
        let db = fresh_db().await;
        let owner = seed_owner(&db).await;
        let doc = db.create_document(&spec(&owner.id, "old-slug")).await.unwrap();
        db.insert_chunks(&doc.id, &[chunk(0, "body")]).await.unwrap();

        db.update_document(&doc.id, "new-slug", "New Title").await.unwrap();

        assert!(db.get_document_by_slug("old-slug").await.unwrap().is_none());
        let renamed = db.get_document_by_slug("new-slug").await.unwrap().unwrap();
        assert_eq!(renamed.id, doc.id);
        assert_eq!(db.count_chunks(&doc.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_chunk_write_without_document_is_integrity_error() {
        let db = fresh_db().await;
        let err = db
            .insert_chunks("no-such-document", &[chunk(0, "orphan")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
        assert_eq!(db.total_chunks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chunks_ordered_by_index() {
        let db = fresh_db().await;
        let owner = seed_owner(&db).await;
        let doc = db.create_document(&spec(&owner.id, "doc")).await.unwrap();

        db.insert_chunks(&doc.id, &[chunk(2, "third"), chunk(0, "first"), chunk(1, "second")])
            .await
            .unwrap();

        let chunks = db.chunks_for_document(&doc.id).await.unwrap();
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_job_lifecycle_rows() {
        let db = fresh_db().await;
        let owner = seed_owner(&db).await;
        let job = ProcessingJob::new(
            "notes.txt".to_string(),
            "text/plain".to_string(),
            &spec(&owner.id, "notes"),
        );
        db.insert_job(&job).await.unwrap();

        let loaded = db.require_job(&job.id).await.unwrap();
        assert_eq!(loaded.job_status().unwrap(), JobStatus::Pending);

        db.set_job_status(&job.id, JobStatus::Processing, Some("extract"), None)
            .await
            .unwrap();
        let loaded = db.require_job(&job.id).await.unwrap();
        assert_eq!(loaded.job_status().unwrap(), JobStatus::Processing);
        assert_eq!(loaded.stage.as_deref(), Some("extract"));

        assert!(matches!(
            db.set_job_status("missing", JobStatus::Ready, None, None)
                .await
                .unwrap_err(),
            Error::JobNotFound(_)
        ));
    }
}
