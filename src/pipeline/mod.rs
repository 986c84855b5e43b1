//! Processing pipeline
//!
//! Turns an uploaded source file into persisted, embedded chunks behind a
//! durable per-job state machine:
//!
//! ```text
//! pending -> processing -> ready
//!                       -> error -> pending (retry)
//!            processing -> pending (stale self-heal)
//! ```
//!
//! Within a job the steps are strictly sequential: extract, chunk, embed,
//! create the document row, persist chunks. The document row always exists
//! before the first chunk write; that ordering is what keeps failed runs
//! from leaving orphan chunks behind.

use crate::admission::AdmissionController;
use crate::chunk::{self, ChunkDraft};
use crate::config::Config;
use crate::embed::cache::EmbeddingCache;
use crate::error::{Error, Result};
use crate::extract::{self, TextExtractor};
use crate::meta::{DocumentSpec, MetaDb, NewChunk, ProcessingJob};
use crate::notify::{self, Notifier};
use crate::store::{encode_embedding, ChunkPayload};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Ready,
    Error,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Ready => write!(f, "ready"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "ready" => Ok(JobStatus::Ready),
            "error" => Ok(JobStatus::Error),
            _ => Err(Error::Config(format!("Unknown job status: {}", s))),
        }
    }
}

impl JobStatus {
    /// The validated transition table. `ready -> pending` and
    /// `error -> pending` are the retry edges; `processing -> pending` is
    /// the stale self-heal edge and is additionally guarded by the
    /// staleness check at the call site.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Ready)
                | (JobStatus::Processing, JobStatus::Error)
                | (JobStatus::Processing, JobStatus::Pending)
                | (JobStatus::Error, JobStatus::Pending)
                | (JobStatus::Ready, JobStatus::Pending)
        )
    }

    pub fn transition_to(self, next: JobStatus) -> Result<JobStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::IllegalTransition(format!("{} -> {}", self, next)))
        }
    }
}

/// Named pipeline stages for error attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    Extract,
    Chunk,
    Embed,
    CreateDocument,
    PersistChunks,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Extract => write!(f, "extract"),
            PipelineStage::Chunk => write!(f, "chunk"),
            PipelineStage::Embed => write!(f, "embed"),
            PipelineStage::CreateDocument => write!(f, "create-document"),
            PipelineStage::PersistChunks => write!(f, "persist-chunks"),
        }
    }
}

/// The ingestion pipeline
pub struct ProcessingPipeline {
    db: MetaDb,
    cache: Arc<EmbeddingCache>,
    extractor: Arc<dyn TextExtractor>,
    notifier: Arc<dyn Notifier>,
    admission: AdmissionController,
    config: Config,
    spool_dir: PathBuf,
}

impl ProcessingPipeline {
    pub fn new(
        db: MetaDb,
        cache: Arc<EmbeddingCache>,
        extractor: Arc<dyn TextExtractor>,
        notifier: Arc<dyn Notifier>,
        admission: AdmissionController,
        config: Config,
    ) -> Self {
        let spool_dir = config.paths.spool_dir.clone();
        Self {
            db,
            cache,
            extractor,
            notifier,
            admission,
            config,
            spool_dir,
        }
    }

    fn spool_path(&self, job_id: &str) -> PathBuf {
        self.spool_dir.join(job_id)
    }

    /// Accept an upload: validate, spool the bytes, create the job in
    /// `pending`. Fails fast on type/size problems before any row exists.
    pub async fn enqueue(
        &self,
        file_name: &str,
        bytes: &[u8],
        spec: DocumentSpec,
    ) -> Result<String> {
        let content_type =
            extract::validate_upload(file_name, bytes.len() as u64, &self.config.upload)?;

        let job = ProcessingJob::new(file_name.to_string(), content_type, &spec);

        std::fs::create_dir_all(&self.spool_dir)?;
        std::fs::write(self.spool_path(&job.id), bytes)?;
        self.db.insert_job(&job).await?;

        info!(job_id = %job.id, file = %file_name, "Enqueued processing job");
        Ok(job.id)
    }

    /// Run a job to completion (or to `error`).
    ///
    /// A fresh `processing` job is left alone; a stale one is force-reset
    /// and re-claimed, which self-heals crashed workers without operator
    /// intervention.
    pub async fn run(&self, job_id: &str) -> Result<()> {
        let _permit = self.admission.admit_job()?;

        let job = self.claim(job_id).await?;

        match self.execute(&job).await {
            Ok(chunk_count) => {
                self.db
                    .set_job_status(job_id, JobStatus::Ready, None, None)
                    .await?;
                info!(job_id = %job_id, chunks = chunk_count, "Job ready");

                let completed = self.db.require_job(job_id).await?;
                notify::dispatch_completed(Arc::clone(&self.notifier), completed);
                Ok(())
            }
            Err(Error::Provider { stage, message }) => {
                self.db
                    .set_job_status(
                        job_id,
                        JobStatus::Error,
                        Some(&stage.to_string()),
                        Some(&message),
                    )
                    .await?;
                warn!(job_id = %job_id, stage = %stage, "Job failed: {}", message);

                let failed = self.db.require_job(job_id).await?;
                notify::dispatch_failed(
                    Arc::clone(&self.notifier),
                    failed,
                    stage.to_string(),
                    message.clone(),
                );
                Err(Error::Provider { stage, message })
            }
            Err(other) => {
                // Validation and integrity failures also park the job in
                // `error` so the status stays queryable
                let message = other.to_string();
                self.db
                    .set_job_status(job_id, JobStatus::Error, None, Some(&message))
                    .await?;
                Err(other)
            }
        }
    }

    /// Retry a job. `error` and `ready` jobs re-enter the pipeline; a stale
    /// `processing` job is reset first; a healthy `processing` job is
    /// rejected without side effects.
    pub async fn retry(&self, job_id: &str) -> Result<()> {
        let job = self.db.require_job(job_id).await?;
        let status = job.job_status()?;

        match status {
            JobStatus::Error | JobStatus::Ready => {
                status.transition_to(JobStatus::Pending)?;
                self.db
                    .set_job_status(job_id, JobStatus::Pending, None, None)
                    .await?;
            }
            JobStatus::Processing if self.is_stale(&job) => {
                warn!(job_id = %job_id, "Resetting stale processing job for retry");
                self.db
                    .set_job_status(job_id, JobStatus::Pending, None, None)
                    .await?;
            }
            JobStatus::Processing => {
                return Err(Error::RetryRejected(format!(
                    "Job {} is actively processing (updated {}s ago)",
                    job_id,
                    job.seconds_since_update()
                )));
            }
            JobStatus::Pending => {}
        }

        self.run(job_id).await
    }

    fn is_stale(&self, job: &ProcessingJob) -> bool {
        job.seconds_since_update() > self.config.pipeline.stale_after_secs
    }

    /// Move the job into `processing`, self-healing a stale claim
    async fn claim(&self, job_id: &str) -> Result<ProcessingJob> {
        let job = self.db.require_job(job_id).await?;
        let status = job.job_status()?;

        let status = match status {
            JobStatus::Processing if self.is_stale(&job) => {
                warn!(
                    job_id = %job_id,
                    idle_secs = job.seconds_since_update(),
                    "Re-claiming abandoned processing job"
                );
                self.db
                    .set_job_status(job_id, JobStatus::Pending, None, None)
                    .await?;
                JobStatus::Pending
            }
            JobStatus::Processing => {
                return Err(Error::RetryRejected(format!(
                    "Job {} is actively processing",
                    job_id
                )));
            }
            other => other,
        };

        status.transition_to(JobStatus::Processing)?;
        self.db
            .set_job_status(job_id, JobStatus::Processing, None, None)
            .await?;
        self.db.require_job(job_id).await
    }

    /// The sequential stages. Returns the number of persisted chunks.
    async fn execute(&self, job: &ProcessingJob) -> Result<usize> {
        let space = job.space()?;

        // extract
        let bytes = std::fs::read(self.spool_path(&job.id)).map_err(|e| {
            Error::provider(
                PipelineStage::Extract,
                format!("Could not read spooled upload: {}", e),
            )
        })?;
        let extracted = self
            .extractor
            .extract(&bytes, &job.content_type)
            .map_err(|e| Error::provider(PipelineStage::Extract, e.to_string()))?;
        if extracted.is_empty() {
            return Err(Error::provider(
                PipelineStage::Extract,
                "No text extracted from upload",
            ));
        }
        debug!(
            job_id = %job.id,
            pages = extracted.pages.len(),
            chars = extracted.total_chars(),
            "Extracted text"
        );

        // chunk
        let drafts = chunk::split_document(&extracted, &self.config.chunk);
        if drafts.is_empty() {
            return Err(Error::provider(
                PipelineStage::Chunk,
                "Document produced no chunks",
            ));
        }
        debug!(job_id = %job.id, chunks = drafts.len(), "Split into chunks");

        // embed (through the cache; failures propagate uncached)
        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.embedding.batch_size.max(1)) {
            let embedded = self
                .cache
                .get_or_compute_batch(batch, space)
                .await
                .map_err(|e| Error::provider(PipelineStage::Embed, e.to_string()))?;
            vectors.extend(embedded);
        }

        // create the document row before any chunk write; chunk rows carry
        // a foreign key to it
        let document_id = match &job.document_id {
            Some(existing) => {
                let doc = self.db.get_document(existing).await.map_err(|e| {
                    Error::provider(PipelineStage::CreateDocument, e.to_string())
                })?;
                match doc {
                    Some(doc) => {
                        // re-ingest of the same document: replace its chunks
                        self.db.delete_chunks(&doc.id).await.map_err(|e| {
                            Error::provider(PipelineStage::CreateDocument, e.to_string())
                        })?;
                        doc.id
                    }
                    None => self.create_document_for(job).await?,
                }
            }
            None => self.create_document_for(job).await?,
        };

        // persist chunks in batches
        let rows = build_chunk_rows(&drafts, &vectors)?;
        let mut persisted = 0;
        for batch in rows.chunks(self.config.pipeline.persist_batch_size.max(1)) {
            persisted += self
                .db
                .insert_chunks(&document_id, batch)
                .await
                .map_err(|e| match e {
                    // an integrity violation is a bug, never a retryable
                    // provider failure
                    Error::Integrity(msg) => Error::Integrity(msg),
                    other => Error::provider(PipelineStage::PersistChunks, other.to_string()),
                })?;
        }

        Ok(persisted)
    }

    async fn create_document_for(&self, job: &ProcessingJob) -> Result<String> {
        let spec = DocumentSpec {
            slug: job.slug.clone(),
            title: job.title.clone(),
            owner_id: job.owner_id.clone(),
            embedding_space: job.space()?,
            public: false,
        };
        let doc = self
            .db
            .create_document(&spec)
            .await
            .map_err(|e| Error::provider(PipelineStage::CreateDocument, e.to_string()))?;
        self.db
            .set_job_document(&job.id, &doc.id)
            .await
            .map_err(|e| Error::provider(PipelineStage::CreateDocument, e.to_string()))?;
        Ok(doc.id)
    }
}

fn build_chunk_rows(drafts: &[ChunkDraft], vectors: &[Vec<f32>]) -> Result<Vec<NewChunk>> {
    if drafts.len() != vectors.len() {
        return Err(Error::provider(
            PipelineStage::Embed,
            format!(
                "Got {} vectors for {} chunks",
                vectors.len(),
                drafts.len()
            ),
        ));
    }

    drafts
        .iter()
        .zip(vectors.iter())
        .map(|(draft, vector)| {
            Ok(NewChunk {
                chunk_index: draft.index as i64,
                content: draft.text.clone(),
                payload_json: ChunkPayload::from_draft(draft).to_json()?,
                embedding: encode_embedding(vector),
            })
        })
        .collect()
}
