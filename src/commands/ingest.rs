//! Ingest and retry command implementations

use super::build_pipeline;
use crate::config::Config;
use crate::embed::EmbeddingSpace;
use crate::error::{Error, Result};
use crate::meta::{DocumentSpec, MetaDb, Owner};
use crate::pipeline::JobStatus;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Ingest options
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Owner name the document belongs to
    pub owner: String,
    /// Owner display name (defaults to the owner name)
    pub owner_display: Option<String>,
    /// Document slug (defaults to a slugified file stem)
    pub slug: Option<String>,
    /// Document title (defaults to the file stem)
    pub title: Option<String>,
    /// Embedding space the document's chunks live in
    pub space: EmbeddingSpace,
    /// Whether the document is publicly listable
    pub public: bool,
}

/// Outcome of one ingestion or retry run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub job_id: String,
    pub document_id: Option<String>,
    pub status: String,
    pub stage: Option<String>,
    pub error_message: Option<String>,
    pub chunks: i64,
}

/// Ingest a local file through the processing pipeline
pub async fn cmd_ingest(
    config: &Config,
    db: &MetaDb,
    path: &Path,
    options: IngestOptions,
) -> Result<IngestReport> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("Not a file path: {}", path.display())))?;
    let bytes = std::fs::read(path)?;

    info!("Ingesting {} ({} bytes)", path.display(), bytes.len());

    let owner = resolve_owner(db, &options.owner, options.owner_display.as_deref()).await?;
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    let spec = DocumentSpec {
        slug: options.slug.clone().unwrap_or_else(|| slugify(stem)),
        title: options.title.clone().unwrap_or_else(|| stem.to_string()),
        owner_id: owner.id,
        embedding_space: options.space,
        public: options.public,
    };

    let pipeline = build_pipeline(config, db)?;
    let job_id = pipeline.enqueue(file_name, &bytes, spec).await?;

    let outcome = pipeline.run(&job_id).await;
    report(db, &job_id, outcome).await
}

/// Retry a parked job
pub async fn cmd_retry(config: &Config, db: &MetaDb, job_id: &str) -> Result<IngestReport> {
    let pipeline = build_pipeline(config, db)?;
    let outcome = pipeline.retry(job_id).await;
    report(db, job_id, outcome).await
}

/// A pipeline run that parks the job in `error` still has a reportable
/// result; everything else propagates.
async fn report(db: &MetaDb, job_id: &str, outcome: Result<()>) -> Result<IngestReport> {
    match outcome {
        Ok(()) | Err(Error::Provider { .. }) => {}
        Err(other) => return Err(other),
    }

    let job = db.require_job(job_id).await?;
    let chunks = match &job.document_id {
        Some(document_id) if job.job_status()? == JobStatus::Ready => {
            db.count_chunks(document_id).await?
        }
        _ => 0,
    };

    Ok(IngestReport {
        job_id: job.id,
        document_id: job.document_id,
        status: job.status,
        stage: job.stage,
        error_message: job.error_message,
        chunks,
    })
}

async fn resolve_owner(db: &MetaDb, name: &str, display: Option<&str>) -> Result<Owner> {
    if let Some(existing) = db.get_owner_by_name(name).await? {
        return Ok(existing);
    }
    let owner = Owner::new(
        name.to_string(),
        display.unwrap_or(name).to_string(),
    );
    db.upsert_owner(&owner).await?;
    Ok(owner)
}

/// Lowercase, alphanumeric runs joined by single dashes
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug
    }
}

/// Print an ingest/retry report to console
pub fn print_ingest_report(report: &IngestReport) {
    println!("\nJob {}", report.job_id);
    println!("  Status: {}", report.status);
    if let Some(document_id) = &report.document_id {
        println!("  Document: {}", document_id);
    }
    if report.chunks > 0 {
        println!("  Chunks: {}", report.chunks);
    }
    if let Some(stage) = &report.stage {
        println!("  Failed stage: {}", stage);
    }
    if let Some(message) = &report.error_message {
        println!("  Error: {}", message);
    }
}
