//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::{MetaDb, ProcessingJob};
use serde::Serialize;
use tracing::info;

/// System status information
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub db_path: String,
    pub spool_path: String,
    pub document_count: usize,
    pub chunk_count: i64,
    pub jobs: Vec<JobInfo>,
}

/// One processing job for display
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub file_name: String,
    pub slug: String,
    pub status: String,
    pub stage: Option<String>,
    pub error_message: Option<String>,
    pub updated_at: String,
}

impl From<ProcessingJob> for JobInfo {
    fn from(job: ProcessingJob) -> Self {
        Self {
            id: job.id,
            file_name: job.file_name,
            slug: job.slug,
            status: job.status,
            stage: job.stage,
            error_message: job.error_message,
            updated_at: job.updated_at,
        }
    }
}

/// Get one job's status
pub async fn cmd_job_status(db: &MetaDb, job_id: &str) -> Result<JobInfo> {
    Ok(db.require_job(job_id).await?.into())
}

/// Print a single job to console
pub fn print_job(job: &JobInfo) {
    println!("\nJob {}", job.id);
    println!("  File: {}", job.file_name);
    println!("  Slug: {}", job.slug);
    println!("  Status: {}", job.status);
    println!("  Updated: {}", job.updated_at);
    if let Some(stage) = &job.stage {
        println!("  Failed stage: {}", stage);
    }
    if let Some(message) = &job.error_message {
        println!("  Error: {}", message);
    }
}

/// Get system status: storage counts and the job ledger
pub async fn cmd_status(config: &Config, db: &MetaDb) -> Result<StatusInfo> {
    info!("Getting status");

    let documents = db.list_documents().await?;
    let chunk_count = db.total_chunks().await?;
    let jobs = db.list_jobs().await?;

    Ok(StatusInfo {
        db_path: config.paths.db_file.display().to_string(),
        spool_path: config.paths.spool_dir.display().to_string(),
        document_count: documents.len(),
        chunk_count,
        jobs: jobs.into_iter().map(JobInfo::from).collect(),
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\nfolio status\n");
    println!("Database: {}", status.db_path);
    println!("Spool: {}", status.spool_path);
    println!("Documents: {}", status.document_count);
    println!("Chunks: {}", status.chunk_count);

    if status.jobs.is_empty() {
        println!("\nNo processing jobs.");
        return;
    }

    println!("\nProcessing jobs:");
    for job in &status.jobs {
        println!("  {} [{}] {}", job.id, job.status, job.file_name);
        if let Some(stage) = &job.stage {
            println!("    Failed stage: {}", stage);
        }
        if let Some(message) = &job.error_message {
            println!("    Error: {}", message);
        }
    }
}
