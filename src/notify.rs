//! Job completion/failure notifications
//!
//! Dispatch is fire-and-forget: the pipeline spawns the notification and
//! moves on. A lost notification never affects job state or retrieval
//! correctness.

use crate::meta::ProcessingJob;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// Trait for notification backends (email, webhook, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn job_completed(&self, job: &ProcessingJob);

    async fn job_failed(&self, job: &ProcessingJob, stage: &str, message: &str);
}

/// Default notifier: structured log events only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn job_completed(&self, job: &ProcessingJob) {
        info!(
            job_id = %job.id,
            file = %job.file_name,
            "Processing job completed"
        );
    }

    async fn job_failed(&self, job: &ProcessingJob, stage: &str, message: &str) {
        error!(
            job_id = %job.id,
            file = %job.file_name,
            stage = %stage,
            "Processing job failed: {}",
            message
        );
    }
}

/// Spawn a completion notification without blocking the pipeline
pub fn dispatch_completed(notifier: Arc<dyn Notifier>, job: ProcessingJob) {
    tokio::spawn(async move {
        notifier.job_completed(&job).await;
    });
}

/// Spawn a failure notification without blocking the pipeline
pub fn dispatch_failed(notifier: Arc<dyn Notifier>, job: ProcessingJob, stage: String, message: String) {
    tokio::spawn(async move {
        notifier.job_failed(&job, &stage, &message).await;
    });
}
