//! Admission control
//!
//! A counting semaphore per work class. Saturation rejects immediately with
//! an overload signal instead of queueing; callers back off and retry.

use crate::config::AdmissionConfig;
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// A permit held for the duration of one unit of work.
///
/// Capacity returns to the controller when the permit drops.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

/// Bounds in-flight processing jobs and retrieval queries per node
#[derive(Clone)]
pub struct AdmissionController {
    jobs: Arc<Semaphore>,
    queries: Arc<Semaphore>,
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            jobs: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            queries: Arc::new(Semaphore::new(config.max_concurrent_queries)),
        }
    }

    /// Admit one ingestion job, or signal overload
    pub fn admit_job(&self) -> Result<AdmissionPermit> {
        Self::try_acquire(&self.jobs, "processing")
    }

    /// Admit one retrieval query, or signal overload
    pub fn admit_query(&self) -> Result<AdmissionPermit> {
        Self::try_acquire(&self.queries, "retrieval")
    }

    fn try_acquire(semaphore: &Arc<Semaphore>, what: &'static str) -> Result<AdmissionPermit> {
        match Arc::clone(semaphore).try_acquire_owned() {
            Ok(permit) => Ok(AdmissionPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(Error::Overloaded(what)),
            Err(TryAcquireError::Closed) => Err(Error::Overloaded(what)),
        }
    }

    /// Free job slots (diagnostics)
    pub fn available_job_slots(&self) -> usize {
        self.jobs.available_permits()
    }

    /// Free query slots (diagnostics)
    pub fn available_query_slots(&self) -> usize {
        self.queries.available_permits()
    }
}
