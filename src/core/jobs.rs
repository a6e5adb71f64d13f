//! In-memory print job store.
//!
//! Jobs live only for the lifetime of the process. Each record sits behind its
//! own mutex so a reader never observes a half-applied patch, and the map lock
//! is only taken exclusively for inserts and sweeps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use super::models::{JobId, JobPatch, JobStatus, PrintJob};
use crate::error::StoreError;

/// Storage seam for print jobs.
pub trait JobStore: Send + Sync {
    fn create(&self, job: PrintJob) -> JobId;

    fn get(&self, id: &JobId) -> Result<PrintJob, StoreError>;

    /// Merge `patch` into the job. Terminal jobs are immutable and status may
    /// only move forward.
    fn update(&self, id: &JobId, patch: JobPatch) -> Result<PrintJob, StoreError>;

    /// Remove every job created at least `max_age` ago. Returns the number
    /// of removed jobs.
    fn sweep(&self, max_age: Duration) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<PrintJob>>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &JobId) -> Result<Arc<Mutex<PrintJob>>, StoreError> {
        let map = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id)
            .cloned()
            .ok_or_else(|| StoreError::JobNotFound(id.to_string()))
    }
}

pub(crate) fn merge(job: &mut PrintJob, patch: JobPatch) -> Result<(), StoreError> {
    if job.status.is_terminal() {
        return Err(StoreError::JobFinalized {
            id: job.id,
            status: job.status,
        });
    }

    let next = patch.status.unwrap_or(job.status);
    if !job.status.can_transition_to(next) {
        return Err(StoreError::InvalidTransition {
            id: job.id,
            from: job.status,
            to: next,
        });
    }
    if patch.error_message.is_some() && next != JobStatus::Failed {
        return Err(StoreError::ErrorMessageOnHealthyJob(job.id));
    }

    job.status = next;
    if let Some(retry_count) = patch.retry_count {
        job.retry_count = retry_count;
    }
    if let Some(sent_at) = patch.sent_at {
        job.sent_at = Some(sent_at);
    }
    if let Some(completed_at) = patch.completed_at {
        job.completed_at = Some(completed_at);
    }
    if let Some(error_message) = patch.error_message {
        job.error_message = Some(error_message);
    }
    Ok(())
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job: PrintJob) -> JobId {
        let id = job.id;
        let printer_id = job.printer_id.clone();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(job)));
        debug!(job_id = %id, printer_id = %printer_id, "Job recorded");
        id
    }

    fn get(&self, id: &JobId) -> Result<PrintJob, StoreError> {
        let entry = self.entry(id)?;
        let job = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(job.clone())
    }

    fn update(&self, id: &JobId, patch: JobPatch) -> Result<PrintJob, StoreError> {
        let entry = self.entry(id)?;
        let mut job = entry.lock().unwrap_or_else(PoisonError::into_inner);
        merge(&mut job, patch)?;
        debug!(job_id = %id, status = %job.status, retry_count = job.retry_count, "Job updated");
        Ok(job.clone())
    }

    fn sweep(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();

        let mut map = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, entry| {
            let job = entry.lock().unwrap_or_else(PoisonError::into_inner);
            now.signed_duration_since(job.created_at) < max_age
        });
        let removed = before - map.len();

        if removed > 0 {
            info!(removed, remaining = map.len(), "Swept expired jobs");
        }
        removed
    }

    fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
