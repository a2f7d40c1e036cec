//! In-memory store of scheduled jobs.
//!
//! Jobs are stashed here when scheduled and removed when their trigger fires.
//! Nothing survives a restart.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use super::job::{JobDetail, JobExecutionContext, JobKey};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("job {0} is already stored")]
    DuplicateKey(JobKey),

    #[error("job {0} is not stored")]
    NotFound(JobKey),
}

/// Volatile job storage keyed by [`JobKey`].
#[derive(Debug, Default)]
pub struct RamJobStore {
    jobs: DashMap<JobKey, JobDetail>,
}

impl RamJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_job(&self, detail: JobDetail) -> Result<(), JobStoreError> {
        match self.jobs.entry(detail.key().clone()) {
            Entry::Occupied(entry) => Err(JobStoreError::DuplicateKey(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(detail);
                Ok(())
            }
        }
    }

    pub fn remove_job(&self, key: &JobKey) -> Option<JobDetail> {
        self.jobs.remove(key).map(|(_, detail)| detail)
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.jobs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drop every stored job, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.jobs.len();
        self.jobs.clear();
        dropped
    }

    /// Take the job for `key` out of the store and execute it.
    ///
    /// A job fires at most once: a second call for the same key fails with
    /// [`JobStoreError::NotFound`].
    pub fn fire(&self, key: &JobKey, scheduler_name: &str) -> anyhow::Result<()> {
        let detail = self
            .remove_job(key)
            .ok_or_else(|| JobStoreError::NotFound(key.clone()))?;
        let (key, job, data) = detail.into_parts();

        debug!(job = %key, kind = job.kind(), scheduler = scheduler_name, "job fired");

        let ctx = JobExecutionContext::new(key, data, scheduler_name);
        job.execute(&ctx)
    }
}
