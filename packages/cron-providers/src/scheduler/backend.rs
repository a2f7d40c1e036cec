//! Seam between the scheduler strategy and the scheduling engine.
//!
//! [`SchedulerStrategy`](super::SchedulerStrategy) only talks to these traits,
//! so tests can swap the cron engine for one they fire by hand.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Result};

use super::job::JobDetail;
use super::job_store::RamJobStore;

/// Sizing and naming of a scheduler's worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPool {
    size: usize,
    thread_name: String,
}

impl WorkerPool {
    pub fn new(size: usize, thread_name: impl Into<String>) -> Result<Self> {
        ensure!(size > 0, "worker pool size must be greater than zero");
        Ok(Self {
            size,
            thread_name: thread_name.into(),
        })
    }

    /// Maximum number of jobs executing at once.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }
}

/// Fire once, after an optional delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotTrigger {
    name: String,
    delay: Duration,
}

impl OneShotTrigger {
    /// Fire as soon as a worker is free.
    pub fn immediate(name: impl Into<String>) -> Self {
        Self::after(name, Duration::ZERO)
    }

    pub fn after(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// A running scheduling engine.
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &str;

    fn start(&self) -> Result<()>;

    /// Stash `detail` and arrange for it to fire per `trigger`.
    ///
    /// On error the job must not be left behind in the store.
    fn schedule_job(&self, detail: JobDetail, trigger: OneShotTrigger) -> Result<()>;

    /// Stop firing jobs and release worker threads.
    ///
    /// Jobs still waiting to fire are discarded.
    fn shutdown(&self) -> Result<()>;
}

/// Builds schedulers with a given identity and resources.
pub trait SchedulerFactory: Send + Sync {
    fn create_scheduler(
        &self,
        name: &str,
        instance_id: &str,
        pool: WorkerPool,
        store: Arc<RamJobStore>,
    ) -> Result<Arc<dyn Scheduler>>;
}
