//! Scheduler doubles for deterministic tests.
//!
//! [`ManualSchedulerFactory`] hands out [`ManualScheduler`]s that never fire
//! on their own. Tests call [`ManualScheduler::fire_pending`] to run every
//! scheduled job on the calling thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tracing::warn;

use crate::scheduler::backend::{OneShotTrigger, Scheduler, SchedulerFactory, WorkerPool};
use crate::scheduler::job::{JobDetail, JobKey};
use crate::scheduler::job_store::RamJobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    #[default]
    Normal,
    Rejecting,
    FailingStart,
    FailingShutdown,
}

/// Factory recording every scheduler it creates.
#[derive(Clone, Default)]
pub struct ManualSchedulerFactory {
    mode: Mode,
    schedulers: Arc<Mutex<Vec<Arc<ManualScheduler>>>>,
}

impl ManualSchedulerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedulers that refuse every job.
    pub fn rejecting() -> Self {
        Self::with_mode(Mode::Rejecting)
    }

    /// Schedulers whose `start` fails.
    pub fn failing_start() -> Self {
        Self::with_mode(Mode::FailingStart)
    }

    /// Schedulers whose `shutdown` fails after releasing their jobs.
    pub fn failing_shutdown() -> Self {
        Self::with_mode(Mode::FailingShutdown)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn schedulers(&self) -> Vec<Arc<ManualScheduler>> {
        self.schedulers.lock().clone()
    }

    pub fn scheduler(&self, name: &str) -> Option<Arc<ManualScheduler>> {
        self.schedulers
            .lock()
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }
}

impl SchedulerFactory for ManualSchedulerFactory {
    fn create_scheduler(
        &self,
        name: &str,
        instance_id: &str,
        pool: WorkerPool,
        store: Arc<RamJobStore>,
    ) -> Result<Arc<dyn Scheduler>> {
        let scheduler = Arc::new(ManualScheduler {
            name: name.to_string(),
            instance_id: instance_id.to_string(),
            pool,
            store,
            mode: self.mode,
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            queue: Mutex::new(Vec::new()),
        });
        self.schedulers.lock().push(Arc::clone(&scheduler));

        let handle: Arc<dyn Scheduler> = scheduler;
        Ok(handle)
    }
}

/// Scheduler that queues jobs until told to fire them.
pub struct ManualScheduler {
    name: String,
    instance_id: String,
    pool: WorkerPool,
    store: Arc<RamJobStore>,
    mode: Mode,
    started: AtomicBool,
    shut_down: AtomicBool,
    queue: Mutex<Vec<(JobKey, OneShotTrigger)>>,
}

impl ManualScheduler {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn scheduled_count(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn scheduled_keys(&self) -> Vec<JobKey> {
        self.queue.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn scheduled_delays(&self) -> Vec<Duration> {
        self.queue.lock().iter().map(|(_, trigger)| trigger.delay()).collect()
    }

    /// Fire every queued job on the calling thread, ignoring delays.
    ///
    /// Returns how many jobs executed successfully.
    pub fn fire_pending(&self) -> usize {
        let queued = std::mem::take(&mut *self.queue.lock());
        let mut fired = 0;
        for (key, _) in queued {
            match self.store.fire(&key, &self.name) {
                Ok(()) => fired += 1,
                Err(e) => warn!(job = %key, error = %e, "manual job failed"),
            }
        }
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<()> {
        if self.mode == Mode::FailingStart {
            bail!("scheduler {} refused to start", self.name);
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn schedule_job(&self, detail: JobDetail, trigger: OneShotTrigger) -> Result<()> {
        if self.mode == Mode::Rejecting {
            bail!("scheduler {} rejected job {}", self.name, detail.key());
        }
        if self.is_shut_down() {
            bail!("scheduler {} is shut down", self.name);
        }

        let key = detail.key().clone();
        self.store.store_job(detail)?;
        self.queue.lock().push((key, trigger));
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        self.queue.lock().clear();
        self.store.clear();

        if self.mode == Mode::FailingShutdown {
            bail!("scheduler {} failed to shut down", self.name);
        }
        Ok(())
    }
}
