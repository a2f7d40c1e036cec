//! Scheduler backed by tokio-cron-scheduler.
//!
//! Each scheduler owns a private tokio runtime. The cron engine ticks on the
//! runtime's workers and fired jobs run on its blocking pool, which is capped
//! at the configured worker pool size. Callers never need to be inside a
//! runtime themselves.
//!
//! ```text
//! schedule_job(detail, trigger)
//!     ├─► RamJobStore.store_job(detail)
//!     └─► Job::new_one_shot_async(delay) ──► JobScheduler
//!                                               │ fires
//!                                               ▼
//!                         spawn_blocking(RamJobStore.fire(key))
//! ```

use std::future::Future;
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{anyhow, bail, ensure, Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::time::Instant;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use super::backend::{OneShotTrigger, Scheduler, SchedulerFactory, WorkerPool};
use super::job::{JobDetail, JobKey};
use super::job_store::RamJobStore;

/// Threads driving the cron engine itself; jobs run on the blocking pool.
const ENGINE_THREADS: usize = 2;

/// Longest delay a one-shot job accepts.
pub const MAX_ONE_SHOT_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Creates [`CronScheduler`]s and keeps track of the live ones by name.
///
/// Names are unique among live schedulers that share a factory. A name is
/// released when its scheduler shuts down.
#[derive(Debug, Clone, Default)]
pub struct CronSchedulerFactory {
    live: Arc<DashMap<String, String>>,
}

impl CronSchedulerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The factory shared by the whole process.
    pub fn process() -> Self {
        static PROCESS: OnceLock<CronSchedulerFactory> = OnceLock::new();
        PROCESS.get_or_init(CronSchedulerFactory::new).clone()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.live.contains_key(name)
    }

    pub fn scheduler_names(&self) -> Vec<String> {
        self.live.iter().map(|entry| entry.key().clone()).collect()
    }

    fn register(&self, name: &str, instance_id: &str) -> Result<()> {
        match self.live.entry(name.to_string()) {
            Entry::Occupied(entry) => bail!(
                "scheduler {} already exists (instance {})",
                name,
                entry.get()
            ),
            Entry::Vacant(entry) => {
                entry.insert(instance_id.to_string());
                Ok(())
            }
        }
    }
}

impl SchedulerFactory for CronSchedulerFactory {
    fn create_scheduler(
        &self,
        name: &str,
        instance_id: &str,
        pool: WorkerPool,
        store: Arc<RamJobStore>,
    ) -> Result<Arc<dyn Scheduler>> {
        self.register(name, instance_id)?;

        match CronScheduler::build(name, instance_id, &pool, store, Arc::clone(&self.live)) {
            Ok(scheduler) => Ok(Arc::new(scheduler)),
            Err(e) => {
                self.live.remove(name);
                Err(e)
            }
        }
    }
}

/// A cron engine running on its own runtime.
pub struct CronScheduler {
    name: String,
    instance_id: String,
    store: Arc<RamJobStore>,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    inner: JobScheduler,
    registry: Arc<DashMap<String, String>>,
}

impl CronScheduler {
    fn build(
        name: &str,
        instance_id: &str,
        pool: &WorkerPool,
        store: Arc<RamJobStore>,
        registry: Arc<DashMap<String, String>>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(ENGINE_THREADS)
            .max_blocking_threads(pool.size())
            .thread_name(pool.thread_name())
            .enable_all()
            .build()
            .context("failed to build scheduler runtime")?;
        let handle = runtime.handle().clone();

        let created = run_on(&handle, async {
            JobScheduler::new().await.map_err(anyhow::Error::from)
        });
        let inner = match created {
            Ok(inner) => inner,
            Err(e) => {
                runtime.shutdown_background();
                return Err(e.context("failed to create job scheduler"));
            }
        };

        debug!(
            scheduler = name,
            instance_id,
            pool_size = pool.size(),
            "created cron scheduler"
        );

        Ok(Self {
            name: name.to_string(),
            instance_id: instance_id.to_string(),
            store,
            runtime: Mutex::new(Some(runtime)),
            handle,
            inner,
            registry,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn cron_job(&self, key: JobKey, trigger: &OneShotTrigger) -> Result<Job> {
        let delay = trigger.delay();
        ensure!(
            delay <= MAX_ONE_SHOT_DELAY,
            "delay {:?} of job {} exceeds {:?}",
            delay,
            key,
            MAX_ONE_SHOT_DELAY
        );

        // The engine counts whole seconds from the start of the current second,
        // so it can fire early. The job waits out the rest itself.
        let deadline = Instant::now() + delay;
        let engine_delay =
            Duration::from_secs(delay.as_secs() + u64::from(delay.subsec_nanos() > 0));

        let store = Arc::clone(&self.store);
        let scheduler_name = self.name.clone();

        let job = Job::new_one_shot_async(engine_delay, move |_uuid, _lock| {
            let store = Arc::clone(&store);
            let scheduler_name = scheduler_name.clone();
            let key = key.clone();
            Box::pin(async move {
                tokio::time::sleep_until(deadline).await;
                let job = key.to_string();
                let fired =
                    tokio::task::spawn_blocking(move || store.fire(&key, &scheduler_name)).await;
                match fired {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(job = %job, error = %e, "scheduled job failed"),
                    Err(e) => error!(job = %job, error = %e, "scheduled job aborted"),
                }
            })
        })?;

        Ok(job)
    }

    fn release(&self) -> Result<()> {
        let Some(runtime) = self.runtime.lock().take() else {
            return Ok(());
        };

        let mut inner = self.inner.clone();
        let stopped = run_on(&self.handle, async move {
            inner.shutdown().await.map_err(anyhow::Error::from)
        });
        let dropped = self.store.clear();

        runtime.shutdown_background();
        self.registry.remove(&self.name);

        info!(scheduler = %self.name, dropped, "cron scheduler shut down");
        stopped
    }
}

impl Scheduler for CronScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<()> {
        let inner = self.inner.clone();
        run_on(&self.handle, async move { inner.start().await.map_err(anyhow::Error::from) })
            .with_context(|| format!("failed to start scheduler {}", self.name))
    }

    fn schedule_job(&self, detail: JobDetail, trigger: OneShotTrigger) -> Result<()> {
        let key = detail.key().clone();
        let job = self.cron_job(key.clone(), &trigger)?;
        self.store.store_job(detail)?;

        let inner = self.inner.clone();
        if let Err(e) = run_on(&self.handle, async move {
            inner.add(job).await.map(|_| ()).map_err(anyhow::Error::from)
        }) {
            self.store.remove_job(&key);
            return Err(e.context(format!("failed to schedule job {key}")));
        }

        debug!(
            scheduler = %self.name,
            job = %key,
            trigger = trigger.name(),
            delay_ms = trigger.delay().as_millis() as u64,
            "job scheduled"
        );
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        self.release()
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!(scheduler = %self.name, error = %e, "failed to release cron scheduler");
        }
    }
}

/// Drive `fut` to completion on `handle`, blocking the calling thread.
///
/// Safe to call from inside another runtime because the future runs on the
/// scheduler's own workers.
fn run_on<F, T>(handle: &Handle, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    handle.spawn(async move {
        let _ = tx.send(fut.await);
    });
    rx.recv()
        .map_err(|_| anyhow!("scheduler runtime stopped before the task completed"))?
}
