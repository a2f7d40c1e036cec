//! Scheduler-backed asynchronous strategy.
//!
//! Every call becomes a one-shot job in the [`ASYNC_JOB_GROUP`] group that
//! fires immediately on a bounded worker pool. Submissions beyond the pool
//! size wait in the scheduler until a worker frees up.
//!
//! ```text
//! execute_and_return_future(invoker)
//!     │
//!     ├─► FutureResult::new(invoker) ─────────────────► returned to caller
//!     │
//!     └─► JobDetail { key: <uuid>.async_job_group, data: { future } }
//!             └─► Scheduler.schedule_job(detail, fire now)
//!                     └─► worker: AsyncMethodInvocationJob ─► future.run()
//! ```
//!
//! The same scheduler also fires [`TriggerSupplies`] after a delay through
//! [`SchedulerStrategy::schedule_trigger`].

pub mod backend;
pub mod cron;
pub mod job;
pub mod job_store;
pub mod trigger_support;

use std::sync::Arc;
use std::time::Duration;

use cron_spi::{
    AsyncError, AsynchronousStrategy, FutureResult, Invoker, StrategyState, TriggerBus,
    TriggerSupplies,
};
use parking_lot::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use self::backend::{OneShotTrigger, Scheduler, SchedulerFactory, WorkerPool};
use self::cron::CronSchedulerFactory;
use self::job::{
    AsyncMethodInvocationJob, JobDataMap, JobDataValue, JobDetail, JobKey, TriggerFiringJob,
};
use self::job_store::RamJobStore;
use self::trigger_support::JobTriggerSupport;

const NAME: &str = "scheduler";

/// Group of every ad hoc asynchronous invocation job.
pub const ASYNC_JOB_GROUP: &str = "async_job_group";
/// Group of jobs that fire trigger supplies.
pub const TRIGGER_JOB_GROUP: &str = "trigger_job_group";
/// Job data key holding the future result to run.
pub const FUTURE_DATA_KEY: &str = "future";
/// Job data key holding serialized trigger supplies.
pub const TRIGGER_SUPPLIES_KEY: &str = "trigger_supplies";

pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_SCHEDULER_NAME_PREFIX: &str = "CronAsyncScheduler";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of jobs executing at once.
    pub pool_size: usize,
    /// Scheduler names are `{name_prefix}_{instance_id}`.
    pub name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            name_prefix: DEFAULT_SCHEDULER_NAME_PREFIX.to_string(),
        }
    }
}

struct Running {
    instance_id: String,
    scheduler: Arc<dyn Scheduler>,
    store: Arc<RamJobStore>,
}

enum Lifecycle {
    Uninitialized,
    Ready(Running),
    Shutdown,
}

/// Runs invocations as immediate one-shot jobs on a named scheduler.
pub struct SchedulerStrategy {
    config: SchedulerConfig,
    factory: Arc<dyn SchedulerFactory>,
    bus: TriggerBus,
    lifecycle: RwLock<Lifecycle>,
}

impl SchedulerStrategy {
    /// Strategy backed by the process-wide cron scheduler factory.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_factory(config, Arc::new(CronSchedulerFactory::process()))
    }

    pub fn with_factory(config: SchedulerConfig, factory: Arc<dyn SchedulerFactory>) -> Self {
        Self {
            config,
            factory,
            bus: TriggerBus::new(),
            lifecycle: RwLock::new(Lifecycle::Uninitialized),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Bus on which fired trigger supplies are delivered.
    pub fn trigger_bus(&self) -> &TriggerBus {
        &self.bus
    }

    /// Identifier generated by the last successful init, while ready.
    pub fn instance_id(&self) -> Option<String> {
        match &*self.lifecycle.read() {
            Lifecycle::Ready(running) => Some(running.instance_id.clone()),
            _ => None,
        }
    }

    pub fn scheduler_name(&self) -> Option<String> {
        match &*self.lifecycle.read() {
            Lifecycle::Ready(running) => Some(running.scheduler.name().to_string()),
            _ => None,
        }
    }

    /// Jobs stored but not yet fired.
    pub fn pending_jobs(&self) -> usize {
        match &*self.lifecycle.read() {
            Lifecycle::Ready(running) => running.store.len(),
            _ => 0,
        }
    }

    /// Fire `supplies` on the trigger bus once `delay` has elapsed.
    ///
    /// The supplies travel through the job store, not the scheduler callback.
    pub fn schedule_trigger(
        &self,
        supplies: TriggerSupplies,
        delay: Duration,
    ) -> Result<JobKey, AsyncError> {
        let key = JobKey::unique(TRIGGER_JOB_GROUP);

        let mut data = JobDataMap::new();
        JobTriggerSupport::stash(&mut data, &supplies).map_err(|e| AsyncError::Submission {
            job: key.to_string(),
            source: e.into(),
        })?;

        let detail = JobDetail::new(key.clone(), Arc::new(TriggerFiringJob::new(self.bus.clone())))
            .with_data_map(data);
        let trigger = OneShotTrigger::after(format!("trigger-{}", key.name()), delay);

        self.schedule(detail, trigger)?;
        debug!(job = %key, qualifier = %supplies.qualifier(), ?delay, "trigger scheduled");
        Ok(key)
    }

    fn submit_invocation<V: Send + 'static>(&self, future: FutureResult<V>) -> Result<(), AsyncError> {
        let key = JobKey::unique(ASYNC_JOB_GROUP);
        let desc = future.desc().to_string();

        let detail = JobDetail::new(key.clone(), Arc::new(AsyncMethodInvocationJob))
            .with_data(FUTURE_DATA_KEY, JobDataValue::Future(Arc::new(future)));
        let trigger = OneShotTrigger::immediate(format!("trigger-{}", key.name()));

        self.schedule(detail, trigger)?;
        debug!(job = %key, desc = %desc, "asynchronous invocation submitted");
        Ok(())
    }

    fn schedule(&self, detail: JobDetail, trigger: OneShotTrigger) -> Result<(), AsyncError> {
        let scheduler = match &*self.lifecycle.read() {
            Lifecycle::Ready(running) => Arc::clone(&running.scheduler),
            Lifecycle::Uninitialized => {
                return Err(AsyncError::NotReady {
                    strategy: NAME,
                    state: StrategyState::Uninitialized,
                })
            }
            Lifecycle::Shutdown => {
                return Err(AsyncError::NotReady {
                    strategy: NAME,
                    state: StrategyState::Shutdown,
                })
            }
        };

        let job = detail.key().to_string();
        scheduler
            .schedule_job(detail, trigger)
            .map_err(|source| AsyncError::Submission { job, source })
    }

    fn start_scheduler(&self) -> Result<Running, AsyncError> {
        let init_error = |source| AsyncError::Initialization {
            strategy: NAME,
            source,
        };

        let instance_id = Uuid::new_v4().to_string();
        let name = format!("{}_{}", self.config.name_prefix, instance_id);
        let pool = WorkerPool::new(self.config.pool_size, format!("{name}-worker")).map_err(init_error)?;
        let store = Arc::new(RamJobStore::new());

        let scheduler = self
            .factory
            .create_scheduler(&name, &instance_id, pool, Arc::clone(&store))
            .map_err(init_error)?;

        if let Err(e) = scheduler.start() {
            if let Err(cleanup) = scheduler.shutdown() {
                error!(scheduler = %name, error = %cleanup, "failed to release scheduler after start failure");
            }
            return Err(init_error(e));
        }

        Ok(Running {
            instance_id,
            scheduler,
            store,
        })
    }
}

impl AsynchronousStrategy for SchedulerStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn state(&self) -> StrategyState {
        match &*self.lifecycle.read() {
            Lifecycle::Uninitialized => StrategyState::Uninitialized,
            Lifecycle::Ready(_) => StrategyState::Ready,
            Lifecycle::Shutdown => StrategyState::Shutdown,
        }
    }

    fn init_method_invoker(&self) -> Result<(), AsyncError> {
        let mut lifecycle = self.lifecycle.write();
        if !matches!(*lifecycle, Lifecycle::Uninitialized) {
            return Err(AsyncError::Initialization {
                strategy: NAME,
                source: anyhow::anyhow!("init_method_invoker called twice"),
            });
        }

        let running = self.start_scheduler()?;
        info!(
            scheduler = %running.scheduler.name(),
            instance_id = %running.instance_id,
            pool_size = self.config.pool_size,
            "scheduler strategy ready"
        );
        *lifecycle = Lifecycle::Ready(running);
        Ok(())
    }

    fn shutdown_method_invoker(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.write(), Lifecycle::Shutdown);
        let Lifecycle::Ready(running) = previous else {
            return;
        };

        let scheduler = running.scheduler.name().to_string();
        match running.scheduler.shutdown() {
            Ok(()) => info!(scheduler = %scheduler, "scheduler strategy shut down"),
            Err(source) => {
                let err = AsyncError::Shutdown {
                    strategy: NAME,
                    source,
                };
                error!(scheduler = %scheduler, error = ?err, "error shutting down scheduler strategy");
            }
        }
    }

    fn execute_without_return<V>(&self, invoker: Invoker<V>) -> Result<(), AsyncError>
    where
        V: Send + 'static,
    {
        self.submit_invocation(FutureResult::new(invoker))
    }

    /// Only the scheduler worker runs the job; callers block on the returned handle itself.
    fn execute_and_return_future<V>(&self, invoker: Invoker<V>) -> Result<FutureResult<V>, AsyncError>
    where
        V: Send + 'static,
    {
        let future = FutureResult::new(invoker);
        self.submit_invocation(future.clone())?;
        Ok(future)
    }
}
