//! # cron-providers
//!
//! Backends for [`cron_spi::AsynchronousStrategy`].
//!
//! - [`ThreadStrategy`] spawns one OS thread per call. Unbounded, no setup.
//! - [`SchedulerStrategy`] submits each call as an immediate one-shot job to a
//!   tokio-cron-scheduler instance with a bounded worker pool, and can fire
//!   [`cron_spi::TriggerSupplies`] after a delay.
//!
//! ## Usage
//!
//! ```ignore
//! use cron_providers::{AsyncConfig, Strategy};
//! use cron_spi::{AsynchronousStrategy, Invoker};
//!
//! let strategy = Strategy::from_config(&AsyncConfig::from_env()?);
//! strategy.init_method_invoker()?;
//!
//! let future = strategy.execute_and_return_future(Invoker::new("report", || build_report()))?;
//! let report = future.get_timeout(Duration::from_secs(30))?;
//!
//! strategy.shutdown_method_invoker();
//! ```

pub mod config;
pub mod scheduler;
pub mod strategy;
pub mod threads;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{AsyncConfig, StrategyKind};
pub use scheduler::backend::{OneShotTrigger, Scheduler, SchedulerFactory, WorkerPool};
pub use scheduler::cron::{CronScheduler, CronSchedulerFactory};
pub use scheduler::job::{JobDataMap, JobDetail, JobExecutionContext, JobKey, ScheduledJob};
pub use scheduler::job_store::{JobStoreError, RamJobStore};
pub use scheduler::trigger_support::JobTriggerSupport;
pub use scheduler::{SchedulerConfig, SchedulerStrategy};
pub use strategy::Strategy;
pub use threads::ThreadStrategy;
