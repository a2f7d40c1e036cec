//! Scheduler-native units of work.
//!
//! A [`JobDetail`] pairs a [`JobKey`] with the [`ScheduledJob`] to run and the
//! [`JobDataMap`] it needs. The scheduler never hands the detail to its
//! callback directly: the detail sits in the job store and is taken back out
//! by key when the trigger fires, at which point the job runs with a
//! [`JobExecutionContext`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use cron_spi::{ProviderContextTriggerSupport, RunnableFuture, TriggerBus};
use uuid::Uuid;

use super::trigger_support::JobTriggerSupport;
use super::FUTURE_DATA_KEY;

/// Identity of a job: a name unique within its group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    name: String,
    group: String,
}

impl JobKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// A key with a freshly generated random name.
    pub fn unique(group: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), group)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// A value stored in a job's data map.
#[derive(Clone)]
pub enum JobDataValue {
    /// Plain data that survives without object references.
    Json(serde_json::Value),
    /// A live future result to run when the job fires.
    Future(Arc<dyn RunnableFuture>),
}

impl fmt::Debug for JobDataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobDataValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            JobDataValue::Future(future) => f.debug_tuple("Future").field(&future.desc()).finish(),
        }
    }
}

/// Job-scoped key/value data.
#[derive(Debug, Clone, Default)]
pub struct JobDataMap {
    entries: HashMap<String, JobDataValue>,
}

impl JobDataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JobDataValue) -> Option<JobDataValue> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&JobDataValue> {
        self.entries.get(key)
    }

    pub fn get_json(&self, key: &str) -> Option<&serde_json::Value> {
        match self.entries.get(key) {
            Some(JobDataValue::Json(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_future(&self, key: &str) -> Option<Arc<dyn RunnableFuture>> {
        match self.entries.get(key) {
            Some(JobDataValue::Future(future)) => Some(Arc::clone(future)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Work executed when a job's trigger fires.
pub trait ScheduledJob: Send + Sync {
    /// Short name of the job kind for logs.
    fn kind(&self) -> &'static str;

    /// Run the job. Everything it needs must come from `ctx`.
    fn execute(&self, ctx: &JobExecutionContext) -> Result<()>;
}

/// Describes a job to the scheduler.
pub struct JobDetail {
    key: JobKey,
    job: Arc<dyn ScheduledJob>,
    data: JobDataMap,
}

impl JobDetail {
    pub fn new(key: JobKey, job: Arc<dyn ScheduledJob>) -> Self {
        Self {
            key,
            job,
            data: JobDataMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: JobDataValue) -> Self {
        self.data.insert(key, value);
        self
    }

    pub fn with_data_map(mut self, data: JobDataMap) -> Self {
        self.data = data;
        self
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn job(&self) -> &Arc<dyn ScheduledJob> {
        &self.job
    }

    pub fn data(&self) -> &JobDataMap {
        &self.data
    }

    pub fn into_parts(self) -> (JobKey, Arc<dyn ScheduledJob>, JobDataMap) {
        (self.key, self.job, self.data)
    }
}

impl fmt::Debug for JobDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDetail")
            .field("key", &self.key)
            .field("kind", &self.job.kind())
            .field("data", &self.data)
            .finish()
    }
}

/// What a fired job can see: its key, its data and the scheduler it fired on.
#[derive(Debug)]
pub struct JobExecutionContext {
    key: JobKey,
    data: JobDataMap,
    scheduler_name: String,
    fired_at: DateTime<Utc>,
}

impl JobExecutionContext {
    pub fn new(key: JobKey, data: JobDataMap, scheduler_name: impl Into<String>) -> Self {
        Self {
            key,
            data,
            scheduler_name: scheduler_name.into(),
            fired_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn data(&self) -> &JobDataMap {
        &self.data
    }

    pub fn scheduler_name(&self) -> &str {
        &self.scheduler_name
    }

    pub fn fired_at(&self) -> DateTime<Utc> {
        self.fired_at
    }
}

/// Runs the future result stored under [`FUTURE_DATA_KEY`].
#[derive(Debug, Default)]
pub struct AsyncMethodInvocationJob;

impl ScheduledJob for AsyncMethodInvocationJob {
    fn kind(&self) -> &'static str {
        "async_method_invocation"
    }

    fn execute(&self, ctx: &JobExecutionContext) -> Result<()> {
        let future = ctx
            .data()
            .get_future(FUTURE_DATA_KEY)
            .ok_or_else(|| anyhow!("job {} carries no future", ctx.key()))?;
        future.run()?;
        Ok(())
    }
}

/// Fires the trigger supplies stashed in the job's data map.
#[derive(Debug)]
pub struct TriggerFiringJob {
    bus: TriggerBus,
}

impl TriggerFiringJob {
    pub fn new(bus: TriggerBus) -> Self {
        Self { bus }
    }
}

impl ScheduledJob for TriggerFiringJob {
    fn kind(&self) -> &'static str {
        "trigger_firing"
    }

    fn execute(&self, ctx: &JobExecutionContext) -> Result<()> {
        let mut support = JobTriggerSupport::new(self.bus.clone());
        support.fire_trigger(ctx)?;
        Ok(())
    }
}
