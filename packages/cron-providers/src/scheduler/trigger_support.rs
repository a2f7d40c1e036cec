//! Trigger support backed by job data.
//!
//! The scheduler callback only sees a [`JobExecutionContext`], so supplies are
//! serialized into the job's data map under [`TRIGGER_SUPPLIES_KEY`] when the
//! job is scheduled and decoded from it when the job fires.

use cron_spi::{AsyncError, ProviderContextTriggerSupport, TriggerBus, TriggerSupplies, TriggerSupport};

use super::job::{JobDataMap, JobDataValue, JobExecutionContext};
use super::TRIGGER_SUPPLIES_KEY;

/// Recovers trigger supplies from a fired job's data map.
#[derive(Debug)]
pub struct JobTriggerSupport {
    support: TriggerSupport,
}

impl JobTriggerSupport {
    pub fn new(bus: TriggerBus) -> Self {
        Self {
            support: TriggerSupport::new(bus),
        }
    }

    /// Store `supplies` in `data` so a later firing can find them.
    pub fn stash(data: &mut JobDataMap, supplies: &TriggerSupplies) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(supplies)?;
        data.insert(TRIGGER_SUPPLIES_KEY, JobDataValue::Json(value));
        Ok(())
    }
}

impl ProviderContextTriggerSupport<JobExecutionContext> for JobTriggerSupport {
    fn trigger_support(&mut self) -> &mut TriggerSupport {
        &mut self.support
    }

    fn fetch_trigger_supplies(&self, ctx: &JobExecutionContext) -> Result<TriggerSupplies, AsyncError> {
        let value = ctx
            .data()
            .get_json(TRIGGER_SUPPLIES_KEY)
            .ok_or_else(|| AsyncError::SuppliesNotFound {
                context: ctx.key().to_string(),
            })?;

        serde_json::from_value(value.clone()).map_err(|source| AsyncError::InvalidSupplies {
            context: ctx.key().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::JobKey;
    use cron_spi::Qualifier;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    fn ctx(data: JobDataMap) -> JobExecutionContext {
        JobExecutionContext::new(JobKey::new("job", "trigger_job_group"), data, "sched")
    }

    #[test]
    fn fetches_stashed_supplies() {
        let supplies = TriggerSupplies::new(json!([1, 2]), Qualifier::new("nightly"));
        let mut data = JobDataMap::new();
        JobTriggerSupport::stash(&mut data, &supplies).unwrap();

        let support = JobTriggerSupport::new(TriggerBus::new());
        assert_eq!(support.fetch_trigger_supplies(&ctx(data)).unwrap(), supplies);
    }

    #[test]
    fn missing_supplies_fail_without_dispatch() {
        let bus = TriggerBus::new();
        let mut receiver = bus.subscribe();
        let mut support = JobTriggerSupport::new(bus);

        let err = support.fire_trigger(&ctx(JobDataMap::new())).unwrap_err();

        assert!(matches!(err, AsyncError::SuppliesNotFound { ref context } if context == "trigger_job_group.job"));
        assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn malformed_supplies_are_rejected() {
        let mut data = JobDataMap::new();
        data.insert(TRIGGER_SUPPLIES_KEY, JobDataValue::Json(json!("not supplies")));

        let support = JobTriggerSupport::new(TriggerBus::new());
        let err = support.fetch_trigger_supplies(&ctx(data)).unwrap_err();

        assert!(matches!(err, AsyncError::InvalidSupplies { .. }));
    }
}
