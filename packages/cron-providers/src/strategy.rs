//! Backend selection at configuration time.

use cron_spi::{AsyncError, AsynchronousStrategy, FutureResult, Invoker, StrategyState};
use tracing::info;

use crate::config::{AsyncConfig, StrategyKind};
use crate::scheduler::SchedulerStrategy;
use crate::threads::ThreadStrategy;

/// One of the available strategies, chosen once per process.
///
/// Call sites depend only on [`AsynchronousStrategy`], so switching backends
/// is a configuration change.
pub enum Strategy {
    Threads(ThreadStrategy),
    Scheduler(SchedulerStrategy),
}

impl Strategy {
    /// Build the configured backend. It still needs `init_method_invoker`.
    pub fn from_config(config: &AsyncConfig) -> Self {
        info!(strategy = %config.strategy, "selected asynchronous strategy");
        match config.strategy {
            StrategyKind::Threads => Strategy::Threads(ThreadStrategy::new()),
            StrategyKind::Scheduler => {
                Strategy::Scheduler(SchedulerStrategy::new(config.scheduler_config()))
            }
        }
    }

    pub fn as_scheduler(&self) -> Option<&SchedulerStrategy> {
        match self {
            Strategy::Scheduler(strategy) => Some(strategy),
            Strategy::Threads(_) => None,
        }
    }
}

impl AsynchronousStrategy for Strategy {
    fn name(&self) -> &'static str {
        match self {
            Strategy::Threads(s) => s.name(),
            Strategy::Scheduler(s) => s.name(),
        }
    }

    fn state(&self) -> StrategyState {
        match self {
            Strategy::Threads(s) => s.state(),
            Strategy::Scheduler(s) => s.state(),
        }
    }

    fn init_method_invoker(&self) -> Result<(), AsyncError> {
        match self {
            Strategy::Threads(s) => s.init_method_invoker(),
            Strategy::Scheduler(s) => s.init_method_invoker(),
        }
    }

    fn shutdown_method_invoker(&self) {
        match self {
            Strategy::Threads(s) => s.shutdown_method_invoker(),
            Strategy::Scheduler(s) => s.shutdown_method_invoker(),
        }
    }

    fn execute_without_return<V>(&self, invoker: Invoker<V>) -> Result<(), AsyncError>
    where
        V: Send + 'static,
    {
        match self {
            Strategy::Threads(s) => s.execute_without_return(invoker),
            Strategy::Scheduler(s) => s.execute_without_return(invoker),
        }
    }

    fn execute_and_return_future<V>(&self, invoker: Invoker<V>) -> Result<FutureResult<V>, AsyncError>
    where
        V: Send + 'static,
    {
        match self {
            Strategy::Threads(s) => s.execute_and_return_future(invoker),
            Strategy::Scheduler(s) => s.execute_and_return_future(invoker),
        }
    }
}
