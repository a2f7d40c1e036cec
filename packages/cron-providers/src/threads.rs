//! Thread-per-call asynchronous strategy.
//!
//! Every submission gets its own freshly spawned OS thread. There is no bound
//! on how many run at once and no backpressure; callers are expected to limit
//! how often they issue asynchronous calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use cron_spi::{AsyncError, AsynchronousStrategy, FutureResult, Invoker, StrategyState};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

const NAME: &str = "threads";

/// Default prefix for spawned thread names.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "async-invoker";

/// Runs each invocation on a dedicated new thread.
///
/// Init and shutdown hold no resources; they only move the lifecycle state.
#[derive(Debug)]
pub struct ThreadStrategy {
    thread_name_prefix: String,
    spawned: AtomicU64,
    state: RwLock<StrategyState>,
}

impl ThreadStrategy {
    pub fn new() -> Self {
        Self::with_thread_name_prefix(DEFAULT_THREAD_NAME_PREFIX)
    }

    pub fn with_thread_name_prefix(prefix: impl Into<String>) -> Self {
        Self {
            thread_name_prefix: prefix.into(),
            spawned: AtomicU64::new(0),
            state: RwLock::new(StrategyState::Uninitialized),
        }
    }

    /// Number of threads spawned so far.
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    fn spawn<V: Send + 'static>(&self, future: FutureResult<V>) -> Result<(), AsyncError> {
        let state = *self.state.read();
        if state != StrategyState::Ready {
            return Err(AsyncError::NotReady {
                strategy: NAME,
                state,
            });
        }

        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let thread_name = format!("{}-{}", self.thread_name_prefix, n);
        let desc = future.desc().to_string();

        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                if let Err(e) = future.run() {
                    warn!(desc = %future.desc(), error = %e, "asynchronous invocation not run");
                }
            })
            .map_err(|e| AsyncError::Submission {
                job: thread_name.clone(),
                source: e.into(),
            })?;

        debug!(thread = %thread_name, desc = %desc, "spawned asynchronous invocation");
        Ok(())
    }
}

impl Default for ThreadStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl AsynchronousStrategy for ThreadStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn state(&self) -> StrategyState {
        *self.state.read()
    }

    fn init_method_invoker(&self) -> Result<(), AsyncError> {
        let mut state = self.state.write();
        if *state != StrategyState::Uninitialized {
            return Err(AsyncError::Initialization {
                strategy: NAME,
                source: anyhow::anyhow!("init_method_invoker called while {}", *state),
            });
        }
        *state = StrategyState::Ready;
        info!(prefix = %self.thread_name_prefix, "thread strategy ready");
        Ok(())
    }

    fn shutdown_method_invoker(&self) {
        *self.state.write() = StrategyState::Shutdown;
        info!(spawned = self.spawned(), "thread strategy shut down");
    }

    fn execute_without_return<V>(&self, invoker: Invoker<V>) -> Result<(), AsyncError>
    where
        V: Send + 'static,
    {
        self.spawn(FutureResult::new(invoker))
    }

    fn execute_and_return_future<V>(&self, invoker: Invoker<V>) -> Result<FutureResult<V>, AsyncError>
    where
        V: Send + 'static,
    {
        let future = FutureResult::new(invoker);
        self.spawn(future.clone())?;
        Ok(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn ready() -> ThreadStrategy {
        let strategy = ThreadStrategy::new();
        strategy.init_method_invoker().unwrap();
        strategy
    }

    #[test]
    fn future_returns_value() {
        let strategy = ready();
        let future = strategy
            .execute_and_return_future(Invoker::new("answer", || Ok(42)))
            .unwrap();
        assert_eq!(future.get_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn future_surfaces_failure() {
        let strategy = ready();
        let future = strategy
            .execute_and_return_future(Invoker::new("explode", || -> anyhow::Result<i32> {
                Err(anyhow!("boom"))
            }))
            .unwrap();

        let err = future.get_timeout(Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.invocation_cause().unwrap().to_string(), "boom");
    }

    #[test]
    fn runs_on_named_thread() {
        let strategy = ThreadStrategy::with_thread_name_prefix("report");
        strategy.init_method_invoker().unwrap();

        let future = strategy
            .execute_and_return_future(Invoker::new("whoami", || {
                Ok(thread::current().name().unwrap_or_default().to_string())
            }))
            .unwrap();

        assert_eq!(future.get().unwrap(), "report-0");
        assert_eq!(strategy.spawned(), 1);
    }

    #[test]
    fn without_return_executes_each_call_once() {
        let strategy = ready();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            strategy
                .execute_without_return(Invoker::new("count", move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        while counter.load(Ordering::SeqCst) < 100 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn rejects_work_outside_ready_state() {
        let strategy = ThreadStrategy::new();
        let err = strategy
            .execute_without_return(Invoker::new("early", || Ok(())))
            .unwrap_err();
        assert!(matches!(
            err,
            AsyncError::NotReady {
                state: StrategyState::Uninitialized,
                ..
            }
        ));

        strategy.init_method_invoker().unwrap();
        strategy.shutdown_method_invoker();

        let err = strategy
            .execute_and_return_future(Invoker::new("late", || Ok(())))
            .unwrap_err();
        assert!(matches!(
            err,
            AsyncError::NotReady {
                state: StrategyState::Shutdown,
                ..
            }
        ));
    }

    #[test]
    fn second_init_fails() {
        let strategy = ready();
        assert!(matches!(
            strategy.init_method_invoker(),
            Err(AsyncError::Initialization { .. })
        ));
        assert_eq!(strategy.state(), StrategyState::Ready);
    }
}
