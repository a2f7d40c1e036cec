//! End-to-end tests against the real thread and cron backends.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use cron_providers::{
    AsyncConfig, CronSchedulerFactory, SchedulerConfig, SchedulerStrategy, Strategy, StrategyKind,
    ThreadStrategy,
};
use cron_spi::{AsyncError, AsynchronousStrategy, Invoker, Qualifier, StrategyState, TriggerSupplies};
use serde_json::json;

use common::{init_tracing, wait_until};

const WAIT: Duration = Duration::from_secs(15);

fn scheduler_strategy(pool_size: usize) -> SchedulerStrategy {
    let config = SchedulerConfig {
        pool_size,
        ..SchedulerConfig::default()
    };
    let strategy = SchedulerStrategy::new(config);
    strategy.init_method_invoker().unwrap();
    strategy
}

#[test]
fn scheduler_future_returns_value() {
    init_tracing();
    let strategy = scheduler_strategy(4);

    let future = strategy
        .execute_and_return_future(Invoker::new("answer", || Ok(42)))
        .unwrap();

    assert_eq!(future.get_timeout(WAIT).unwrap(), 42);
    assert!(future.is_done());
    strategy.shutdown_method_invoker();
}

#[test]
fn scheduler_future_surfaces_failure() {
    init_tracing();
    let strategy = scheduler_strategy(4);

    let future = strategy
        .execute_and_return_future(Invoker::new("explode", || -> anyhow::Result<u8> {
            Err(anyhow!("boom"))
        }))
        .unwrap();

    let err = future.get_timeout(WAIT).unwrap_err();
    assert!(matches!(err, AsyncError::Invocation { .. }));
    assert_eq!(err.invocation_cause().unwrap().to_string(), "boom");
    strategy.shutdown_method_invoker();
}

#[test]
fn thread_strategy_runs_every_call_once() {
    init_tracing();
    let strategy = ThreadStrategy::new();
    strategy.init_method_invoker().unwrap();
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

    assert!(wait_until(WAIT, || counter.load(Ordering::SeqCst) == 100));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(counter.load(Ordering::SeqCst), 100);
}

#[test]
fn scheduler_runs_every_call_once() {
    init_tracing();
    let strategy = scheduler_strategy(4);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..20 {
        let counter = Arc::clone(&counter);
        strategy
            .execute_without_return(Invoker::new("count", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
    }

    assert!(wait_until(WAIT, || counter.load(Ordering::SeqCst) == 20));
    assert!(wait_until(WAIT, || strategy.pending_jobs() == 0));
    assert_eq!(counter.load(Ordering::SeqCst), 20);
    strategy.shutdown_method_invoker();
}

#[test]
fn scheduler_bounds_concurrency_to_pool_size() {
    init_tracing();
    let strategy = scheduler_strategy(2);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let futures: Vec<_> = (0..6)
        .map(|n| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            strategy
                .execute_and_return_future(Invoker::new(format!("slow-{n}"), move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(200));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(n)
                }))
                .unwrap()
        })
        .collect();

    for (n, future) in futures.iter().enumerate() {
        assert_eq!(future.get_timeout(WAIT).unwrap(), n);
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
    strategy.shutdown_method_invoker();
}

#[test]
fn scheduler_instances_do_not_collide() {
    init_tracing();
    let first = scheduler_strategy(1);
    let second = scheduler_strategy(1);

    let first_name = first.scheduler_name().unwrap();
    let second_name = second.scheduler_name().unwrap();
    assert_ne!(first_name, second_name);
    assert!(first_name.starts_with("CronAsyncScheduler_"));

    let registry = CronSchedulerFactory::process();
    assert!(registry.is_registered(&first_name));
    assert!(registry.is_registered(&second_name));

    let a = first
        .execute_and_return_future(Invoker::new("first", || Ok("a")))
        .unwrap();
    let b = second
        .execute_and_return_future(Invoker::new("second", || Ok("b")))
        .unwrap();
    assert_eq!(a.get_timeout(WAIT).unwrap(), "a");
    assert_eq!(b.get_timeout(WAIT).unwrap(), "b");

    first.shutdown_method_invoker();
    assert!(!registry.is_registered(&first_name));
    assert!(registry.is_registered(&second_name));
    second.shutdown_method_invoker();
}

#[test]
fn scheduler_rejects_work_after_shutdown() {
    init_tracing();
    let strategy = scheduler_strategy(1);
    strategy.shutdown_method_invoker();

    assert_eq!(strategy.state(), StrategyState::Shutdown);
    assert_eq!(strategy.pending_jobs(), 0);
    assert!(matches!(
        strategy.execute_without_return(Invoker::new("late", || Ok(()))),
        Err(AsyncError::NotReady { .. })
    ));

    // Shutting down twice is harmless.
    strategy.shutdown_method_invoker();
}

#[test]
fn scheduled_trigger_is_delivered_to_qualified_observer() {
    init_tracing();
    let strategy = scheduler_strategy(2);
    let mut nightly = strategy
        .trigger_bus()
        .subscribe_qualified(Qualifier::new("nightly"));
    let mut hourly = strategy
        .trigger_bus()
        .subscribe_qualified(Qualifier::new("hourly"));

    let delay = Duration::from_millis(1900);
    let scheduled_at = Instant::now();
    strategy
        .schedule_trigger(
            TriggerSupplies::new(json!({ "report": "sales" }), Qualifier::new("nightly")),
            delay,
        )
        .unwrap();

    let mut received = None;
    assert!(wait_until(WAIT, || {
        if let Ok(event) = nightly.try_recv() {
            received = Some(event);
        }
        received.is_some()
    }));

    assert!(scheduled_at.elapsed() >= delay);
    let event = received.unwrap();
    assert_eq!(event.qualifier, Qualifier::new("nightly"));
    assert_eq!(event.payload, json!({ "report": "sales" }));
    assert!(hourly.try_recv().is_err());
    strategy.shutdown_method_invoker();
}

#[test]
fn scheduled_trigger_with_unbounded_delay_is_rejected() {
    init_tracing();
    let strategy = scheduler_strategy(1);

    let err = strategy
        .schedule_trigger(
            TriggerSupplies::new(json!(null), Qualifier::new("never")),
            Duration::MAX,
        )
        .unwrap_err();

    assert!(matches!(err, AsyncError::Submission { .. }));
    assert_eq!(strategy.pending_jobs(), 0);
    strategy.shutdown_method_invoker();
}

#[test]
fn scheduler_future_has_one_outcome_for_every_waiter() {
    init_tracing();
    let strategy = scheduler_strategy(2);
    let runs = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&runs);
    let future = strategy
        .execute_and_return_future(Invoker::new("shared", move || {
            thread::sleep(Duration::from_millis(200));
            Ok(counted.fetch_add(1, Ordering::SeqCst) + 1)
        }))
        .unwrap();

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let future = future.clone();
            thread::spawn(move || future.get_timeout(WAIT).unwrap())
        })
        .collect();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), 1);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    strategy.shutdown_method_invoker();
}

#[test]
fn configured_scheduler_strategy_runs_calls() {
    init_tracing();
    let config = AsyncConfig {
        strategy: StrategyKind::Scheduler,
        worker_pool_size: 2,
        scheduler_name_prefix: "ConfiguredScheduler".to_string(),
    };

    let strategy = Strategy::from_config(&config);
    strategy.init_method_invoker().unwrap();

    let scheduler = strategy.as_scheduler().unwrap();
    assert!(scheduler
        .scheduler_name()
        .unwrap()
        .starts_with("ConfiguredScheduler_"));

    let future = strategy
        .execute_and_return_future(Invoker::new("configured", || Ok(vec![1, 2, 3])))
        .unwrap();
    assert_eq!(future.get_timeout(WAIT).unwrap(), vec![1, 2, 3]);

    strategy.shutdown_method_invoker();
    assert_eq!(strategy.state(), StrategyState::Shutdown);
}
