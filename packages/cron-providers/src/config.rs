use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, ensure, Context, Result};
use dotenvy::dotenv;

use crate::scheduler::{SchedulerConfig, DEFAULT_POOL_SIZE, DEFAULT_SCHEDULER_NAME_PREFIX};

/// Which backend runs asynchronous invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    Threads,
    Scheduler,
}

impl FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "threads" | "thread" => Ok(StrategyKind::Threads),
            "scheduler" | "cron" => Ok(StrategyKind::Scheduler),
            other => bail!("unknown asynchronous strategy '{}'", other),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Threads => f.write_str("threads"),
            StrategyKind::Scheduler => f.write_str("scheduler"),
        }
    }
}

/// Asynchronous execution configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncConfig {
    pub strategy: StrategyKind,
    pub worker_pool_size: usize,
    pub scheduler_name_prefix: String,
}

impl AsyncConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strategy = match lookup("ASYNC_STRATEGY") {
            Some(value) => value
                .parse()
                .context("ASYNC_STRATEGY must be 'threads' or 'scheduler'")?,
            None => StrategyKind::default(),
        };

        let worker_pool_size = match lookup("ASYNC_WORKER_POOL_SIZE") {
            Some(value) => value
                .trim()
                .parse()
                .context("ASYNC_WORKER_POOL_SIZE must be a valid number")?,
            None => DEFAULT_POOL_SIZE,
        };
        ensure!(
            worker_pool_size > 0,
            "ASYNC_WORKER_POOL_SIZE must be greater than zero"
        );

        let scheduler_name_prefix = lookup("ASYNC_SCHEDULER_NAME_PREFIX")
            .unwrap_or_else(|| DEFAULT_SCHEDULER_NAME_PREFIX.to_string());

        Ok(Self {
            strategy,
            worker_pool_size,
            scheduler_name_prefix,
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            pool_size: self.worker_pool_size,
            name_prefix: self.scheduler_name_prefix.clone(),
        }
    }
}

impl Default for AsyncConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            worker_pool_size: DEFAULT_POOL_SIZE,
            scheduler_name_prefix: DEFAULT_SCHEDULER_NAME_PREFIX.to_string(),
        }
    }
}
