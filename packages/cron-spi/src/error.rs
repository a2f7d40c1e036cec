//! Structured error types for asynchronous invocation.
//!
//! `AsyncError` provides pattern-matchable errors instead of generic `anyhow::Error`.
//!
//! # Propagation
//!
//! - `Initialization` and `Submission` surface immediately to the caller.
//! - `Invocation` is captured inside a [`FutureResult`](crate::FutureResult) and only
//!   surfaces to a caller of `get()`, with the original failure kept as `source()`.
//! - `Shutdown` is built for reporting and logged; strategies never return it.
//!
//! # Example
//!
//! ```ignore
//! match future.get_timeout(Duration::from_secs(1)) {
//!     Ok(value) => println!("got {value}"),
//!     Err(AsyncError::Timeout { .. }) => println!("still running"),
//!     Err(AsyncError::Invocation { source, .. }) => eprintln!("call failed: {source}"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::strategy::StrategyState;

/// Shared, cloneable failure cause recorded by a completed invocation.
pub type InvocationCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors raised by strategies, future results and trigger support.
#[derive(Debug, Error)]
pub enum AsyncError {
    /// Backend resources could not be allocated while initialising a strategy.
    #[error("failed to initialise {strategy} strategy")]
    Initialization {
        strategy: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Backend resources could not be released.
    #[error("failed to shut down {strategy} strategy")]
    Shutdown {
        strategy: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The strategy is not accepting work in its current lifecycle state.
    #[error("{strategy} strategy is {state}, expected ready")]
    NotReady {
        strategy: &'static str,
        state: StrategyState,
    },

    /// The backend refused to accept the call.
    #[error("error invoking method asynchronously ({job})")]
    Submission {
        job: String,
        #[source]
        source: anyhow::Error,
    },

    /// The deferred call itself failed.
    #[error("asynchronous invocation '{desc}' failed")]
    Invocation {
        desc: String,
        #[source]
        source: InvocationCause,
    },

    /// The caller stopped waiting before the call completed.
    #[error("timed out after {waited:?} waiting for asynchronous result")]
    Timeout { waited: Duration },

    /// `run()` was called on a future result that already ran.
    #[error("asynchronous invocation '{desc}' was already run")]
    AlreadyRun { desc: String },

    /// No trigger supplies were stashed for the provider context.
    #[error("no trigger supplies stashed for {context}")]
    SuppliesNotFound { context: String },

    /// Stashed trigger supplies could not be decoded.
    #[error("trigger supplies stashed for {context} are invalid")]
    InvalidSupplies {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The base trigger support was asked to fire without supplies.
    #[error("trigger fired without supplies")]
    NoSupplies,
}

impl AsyncError {
    /// Returns `true` if this error means the caller gave up waiting
    /// while the underlying call may still be running.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AsyncError::Timeout { .. })
    }

    /// Returns the original failure cause if this is an invocation failure.
    pub fn invocation_cause(&self) -> Option<&InvocationCause> {
        match self {
            AsyncError::Invocation { source, .. } => Some(source),
            _ => None,
        }
    }
}
