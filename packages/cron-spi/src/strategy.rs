//! The asynchronous execution strategy contract.
//!
//! Call sites depend on [`AsynchronousStrategy`] only; which backend actually
//! runs the call (a fresh thread, a scheduler job, ...) is picked when the
//! process is configured.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──init_method_invoker()──► Ready ──shutdown_method_invoker()──► Shutdown
//! ```
//!
//! Backend resources are only held while `Ready`.

use std::fmt;

use crate::error::AsyncError;
use crate::future_result::FutureResult;
use crate::invoker::Invoker;

/// Lifecycle state of a strategy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Uninitialized,
    Ready,
    Shutdown,
}

impl fmt::Display for StrategyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyState::Uninitialized => write!(f, "uninitialized"),
            StrategyState::Ready => write!(f, "ready"),
            StrategyState::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Swappable backend for running method calls off the calling path.
///
/// Implementations guarantee that every submitted [`Invoker`] is executed
/// exactly once. No ordering is promised between two submissions.
pub trait AsynchronousStrategy: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Current lifecycle state.
    fn state(&self) -> StrategyState;

    /// Allocate backend resources. Must be called once before the first
    /// submission; a failure here should abort startup.
    fn init_method_invoker(&self) -> Result<(), AsyncError>;

    /// Release backend resources. Best-effort: failures are logged, not returned.
    fn shutdown_method_invoker(&self);

    /// Schedule the call and return immediately. The outcome is not observable
    /// through this call; callers needing a result use an observer channel or
    /// [`AsynchronousStrategy::execute_and_return_future`].
    fn execute_without_return<V>(&self, invoker: Invoker<V>) -> Result<(), AsyncError>
    where
        V: Send + 'static;

    /// Schedule the call and return a handle the caller can poll or block on.
    ///
    /// Dropping the handle does not cancel the call.
    fn execute_and_return_future<V>(&self, invoker: Invoker<V>) -> Result<FutureResult<V>, AsyncError>
    where
        V: Send + 'static;
}
