//! Future-style handle over a single deferred call.
//!
//! A [`FutureResult`] wraps an [`Invoker`] and is shared between the thread
//! that submitted the call and whichever thread ends up executing it. The
//! handle is cheap to clone; every clone observes the same completion state.
//!
//! # State machine
//!
//! ```text
//! Pending(invoker) ──run()──► Running ──► Succeeded(value)
//!                                    └──► Failed(cause)
//! ```
//!
//! Only the first `run()` takes the invoker out of `Pending`. Any later call,
//! whether concurrent or after completion, is rejected with
//! [`AsyncError::AlreadyRun`] and leaves the outcome untouched.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{AsyncError, InvocationCause};
use crate::invoker::Invoker;

/// Failure recorded when the deferred call panics instead of returning.
#[derive(Debug, Error)]
#[error("invocation panicked: {0}")]
pub struct InvocationPanicked(pub String);

enum Slot<V> {
    Pending(Invoker<V>),
    Running,
    Succeeded(V),
    Failed(InvocationCause),
}

impl<V> Slot<V> {
    fn is_complete(&self) -> bool {
        matches!(self, Slot::Succeeded(_) | Slot::Failed(_))
    }

    fn name(&self) -> &'static str {
        match self {
            Slot::Pending(_) => "pending",
            Slot::Running => "running",
            Slot::Succeeded(_) => "succeeded",
            Slot::Failed(_) => "failed",
        }
    }
}

struct Shared<V> {
    desc: String,
    slot: Mutex<Slot<V>>,
    completed: Condvar,
}

/// Handle to the outcome of a deferred call.
pub struct FutureResult<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for FutureResult<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V> FutureResult<V> {
    /// Wrap an invoker. Nothing runs until [`FutureResult::run`] is called.
    pub fn new(invoker: Invoker<V>) -> Self {
        Self {
            shared: Arc::new(Shared {
                desc: invoker.desc().to_string(),
                slot: Mutex::new(Slot::Pending(invoker)),
                completed: Condvar::new(),
            }),
        }
    }

    /// Description of the wrapped call.
    pub fn desc(&self) -> &str {
        &self.shared.desc
    }

    /// Non-blocking poll: `true` once a value or a failure has been stored.
    pub fn is_done(&self) -> bool {
        self.shared.slot.lock().is_complete()
    }

    /// Execute the wrapped invoker on the current thread and store its outcome.
    ///
    /// Wakes every thread blocked in `get`. A panic inside the call is caught
    /// and stored as an [`InvocationPanicked`] failure.
    pub fn run(&self) -> Result<(), AsyncError> {
        let invoker = {
            let mut slot = self.shared.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Running) {
                Slot::Pending(invoker) => invoker,
                previous => {
                    let state = previous.name();
                    *slot = previous;
                    warn!(desc = %self.shared.desc, state, "asynchronous invocation already run");
                    return Err(AsyncError::AlreadyRun {
                        desc: self.shared.desc.clone(),
                    });
                }
            }
        };

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| invoker.invoke())) {
            Ok(Ok(value)) => Slot::Succeeded(value),
            Ok(Err(e)) => {
                debug!(desc = %self.shared.desc, error = %e, "asynchronous invocation failed");
                let boxed: Box<dyn std::error::Error + Send + Sync> = e.into();
                Slot::Failed(Arc::from(boxed))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                debug!(desc = %self.shared.desc, panic = %message, "asynchronous invocation panicked");
                Slot::Failed(Arc::new(InvocationPanicked(message)))
            }
        };

        *self.shared.slot.lock() = outcome;
        self.shared.completed.notify_all();
        Ok(())
    }
}

impl<V: Clone> FutureResult<V> {
    /// Block until the call completes and return its value.
    ///
    /// A failed call is reported as [`AsyncError::Invocation`] carrying the
    /// original cause.
    pub fn get(&self) -> Result<V, AsyncError> {
        let mut slot = self.shared.slot.lock();
        while !slot.is_complete() {
            self.shared.completed.wait(&mut slot);
        }
        self.read(&slot)
    }

    /// Like [`FutureResult::get`], giving up with [`AsyncError::Timeout`] once
    /// `timeout` has elapsed. Timing out does not stop the call.
    pub fn get_timeout(&self, timeout: Duration) -> Result<V, AsyncError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        while !slot.is_complete() {
            if self
                .shared
                .completed
                .wait_until(&mut slot, deadline)
                .timed_out()
                && !slot.is_complete()
            {
                return Err(AsyncError::Timeout { waited: timeout });
            }
        }
        self.read(&slot)
    }

    /// Non-blocking read: `None` while the call has not completed.
    pub fn try_get(&self) -> Option<Result<V, AsyncError>> {
        let slot = self.shared.slot.lock();
        slot.is_complete().then(|| self.read(&slot))
    }

    fn read(&self, slot: &Slot<V>) -> Result<V, AsyncError> {
        match slot {
            Slot::Succeeded(value) => Ok(value.clone()),
            Slot::Failed(cause) => Err(AsyncError::Invocation {
                desc: self.shared.desc.clone(),
                source: Arc::clone(cause),
            }),
            Slot::Pending(_) | Slot::Running => {
                // callers only read after observing completion under the same lock
                Err(AsyncError::Timeout {
                    waited: Duration::ZERO,
                })
            }
        }
    }
}

impl<V> fmt::Debug for FutureResult<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureResult")
            .field("desc", &self.shared.desc)
            .field("state", &self.shared.slot.lock().name())
            .finish()
    }
}

/// Type-erased view of a [`FutureResult`].
///
/// Lets a backend carry the handle in its job data and run it without
/// knowing the value type.
pub trait RunnableFuture: Send + Sync {
    /// Description of the wrapped call.
    fn desc(&self) -> &str;

    /// Execute the wrapped call once.
    fn run(&self) -> Result<(), AsyncError>;

    /// Whether the call has completed.
    fn is_done(&self) -> bool;
}

impl<V: Send + 'static> RunnableFuture for FutureResult<V> {
    fn desc(&self) -> &str {
        FutureResult::desc(self)
    }

    fn run(&self) -> Result<(), AsyncError> {
        FutureResult::run(self)
    }

    fn is_done(&self) -> bool {
        FutureResult::is_done(self)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
