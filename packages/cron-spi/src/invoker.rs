//! One-shot deferred calls.

use std::fmt;

use anyhow::Result;

type BoxedCall<V> = Box<dyn FnOnce() -> Result<V> + Send + 'static>;

/// A method call that can be performed once, producing a value or an error.
///
/// The call and any arguments it needs are captured when the invoker is
/// built. [`Invoker::invoke`] consumes the invoker, so a second invocation
/// of the same call cannot be expressed.
///
/// # Example
///
/// ```ignore
/// let invoker = Invoker::new("report:render", move || render(report_id));
/// let future = strategy.execute_and_return_future(invoker)?;
/// ```
pub struct Invoker<V> {
    desc: String,
    call: BoxedCall<V>,
}

impl<V> Invoker<V> {
    /// Capture a call. `desc` is free-form and only used for logging and errors.
    pub fn new<F>(desc: impl Into<String>, call: F) -> Self
    where
        F: FnOnce() -> Result<V> + Send + 'static,
    {
        Self {
            desc: desc.into(),
            call: Box::new(call),
        }
    }

    /// Free-form description of the captured call.
    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// Perform the captured call on the current thread.
    pub fn invoke(self) -> Result<V> {
        (self.call)()
    }
}

impl<V> fmt::Debug for Invoker<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker").field("desc", &self.desc).finish()
    }
}
