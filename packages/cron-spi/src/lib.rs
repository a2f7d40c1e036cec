//! # cron-spi
//!
//! Contracts for running method calls "later", without call sites knowing how
//! later is implemented.
//!
//! ## Core Concepts
//!
//! - [`Invoker`] = a one-shot deferred call
//! - [`FutureResult`] = a blockable, pollable handle to that call's outcome
//! - [`AsynchronousStrategy`] = a swappable backend that runs invokers
//! - [`TriggerSupplies`] = what is needed to notify observers that a schedule fired
//!
//! ## Architecture
//!
//! ```text
//! caller
//!     │
//!     ▼ execute_and_return_future(invoker)
//! AsynchronousStrategy ──► thread / scheduler job
//!     │                          │
//!     ▼                          ▼ run()
//! FutureResult ◄──── value or failure stored once
//!     │
//!     ▼ get() / get_timeout() / is_done()
//! caller
//!
//! scheduler job fires
//!     │
//!     └─► ProviderContextTriggerSupport.fetch_trigger_supplies(ctx)
//!             └─► TriggerSupport.fire_trigger() ──► TriggerBus ──► observers
//! ```
//!
//! ## Guarantees
//!
//! - **Exactly-once execution** per submission; a second `run()` is rejected
//! - **One outcome**: a completed future holds a value or a failure, never both
//! - **No ordering** between independent submissions
//! - **No cancellation**: timing out in `get_timeout` leaves the call running

mod bus;
mod error;
mod future_result;
mod invoker;
mod strategy;
mod trigger;

pub use bus::{TriggerBus, TriggerEvent, TriggerReceiver};
pub use error::{AsyncError, InvocationCause};
pub use future_result::{FutureResult, InvocationPanicked, RunnableFuture};
pub use invoker::Invoker;
pub use strategy::{AsynchronousStrategy, StrategyState};
pub use trigger::{ProviderContextTriggerSupport, Qualifier, TriggerSupplies, TriggerSupport};
