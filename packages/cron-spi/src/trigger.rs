//! Trigger supplies and the support types that fire them.
//!
//! A scheduling provider registers a schedule in one context and sees it fire
//! in another, typically a scheduler worker thread that has none of the
//! registering context's state. [`TriggerSupplies`] is the minimal immutable
//! pair needed to notify observers when that happens.
//!
//! - [`TriggerSupport`] fires supplies that were handed to it directly.
//! - [`ProviderContextTriggerSupport`] is for providers that cannot carry the
//!   supplies into the fired callback. They stash the supplies in their own
//!   storage at registration and recover them from the provider context in
//!   [`ProviderContextTriggerSupport::fetch_trigger_supplies`].
//!
//! ```text
//! register:  supplies ──stash(key)──► provider storage
//! fire:      provider context ──fetch(key)──► supplies ──► TriggerBus
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::{TriggerBus, TriggerEvent};
use crate::error::AsyncError;

/// Discriminator selecting which observers receive a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qualifier(String);

impl Qualifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What is needed to notify observers that a schedule fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSupplies {
    payload: serde_json::Value,
    qualifier: Qualifier,
}

impl TriggerSupplies {
    pub fn new(payload: serde_json::Value, qualifier: Qualifier) -> Self {
        Self { payload, qualifier }
    }

    /// Opaque data describing what fired.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    pub fn into_parts(self) -> (serde_json::Value, Qualifier) {
        (self.payload, self.qualifier)
    }
}

/// Fires previously set supplies on a [`TriggerBus`].
///
/// Supplies are consumed by a firing; firing again requires setting them again.
#[derive(Debug)]
pub struct TriggerSupport {
    bus: TriggerBus,
    supplies: Option<TriggerSupplies>,
}

impl TriggerSupport {
    pub fn new(bus: TriggerBus) -> Self {
        Self {
            bus,
            supplies: None,
        }
    }

    pub fn with_supplies(bus: TriggerBus, supplies: TriggerSupplies) -> Self {
        Self {
            bus,
            supplies: Some(supplies),
        }
    }

    pub fn set_supplies(&mut self, supplies: TriggerSupplies) {
        self.supplies = Some(supplies);
    }

    pub fn has_supplies(&self) -> bool {
        self.supplies.is_some()
    }

    pub fn bus(&self) -> &TriggerBus {
        &self.bus
    }

    /// Dispatch the current supplies' payload tagged with their qualifier.
    ///
    /// Returns the number of observers that received it.
    pub fn fire_trigger(&mut self) -> Result<usize, AsyncError> {
        let supplies = self.supplies.take().ok_or(AsyncError::NoSupplies)?;
        let qualifier = supplies.qualifier().clone();
        let delivered = self.bus.emit(TriggerEvent::from_supplies(supplies));
        debug!(qualifier = %qualifier, delivered, "trigger fired");
        Ok(delivered)
    }
}

/// Trigger support for providers that stash supplies in their own storage.
///
/// `C` is the provider-specific context available inside a fired callback,
/// e.g. a job execution context exposing job-scoped data.
pub trait ProviderContextTriggerSupport<C: ?Sized> {
    /// The base support that performs the dispatch.
    fn trigger_support(&mut self) -> &mut TriggerSupport;

    /// Look up the supplies stashed for `provider_context`.
    ///
    /// Must fail with [`AsyncError::SuppliesNotFound`] rather than fall back
    /// to stale or default supplies.
    fn fetch_trigger_supplies(&self, provider_context: &C) -> Result<TriggerSupplies, AsyncError>;

    /// Fetch the supplies for this context, then fire them.
    fn fire_trigger(&mut self, provider_context: &C) -> Result<usize, AsyncError> {
        let supplies = self.fetch_trigger_supplies(provider_context)?;
        let support = self.trigger_support();
        support.set_supplies(supplies);
        support.fire_trigger()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Provider whose context is a key into a side-channel stash.
    struct StashedTriggerSupport {
        support: TriggerSupport,
        stash: HashMap<String, TriggerSupplies>,
    }

    impl ProviderContextTriggerSupport<str> for StashedTriggerSupport {
        fn trigger_support(&mut self) -> &mut TriggerSupport {
            &mut self.support
        }

        fn fetch_trigger_supplies(&self, key: &str) -> Result<TriggerSupplies, AsyncError> {
            self.stash
                .get(key)
                .cloned()
                .ok_or_else(|| AsyncError::SuppliesNotFound {
                    context: key.to_string(),
                })
        }
    }

    fn supplies(qualifier: &str) -> TriggerSupplies {
        TriggerSupplies::new(json!({ "schedule": qualifier }), Qualifier::new(qualifier))
    }

    #[test]
    fn fire_without_supplies_fails() {
        let mut support = TriggerSupport::new(TriggerBus::new());
        assert!(matches!(support.fire_trigger(), Err(AsyncError::NoSupplies)));
    }

    #[test]
    fn supplies_are_consumed_by_firing() {
        let bus = TriggerBus::new();
        let mut receiver = bus.subscribe();
        let mut support = TriggerSupport::with_supplies(bus, supplies("hourly"));

        assert_eq!(support.fire_trigger().unwrap(), 1);
        assert!(!support.has_supplies());
        assert!(matches!(support.fire_trigger(), Err(AsyncError::NoSupplies)));

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.qualifier.as_str(), "hourly");
    }

    #[test]
    fn provider_context_dispatches_stashed_pair() {
        let bus = TriggerBus::new();
        let mut receiver = bus.subscribe();
        let mut provider = StashedTriggerSupport {
            support: TriggerSupport::new(bus),
            stash: HashMap::from([
                ("job-a".to_string(), supplies("hourly")),
                ("job-b".to_string(), supplies("nightly")),
            ]),
        };

        provider.fire_trigger("job-b").unwrap();

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.qualifier, Qualifier::new("nightly"));
        assert_eq!(event.payload, json!({ "schedule": "nightly" }));
    }

    #[test]
    fn provider_context_without_stash_does_not_dispatch() {
        let bus = TriggerBus::new();
        let mut receiver = bus.subscribe();
        let mut provider = StashedTriggerSupport {
            support: TriggerSupport::with_supplies(bus, supplies("stale")),
            stash: HashMap::new(),
        };

        let err = provider.fire_trigger("missing").unwrap_err();

        assert!(matches!(err, AsyncError::SuppliesNotFound { ref context } if context == "missing"));
        assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn supplies_serialize_with_transparent_qualifier() {
        let value = serde_json::to_value(supplies("weekly")).unwrap();
        assert_eq!(value, json!({ "payload": { "schedule": "weekly" }, "qualifier": "weekly" }));

        let back: TriggerSupplies = serde_json::from_value(value).unwrap();
        assert_eq!(back, supplies("weekly"));
    }
}
