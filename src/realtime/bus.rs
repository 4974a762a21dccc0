//! Change Notification Bus
//!
//! In-process publish/subscribe for store mutations, scoped by entity type.
//!
//! # Delivery
//!
//! Delivery is synchronous: every handler subscribed to the event's entity
//! type runs to completion before `publish` returns. Handlers are called in
//! subscription order. A handler that returns an error or panics is logged and
//! counted, and the fan-out continues with the next handler.
//!
//! Only the local store publishes; UI code subscribes and unsubscribes.
//!
//! # Usage
//!
//! ```rust
//! use estate_sync::realtime::ChangeBus;
//! use estate_sync::shared::{ChangeEvent, EntityType};
//!
//! let bus = ChangeBus::new();
//! let handle = bus.subscribe_fn(EntityType::Property, |event: &ChangeEvent| {
//!     println!("{} {}", event.operation(), event.id());
//!     Ok(())
//! });
//! assert!(bus.unsubscribe(handle));
//! ```

use crate::shared::entity::EntityType;
use crate::shared::error::HandlerError;
use crate::shared::event::ChangeEvent;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Receiver of change events for one entity type
pub trait ChangeHandler: Send + Sync {
    /// Handle one event; an error is logged by the bus and does not stop fan-out
    fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError>;
}

impl<F> ChangeHandler for F
where
    F: Fn(&ChangeEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Token returned by `subscribe`, needed to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    entity_type: EntityType,
    id: u64,
}

impl SubscriptionHandle {
    /// Entity type the subscription listens to
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }
}

/// Outcome of one `publish` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Handlers that returned `Ok`
    pub delivered: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

struct Subscriber {
    id: u64,
    handler: Arc<dyn ChangeHandler>,
}

/// Publish/subscribe hub for change events
pub struct ChangeBus {
    subscribers: RwLock<HashMap<EntityType, Vec<Subscriber>>>,
    next_id: AtomicU64,
    handler_failures: AtomicU64,
}

impl ChangeBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            handler_failures: AtomicU64::new(0),
        }
    }

    /// Register a handler for one entity type
    pub fn subscribe<H>(&self, entity_type: EntityType, handler: H) -> SubscriptionHandle
    where
        H: ChangeHandler + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        subscribers.entry(entity_type).or_default().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        tracing::debug!("[Bus] subscription {} added for {}", id, entity_type);
        SubscriptionHandle { entity_type, id }
    }

    /// Register a closure; same as `subscribe` but lets the closure type be inferred
    pub fn subscribe_fn<F>(&self, entity_type: EntityType, handler: F) -> SubscriptionHandle
    where
        F: Fn(&ChangeEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(entity_type, handler)
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subscribers.get_mut(&handle.entity_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != handle.id);
        before != list.len()
    }

    /// Number of live subscriptions for an entity type
    pub fn subscriber_count(&self, entity_type: EntityType) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entity_type)
            .map_or(0, Vec::len)
    }

    /// Handler failures observed since the bus was created
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Fan an event out to every subscriber of its entity type
    pub(crate) fn publish(&self, event: &ChangeEvent) -> Delivery {
        // Handlers may subscribe or unsubscribe while running, so call them
        // on a copy of the list with the lock released.
        let handlers: Vec<(u64, Arc<dyn ChangeHandler>)> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.entity_type())
            .map(|list| list.iter().map(|s| (s.id, Arc::clone(&s.handler))).collect())
            .unwrap_or_default();

        let mut delivery = Delivery::default();
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    tracing::warn!(
                        "[Bus] handler {} failed on {} {} '{}': {}",
                        id,
                        event.operation(),
                        event.entity_type(),
                        event.id(),
                        e
                    );
                }
                Err(_) => {
                    delivery.failed += 1;
                    tracing::error!(
                        "[Bus] handler {} panicked on {} {} '{}'",
                        id,
                        event.operation(),
                        event.entity_type(),
                        event.id()
                    );
                }
            }
        }
        if delivery.failed > 0 {
            self.handler_failures
                .fetch_add(delivery.failed as u64, Ordering::Relaxed);
        }
        delivery
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<EntityType, usize> =
            subscribers.iter().map(|(t, list)| (*t, list.len())).collect();
        f.debug_struct("ChangeBus")
            .field("subscribers", &counts)
            .field("handler_failures", &self.handler_failures())
            .finish()
    }
}
