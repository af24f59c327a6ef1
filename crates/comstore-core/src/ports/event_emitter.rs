//! Event emitter trait and the observer-list bus.
//!
//! Dispatch is a plain synchronous broadcast to the observers registered at
//! the time of the call. There is no queue, no retry and no backpressure:
//! an observer that is added later never sees earlier events.

use std::sync::{Arc, PoisonError, RwLock};

use crate::events::AppEvent;

/// Trait for emitting application events.
///
/// # Implementations
///
/// - `NoopEmitter` - For tests and CLI contexts that don't need events
/// - `EventBus` - Fans out to registered observers
pub trait AppEventEmitter: Send + Sync {
    /// Emit an application event. Must not block.
    fn emit(&self, event: AppEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn AppEventEmitter>;
}

/// A no-op event emitter for tests and CLI contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub const fn new() -> Self {
        Self
    }
}

impl AppEventEmitter for NoopEmitter {
    fn emit(&self, _event: AppEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

/// Observer list. Clones share the same list.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<RwLock<Vec<Arc<dyn AppEventEmitter>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for all future events.
    pub fn subscribe(&self, observer: Arc<dyn AppEventEmitter>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl AppEventEmitter for EventBus {
    fn emit(&self, event: AppEvent) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer.emit(event.clone());
        }
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}
