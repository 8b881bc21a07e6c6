//! Listener registries and synchronous event dispatch.
//!
//! Every registry is copy-on-write: `add`/`remove` publish a new list, and a
//! dispatch iterates the list that was current when it started. Listeners
//! added or removed while a dispatch is running do not affect that dispatch.
//!
//! A listener that fails (returns `Err` or panics) is logged and skipped;
//! delivery to the remaining listeners continues.

use crate::{
    ConnectionStatus, CustomEvent, Pin, PinValueChangedEvent, ReplyEvent, log_error,
    logger::Logger,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Error returned by a listener callback.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by every listener callback.
pub type ListenerResult = Result<(), ListenerError>;

// =============================================================================
// Listener traits
// =============================================================================

/// Receives pin value changes.
pub trait EventListener: Send + Sync {
    fn state_changed(&self, event: &PinValueChangedEvent) -> ListenerResult;

    /// The pin this listener watches, if it is pin-filtered.
    ///
    /// Pin-filtered listeners drive start/stop listening on the device.
    fn pin(&self) -> Option<Pin> {
        None
    }
}

/// Receives replies to tagged requests.
pub trait ReplyListener: Send + Sync {
    fn reply_received(&self, event: &ReplyEvent) -> ListenerResult;
}

/// Receives custom protocol events.
pub trait CustomListener: Send + Sync {
    fn custom_event_received(&self, event: &CustomEvent) -> ListenerResult;
}

/// Receives connection status transitions.
pub trait ConnectionListener: Send + Sync {
    fn status_changed(&self, status: ConnectionStatus) -> ListenerResult;
}

impl<F> EventListener for F
where
    F: Fn(&PinValueChangedEvent) -> ListenerResult + Send + Sync,
{
    fn state_changed(&self, event: &PinValueChangedEvent) -> ListenerResult {
        self(event)
    }
}

impl<F> ReplyListener for F
where
    F: Fn(&ReplyEvent) -> ListenerResult + Send + Sync,
{
    fn reply_received(&self, event: &ReplyEvent) -> ListenerResult {
        self(event)
    }
}

impl<F> CustomListener for F
where
    F: Fn(&CustomEvent) -> ListenerResult + Send + Sync,
{
    fn custom_event_received(&self, event: &CustomEvent) -> ListenerResult {
        self(event)
    }
}

impl<F> ConnectionListener for F
where
    F: Fn(ConnectionStatus) -> ListenerResult + Send + Sync,
{
    fn status_changed(&self, status: ConnectionStatus) -> ListenerResult {
        self(status)
    }
}

/// Forwards only the events of one pin to the wrapped listener.
pub struct FilteredEventListener {
    pin: Pin,
    inner: Box<dyn EventListener>,
}

impl FilteredEventListener {
    pub fn new<L: EventListener + 'static>(pin: impl Into<Pin>, listener: L) -> Self {
        Self {
            pin: pin.into(),
            inner: Box::new(listener),
        }
    }
}

impl EventListener for FilteredEventListener {
    fn state_changed(&self, event: &PinValueChangedEvent) -> ListenerResult {
        if event.pin() == self.pin {
            self.inner.state_changed(event)
        } else {
            Ok(())
        }
    }

    fn pin(&self) -> Option<Pin> {
        Some(self.pin)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Ordered, copy-on-write collection of listener handles.
///
/// Handles are compared by reference. The same handle may be added twice,
/// and `remove` drops one matching entry at a time.
pub struct Registry<T: ?Sized> {
    entries: RwLock<Arc<Vec<Arc<T>>>>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn add(&self, listener: Arc<T>) {
        self.update(|list| list.push(listener));
    }

    /// Removes the first entry referring to `listener`.
    /// Returns false if it was not registered.
    pub fn remove(&self, listener: &Arc<T>) -> bool {
        self.update(|list| match position(list, listener) {
            Some(idx) => {
                list.remove(idx);
                true
            }
            None => false,
        })
    }

    /// Returns the list as it is right now. Later mutations do not affect it.
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every entry and returns what was registered.
    pub fn clear(&self) -> Arc<Vec<Arc<T>>> {
        std::mem::replace(&mut *self.entries.write(), Arc::new(Vec::new()))
    }

    /// Applies `f` to a private copy of the list and publishes the result.
    ///
    /// Writers are serialized; readers holding an older snapshot keep it.
    fn update<R>(&self, f: impl FnOnce(&mut Vec<Arc<T>>) -> R) -> R {
        let mut guard = self.entries.write();
        let mut list = Vec::clone(&guard);
        let result = f(&mut list);
        *guard = Arc::new(list);
        result
    }
}

fn position<T: ?Sized>(list: &[Arc<T>], listener: &Arc<T>) -> Option<usize> {
    list.iter()
        .position(|l| std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)))
}

fn watches(list: &[Arc<dyn EventListener>], pin: Pin) -> bool {
    list.iter().any(|l| l.pin() == Some(pin))
}

// =============================================================================
// Dispatcher
// =============================================================================

/// The four listener registries of a link plus the dispatch logic.
pub struct Listeners {
    events: Registry<dyn EventListener>,
    replies: Registry<dyn ReplyListener>,
    customs: Registry<dyn CustomListener>,
    connections: Registry<dyn ConnectionListener>,
    logger: Arc<dyn Logger>,
}

impl Listeners {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            events: Registry::new(),
            replies: Registry::new(),
            customs: Registry::new(),
            connections: Registry::new(),
            logger,
        }
    }

    /// Registers an event listener.
    ///
    /// Returns `Some(pin)` when the listener is pin-filtered and no other
    /// listener was watching that pin, meaning the device should start
    /// reporting it.
    pub fn add_event_listener(&self, listener: Arc<dyn EventListener>) -> Option<Pin> {
        let pin = listener.pin();
        self.events.update(|list| {
            let first = match pin {
                Some(p) if !watches(list, p) => Some(p),
                _ => None,
            };
            list.push(listener);
            first
        })
    }

    /// Unregisters one entry of an event listener.
    ///
    /// Returns `Some(pin)` when it removed the last listener watching that
    /// pin, meaning the device may stop reporting it.
    pub fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) -> Option<Pin> {
        self.events.update(|list| {
            let idx = position(list, listener)?;
            let removed = list.remove(idx);
            match removed.pin() {
                Some(p) if !watches(list, p) => Some(p),
                _ => None,
            }
        })
    }

    /// Drops every event listener and returns the distinct pins that were
    /// being watched, in registration order.
    pub fn deregister_all_event_listeners(&self) -> Vec<Pin> {
        let removed = self.events.clear();
        let mut seen = HashSet::new();
        removed
            .iter()
            .filter_map(|l| l.pin())
            .filter(|p| seen.insert(*p))
            .collect()
    }

    pub fn add_reply_listener(&self, listener: Arc<dyn ReplyListener>) {
        self.replies.add(listener);
    }

    pub fn remove_reply_listener(&self, listener: &Arc<dyn ReplyListener>) -> bool {
        self.replies.remove(listener)
    }

    pub fn add_custom_listener(&self, listener: Arc<dyn CustomListener>) {
        self.customs.add(listener);
    }

    pub fn remove_custom_listener(&self, listener: &Arc<dyn CustomListener>) -> bool {
        self.customs.remove(listener)
    }

    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.connections.add(listener);
    }

    pub fn remove_connection_listener(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        self.connections.remove(listener)
    }

    /// Returns true if at least one reply listener is registered.
    pub fn has_reply_listeners(&self) -> bool {
        !self.replies.is_empty()
    }

    /// Returns true if any registered event listener filters on `pin`.
    pub fn is_watching(&self, pin: Pin) -> bool {
        watches(&self.events.snapshot(), pin)
    }

    pub fn event_listener_count(&self) -> usize {
        self.events.len()
    }

    pub fn fire_state_changed(&self, event: &PinValueChangedEvent) {
        self.dispatch("EventListener", &self.events, |l| l.state_changed(event));
    }

    pub fn fire_reply_received(&self, event: &ReplyEvent) {
        self.dispatch("ReplyListener", &self.replies, |l| l.reply_received(event));
    }

    pub fn fire_custom_received(&self, event: &CustomEvent) {
        self.dispatch("CustomListener", &self.customs, |l| {
            l.custom_event_received(event)
        });
    }

    pub fn fire_connection_status(&self, status: ConnectionStatus) {
        self.dispatch("ConnectionListener", &self.connections, |l| {
            l.status_changed(status)
        });
    }

    fn dispatch<T: ?Sized>(
        &self,
        kind: &str,
        registry: &Registry<T>,
        deliver: impl Fn(&T) -> ListenerResult,
    ) {
        let snapshot = registry.snapshot();
        for (idx, listener) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| deliver(&**listener))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log_error!(self.logger, "{} #{} failure: {}", kind, idx, e),
                Err(_) => log_error!(self.logger, "{} #{} panicked", kind, idx),
            }
        }
    }
}
