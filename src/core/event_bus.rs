//! Pub/Sub bus carrying coordinator outputs to the UI/transport layer.
//!
//! - `subscribe::<E>()` callbacks run synchronously inside `emit`
//! - every emitted event is also queued; `poll()` drains the queue
//!
//! The coordinator only emits from its own thread, so subscribers see
//! events in the order state changed. Order across event types is the
//! emission order (one queue).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::warn;

/// Maximum events in queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Blanket-implemented for any `Send + Sync` type.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<TypeId, Vec<Callback>>>>,
    queue: Arc<Mutex<Vec<BoxedEvent>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_types", &self.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of type E. Callback runs inside `emit`.
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Invoke subscribers, then queue the event for `poll`.
    pub fn emit<E: Event>(&self, event: E) {
        // Clone the callback list so a subscriber may subscribe/emit re-entrantly
        let callbacks: Vec<Callback> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default();
        for cb in &callbacks {
            cb(&event);
        }

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict_count = queue.len() / 2;
            warn!("EventBus queue full ({} events), evicting oldest {}", queue.len(), evict_count);
            queue.drain(0..evict_count);
        }
        queue.push(Box::new(event));
    }

    /// Drain all queued events.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Drop subscribers for type E
    pub fn unsubscribe_all<E: Event>(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Downcast a polled event to its concrete type.
///
/// Derefs to `dyn Event` first: calling `as_any()` on the `Box` itself would
/// hit the blanket impl for `Box<dyn Event>` and never match.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Clone, Debug)]
    struct Ping(i32);

    #[derive(Clone, Debug)]
    struct Pong;

    #[test]
    fn test_subscribe_emit_immediate() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe::<Ping, _>(move |e| {
            c.fetch_add(e.0, Ordering::SeqCst);
        });

        bus.emit(Ping(10));
        bus.emit(Pong);
        bus.emit(Ping(5));
        assert_eq!(counter.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_poll_preserves_order() {
        let bus = EventBus::new();
        bus.emit(Ping(1));
        bus.emit(Pong);
        bus.emit(Ping(2));

        let events = bus.poll();
        assert_eq!(events.len(), 3);
        assert_eq!(downcast_event::<Ping>(&events[0]).map(|p| p.0), Some(1));
        assert!(downcast_event::<Pong>(&events[1]).is_some());
        assert!(downcast_event::<Ping>(&events[1]).is_none());
        assert_eq!(bus.poll().len(), 0);
    }

    #[test]
    fn test_unsubscribe_keeps_queueing() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe::<Ping, _>(move |e| {
            c.fetch_add(e.0, Ordering::SeqCst);
        });
        bus.unsubscribe_all::<Ping>();
        bus.emit(Ping(10));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(bus.queue_len(), 1);
    }
}
