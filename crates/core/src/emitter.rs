//! Synchronous event surface.
//!
//! Listeners are invoked in registration order, synchronously within a
//! single emission. A panicking listener is isolated behind an unwind
//! boundary so the remaining listeners still run; the first captured
//! panic is re-raised after the emission loop completes.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Integrator-facing lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Open,
    Close,
    Logout,
    Navigate,
    Error,
    Destroy,
}

/// Subscription handle returned by `on`/`once`, used with `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Callback = Arc<Mutex<dyn FnMut(&Value) + Send>>;

struct Entry {
    id: ListenerId,
    once: bool,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<Entry>>,
}

/// Minimal synchronous publish/subscribe facade.
#[derive(Default)]
pub struct EventEmitter {
    registry: Mutex<Registry>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to an event. Listeners fire in registration order.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.register(kind, callback, false)
    }

    /// Subscribes for a single delivery; auto-unsubscribes afterwards.
    pub fn once<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.register(kind, callback, true)
    }

    /// Removes a listener. No-op for unknown ids.
    pub fn off(&self, kind: EventKind, id: ListenerId) {
        let mut registry = self.registry.lock();
        if let Some(entries) = registry.listeners.get_mut(&kind) {
            entries.retain(|entry| entry.id != id);
        }
    }

    /// Emits an event to all current listeners.
    ///
    /// The listener list is snapshotted before delivery, so a listener
    /// that subscribes or unsubscribes during emission does not affect
    /// the current pass.
    pub fn emit(&self, kind: EventKind, payload: &Value) {
        let snapshot: Vec<(ListenerId, bool, Callback)> = {
            let registry = self.registry.lock();
            registry
                .listeners
                .get(&kind)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|e| (e.id, e.once, Arc::clone(&e.callback)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut panic_payload = None;
        for (id, once, callback) in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| {
                let mut callback = callback.lock();
                (&mut *callback)(payload);
            }));
            if once {
                self.off(kind, id);
            }
            if let Err(payload) = result {
                if panic_payload.is_none() {
                    panic_payload = Some(payload);
                }
            }
        }

        if let Some(payload) = panic_payload {
            resume_unwind(payload);
        }
    }

    fn register<F>(&self, kind: EventKind, callback: F, once: bool) -> ListenerId
    where
        F: FnMut(&Value) + Send + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.listeners.entry(kind).or_default().push(Entry {
            id,
            once,
            callback: Arc::new(Mutex::new(callback)),
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listeners_fire_in_registration_order() {
        let emitter = EventEmitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            emitter.on(EventKind::Ready, move |_| order.lock().push(tag));
        }

        emitter.emit(EventKind::Ready, &Value::Null);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn once_fires_exactly_once() {
        let emitter = EventEmitter::new();
        let count = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&count);
        emitter.once(EventKind::Open, move |_| *counter.lock() += 1);

        emitter.emit(EventKind::Open, &Value::Null);
        emitter.emit(EventKind::Open, &Value::Null);
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn off_removes_only_the_named_listener() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let keep = Arc::clone(&hits);
        emitter.on(EventKind::Close, move |_| keep.lock().push("keep"));
        let drop_hits = Arc::clone(&hits);
        let removed = emitter.on(EventKind::Close, move |_| drop_hits.lock().push("drop"));

        emitter.off(EventKind::Close, removed);
        emitter.emit(EventKind::Close, &Value::Null);
        assert_eq!(*hits.lock(), vec!["keep"]);
    }

    #[test]
    fn payload_reaches_listeners() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Value::Null));
        let sink = Arc::clone(&seen);
        emitter.on(EventKind::Error, move |payload| {
            *sink.lock() = payload.clone();
        });

        emitter.emit(EventKind::Error, &json!({"code": "UNKNOWN"}));
        assert_eq!(seen.lock()["code"], "UNKNOWN");
    }

    #[test]
    fn panicking_listener_does_not_block_later_listeners() {
        let emitter = EventEmitter::new();
        let reached = Arc::new(Mutex::new(false));

        emitter.on(EventKind::Ready, |_| panic!("bad subscriber"));
        let flag = Arc::clone(&reached);
        emitter.on(EventKind::Ready, move |_| *flag.lock() = true);

        // The panic is re-raised after the loop, so the emit itself
        // unwinds - but only after every listener ran.
        let result = catch_unwind(AssertUnwindSafe(|| {
            emitter.emit(EventKind::Ready, &Value::Null);
        }));
        assert!(result.is_err());
        assert!(*reached.lock());
    }

    #[test]
    fn unknown_id_off_is_a_no_op() {
        let emitter = EventEmitter::new();
        let id = emitter.on(EventKind::Destroy, |_| {});
        emitter.off(EventKind::Ready, id);
        emitter.off(EventKind::Destroy, id);
        emitter.off(EventKind::Destroy, id);
    }
}
