use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Token returned by `on`, used to deregister with `off`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Named-event callbacks
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<(HandlerId, Handler)>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: &str, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.handlers
            .write()
            .unwrap()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    pub fn off(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap();
        let mut removed = false;
        handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(handler_id, _)| *handler_id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    pub fn off_all(&self) {
        self.handlers.write().unwrap().clear();
    }

    /// Call every handler registered for `event`; returns how many ran.
    ///
    /// A panicking handler is logged and skipped, the rest still run.
    pub fn dispatch(&self, event: &str, data: &Value) -> usize {
        // Handlers run outside the lock so they may call on/off themselves
        let matched: Vec<(HandlerId, Handler)> = match self.handlers.read().unwrap().get(event) {
            Some(list) => list
                .iter()
                .map(|(id, handler)| (*id, Arc::clone(handler)))
                .collect(),
            None => return 0,
        };
        for (id, handler) in &matched {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(data))) {
                warn!(
                    event = %event,
                    handler_id = id.0,
                    panic = %panic_message(panic.as_ref()),
                    "Event handler panicked"
                );
            }
        }
        matched.len()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
