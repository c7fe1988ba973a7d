//! Sync lifecycle event bus
//!
//! Two delivery paths share one [`EventBus::emit`] call:
//!
//! - **Handlers** registered with [`EventBus::on`] run synchronously, in
//!   registration order, on the emitting task. A handler that fails or
//!   panics is logged and skipped; the remaining handlers still run.
//! - **Subscribers** obtained from [`EventBus::subscribe`] receive every
//!   event over a `tokio::sync::broadcast` channel. Slow subscribers lag
//!   and lose the oldest events rather than blocking the engine.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use ledgersync_core::domain::{SyncEvent, SyncEventKind};
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::SyncError;

/// Capacity of the broadcast channel
const BROADCAST_CAPACITY: usize = 256;

/// A synchronous event handler
pub type EventHandler = Arc<dyn Fn(&SyncEvent) -> anyhow::Result<()> + Send + Sync>;

/// Token returned by [`EventBus::on`], used to unregister the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Registry of lifecycle event handlers
pub struct EventBus {
    handlers: RwLock<HashMap<SyncEventKind, Vec<(HandlerId, EventHandler)>>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            sender,
        }
    }

    /// Registers `handler` for events of `kind`
    pub fn on<F>(&self, kind: SyncEventKind, handler: F) -> HandlerId
    where
        F: Fn(&SyncEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        trace!(%kind, handler = id.0, "Registered event handler");
        id
    }

    /// Unregisters a handler; returns false if it was not registered for `kind`
    pub fn off(&self, kind: SyncEventKind, id: HandlerId) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        before != list.len()
    }

    /// Returns a receiver for every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Delivers `event` to its handlers and to all subscribers
    ///
    /// Returns the handler failures, which have already been logged.
    pub fn emit(&self, event: &SyncEvent) -> Vec<SyncError> {
        let kind = event.kind();

        // Snapshot so handlers may call on/off without deadlocking.
        let snapshot: Vec<(HandlerId, EventHandler)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut failures = Vec::new();
        for (id, handler) in snapshot {
            let message = match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
            };
            let err = SyncError::EventHandlerFailed {
                event: kind,
                message,
            };
            warn!(handler = id.0, error = %err, "Event handler failed");
            failures.push(err);
        }

        // No subscribers is not an error.
        let _ = self.sender.send(event.clone());
        failures
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> EventHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        let make = move |name: &'static str| -> EventHandler {
            let log = log2.clone();
            Arc::new(move |_: &SyncEvent| {
                log.lock().unwrap().push(name);
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_once_in_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        for name in ["first", "second", "third"] {
            let h = make(name);
            bus.on(SyncEventKind::SyncStart, move |e| h(e));
        }

        let failures = bus.emit(&SyncEvent::SyncStart);
        assert!(failures.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_only_matching_kind_is_invoked() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let h = make("online");
        bus.on(SyncEventKind::Online, move |e| h(e));

        bus.emit(&SyncEvent::Offline);
        assert!(log.lock().unwrap().is_empty());
        bus.emit(&SyncEvent::Online);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_failing_and_panicking_handlers_are_isolated() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        bus.on(SyncEventKind::SyncError, |_| anyhow::bail!("status bar unavailable"));
        bus.on(SyncEventKind::SyncError, |_| panic!("boom"));
        let h = make("survivor");
        bus.on(SyncEventKind::SyncError, move |e| h(e));

        let failures = bus.emit(&SyncEvent::SyncError {
            message: "queue unreadable".into(),
        });

        assert_eq!(failures.len(), 2);
        assert!(failures[0].to_string().contains("status bar unavailable"));
        assert!(failures[1].to_string().contains("boom"));
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn test_off_removes_handler() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let h = make("removed");
        let id = bus.on(SyncEventKind::Online, move |e| h(e));

        assert!(bus.off(SyncEventKind::Online, id));
        assert!(!bus.off(SyncEventKind::Online, id));
        assert!(!bus.off(SyncEventKind::Offline, id));

        bus.emit(&SyncEvent::Online);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handler_may_register_during_emit() {
        let bus = Arc::new(EventBus::new());
        let inner = bus.clone();
        let (log, make) = recorder();
        bus.on(SyncEventKind::Online, move |_| {
            let h = make("late");
            inner.on(SyncEventKind::Offline, move |e| h(e));
            Ok(())
        });

        bus.emit(&SyncEvent::Online);
        assert!(log.lock().unwrap().is_empty());
        bus.emit(&SyncEvent::Offline);
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(&SyncEvent::SyncStart);
        bus.emit(&SyncEvent::SyncComplete { results: vec![] });

        assert_eq!(rx.recv().await.unwrap(), SyncEvent::SyncStart);
        assert_eq!(
            rx.recv().await.unwrap().kind(),
            SyncEventKind::SyncComplete
        );
    }
}
