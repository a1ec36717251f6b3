use std::{
    any::Any,
    collections::HashMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::deck::Card;

/// Payload of a `deal` event. `total - index` is the number of cards left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealPayload {
    pub card: Card,
    pub index: usize,
    pub total: usize,
}

impl DealPayload {
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.index)
    }
}

/// A listener panicked while handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerError {
    pub event: EventKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DealerEvent {
    Deal(DealPayload),
    Shuffle,
    Pause,
    Resume,
    Complete,
    RewindFinished,
    Error(ListenerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Deal,
    Shuffle,
    Pause,
    Resume,
    Complete,
    RewindFinished,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Deal,
        EventKind::Shuffle,
        EventKind::Pause,
        EventKind::Resume,
        EventKind::Complete,
        EventKind::RewindFinished,
        EventKind::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Deal => "deal",
            EventKind::Shuffle => "shuffle",
            EventKind::Pause => "pause",
            EventKind::Resume => "resume",
            EventKind::Complete => "complete",
            EventKind::RewindFinished => "rewind-finished",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl DealerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DealerEvent::Deal(_) => EventKind::Deal,
            DealerEvent::Shuffle => EventKind::Shuffle,
            DealerEvent::Pause => EventKind::Pause,
            DealerEvent::Resume => EventKind::Resume,
            DealerEvent::Complete => EventKind::Complete,
            DealerEvent::RewindFinished => EventKind::RewindFinished,
            DealerEvent::Error(_) => EventKind::Error,
        }
    }
}

pub type Handler = Arc<dyn Fn(&DealerEvent) + Send + Sync>;

/// Name → handlers registry with synchronous, in-order delivery.
///
/// Each handler runs inside its own panic boundary. A panicking handler does
/// not stop delivery to the others; the failure is re-published on the
/// `error` channel instead.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&DealerEvent) + Send + Sync + 'static,
    {
        self.handlers()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn emit(&self, event: DealerEvent) {
        let kind = event.kind();
        // Snapshot so handlers may register or emit re-entrantly.
        let handlers = self.handlers().get(&kind).cloned().unwrap_or_default();

        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if let Err(payload) = outcome {
                let error = ListenerError {
                    event: kind,
                    message: panic_message(payload.as_ref()),
                };
                if kind == EventKind::Error {
                    warn!(message = %error.message, "error listener panicked");
                } else {
                    warn!(event = %kind, message = %error.message, "listener panicked");
                    self.emit(DealerEvent::Error(error));
                }
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.handlers().get(&kind).map_or(0, Vec::len)
    }

    /// Drops every registration at once.
    pub fn clear(&self) {
        self.handlers().clear();
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Handler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .handlers()
            .iter()
            .map(|(kind, handlers)| (*kind, handlers.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "listener panicked".to_string()
    }
}
