//! Publish/subscribe event bus.
//!
//! Every client connection registers an [`EventSink`] when it connects and
//! may later subscribe to one or more [`EventKind`]s.  [`EventBus::publish`]
//! hands each event to the sinks subscribed to its kind, in subscription
//! order, exactly once per subscriber.  Sinks only enqueue; the blocking
//! wait for the next event happens on the connection's own thread, never
//! under the bus lock.
//!
//! Publishing a [`ShutdownEvent`] is terminal: it is delivered to the
//! shutdown subscribers, every registered sink is then closed, and the bus
//! rejects all further traffic.

use crate::traits::EventSink;
use crate::tree::NodeSnapshot;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Identifies a client connection for subscription bookkeeping.
pub type ConnectionId = u64;

/// The kinds of events a connection can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Workspace,
    Window,
    Tick,
    Shutdown,
}

/// i3/sway event names that are accepted in a subscription but never fire.
const IGNORED_EVENT_NAMES: &[&str] = &[
    "output",
    "mode",
    "barconfig_update",
    "binding",
    "bar_state_update",
    "input",
];

/// A subscription named an event this bus does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEvent(pub String);

impl EventKind {
    pub fn from_name(name: &str) -> Option<EventKind> {
        match name {
            "workspace" => Some(EventKind::Workspace),
            "window" => Some(EventKind::Window),
            "tick" => Some(EventKind::Tick),
            "shutdown" => Some(EventKind::Shutdown),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Workspace => "workspace",
            EventKind::Window => "window",
            EventKind::Tick => "tick",
            EventKind::Shutdown => "shutdown",
        }
    }

    /// Parse the names of a `SUBSCRIBE` payload.
    ///
    /// Names of i3 events this bus never emits are accepted and dropped;
    /// anything else unknown rejects the whole subscription.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<EventKind>, UnknownEvent> {
        let mut kinds = Vec::new();
        for name in names {
            let name = name.as_ref();
            match EventKind::from_name(name) {
                Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Some(_) => {}
                None if IGNORED_EVENT_NAMES.contains(&name) => {}
                None => return Err(UnknownEvent(name.to_string())),
            }
        }
        Ok(kinds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceChange {
    Init,
    Focus,
    Empty,
    Move,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEvent {
    pub change: WorkspaceChange,
    pub current: Option<NodeSnapshot>,
    pub old: Option<NodeSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowChange {
    New,
    Close,
    Focus,
    Move,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEvent {
    pub change: WindowChange,
    pub container: NodeSnapshot,
}

/// An application-defined synchronization signal.
///
/// `first` is true only for the synthetic tick a connection receives right
/// after subscribing, so late subscribers can tell "just subscribed" from a
/// real tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvent {
    pub first: bool,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownEvent {
    pub change: String,
}

impl ShutdownEvent {
    pub fn exit() -> Self {
        Self { change: "exit".into() }
    }
}

/// An event published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Workspace(WorkspaceEvent),
    Window(WindowEvent),
    Tick(TickEvent),
    Shutdown(ShutdownEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Workspace(_) => EventKind::Workspace,
            Event::Window(_) => EventKind::Window,
            Event::Tick(_) => EventKind::Tick,
            Event::Shutdown(_) => EventKind::Shutdown,
        }
    }

    /// JSON body of the event frame.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Event::Workspace(e) => serde_json::to_vec(e),
            Event::Window(e) => serde_json::to_vec(e),
            Event::Tick(e) => serde_json::to_vec(e),
            Event::Shutdown(e) => serde_json::to_vec(e),
        }
    }
}

/// The bus refused a publish or subscribe because it has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event bus is shut down")]
pub struct BusClosed;

struct Registration {
    conn: ConnectionId,
    sink: Box<dyn EventSink>,
    kinds: Vec<EventKind>,
}

#[derive(Default)]
struct Registry {
    /// Ordered by first subscription; connections that never subscribed
    /// sit at the back in registration order.
    connections: Vec<Registration>,
    closed: bool,
}

/// Publish/subscribe broadcaster.  See the [module documentation](self).
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a shutdown has been published.
    pub fn is_closed(&self) -> bool {
        self.registry().closed
    }

    /// Record the sink for a newly accepted connection.
    ///
    /// After shutdown the sink is closed immediately and `BusClosed` is
    /// returned.
    pub fn register(&self, conn: ConnectionId, sink: Box<dyn EventSink>) -> Result<(), BusClosed> {
        let mut reg = self.registry();
        if reg.closed {
            sink.close();
            return Err(BusClosed);
        }
        reg.connections.retain(|r| r.conn != conn);
        reg.connections.push(Registration {
            conn,
            sink,
            kinds: Vec::new(),
        });
        Ok(())
    }

    /// Add `kinds` to the interests of `conn`.
    ///
    /// Subscribing to [`EventKind::Tick`] immediately delivers one tick with
    /// `first = true` to this connection only.  Returns `Ok(false)` when the
    /// connection was never registered.
    pub fn subscribe(&self, conn: ConnectionId, kinds: &[EventKind]) -> Result<bool, BusClosed> {
        let mut reg = self.registry();
        if reg.closed {
            return Err(BusClosed);
        }
        let Some(pos) = reg.connections.iter().position(|r| r.conn == conn) else {
            return Ok(false);
        };

        // Move first-time subscribers behind the earlier ones so delivery
        // follows subscription order.
        let mut entry = reg.connections.remove(pos);
        let first_time = entry.kinds.is_empty();
        for kind in kinds {
            if !entry.kinds.contains(kind) {
                entry.kinds.push(*kind);
            }
        }
        if kinds.contains(&EventKind::Tick) {
            entry.sink.deliver(Event::Tick(TickEvent {
                first: true,
                payload: String::new(),
            }));
        }
        let insert_at = if first_time {
            reg.connections.iter().take_while(|r| !r.kinds.is_empty()).count()
        } else {
            pos
        };
        debug!("connection {} subscribed to {:?}", conn, entry.kinds);
        reg.connections.insert(insert_at, entry);
        Ok(true)
    }

    /// Forget `conn` and all its subscriptions.
    pub fn unregister(&self, conn: ConnectionId) {
        self.registry().connections.retain(|r| r.conn != conn);
    }

    /// Deliver `event` to every subscriber of its kind.
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, event: Event) -> Result<usize, BusClosed> {
        let mut reg = self.registry();
        if reg.closed {
            return Err(BusClosed);
        }
        let kind = event.kind();
        let mut delivered = 0;
        reg.connections.retain(|r| {
            if !r.kinds.contains(&kind) {
                return true;
            }
            let alive = r.sink.deliver(event.clone());
            if alive {
                delivered += 1;
            } else {
                debug!("dropping dead subscriber {}", r.conn);
            }
            alive
        });

        if kind == EventKind::Shutdown {
            info!("shutdown published to {} subscriber(s), closing bus", delivered);
            for r in reg.connections.drain(..) {
                r.sink.close();
            }
            reg.closed = true;
        }
        Ok(delivered)
    }

    /// Number of connections subscribed to `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry()
            .connections
            .iter()
            .filter(|r| r.kinds.contains(&kind))
            .count()
    }
}
