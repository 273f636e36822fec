//! Core traits that decouple the daemon from its transports.
//!
//! The [`Daemon`](crate::daemon::Daemon) only ever sees [`Request`]s arriving
//! on an [`mpsc`] channel, and the [`EventBus`](crate::event::EventBus) only
//! ever hands events to an [`EventSink`].  Neither knows whether the other
//! end is a Unix socket, an in-process test harness, or something else.

use crate::daemon::Request;
use crate::event::Event;
use std::sync::mpsc;

/// A source of [`Request`]s.
///
/// Implementations listen on some transport and forward every parsed
/// request into the provided [`mpsc::Sender`].
///
/// # Contract
///
/// * [`run`](CommandSource::run) **blocks** until the source is exhausted,
///   the sink is closed, or an unrecoverable error occurs.
/// * Each received request must be sent through `sink` exactly once.
/// * Implementations must be [`Send`] so they can run on a dedicated thread.
pub trait CommandSource: Send {
    /// The error type produced by this source.
    type Error: std::error::Error + Send + 'static;

    /// Start listening and forward every incoming [`Request`] into `sink`.
    fn run(&mut self, sink: mpsc::Sender<Request>) -> Result<(), Self::Error>;
}

/// Where the event bus delivers events for one connection.
///
/// Delivery must not block: implementations enqueue and return, so a slow
/// subscriber never stalls the publisher.
pub trait EventSink: Send {
    /// Enqueue `event`.  Returns `false` once the receiving side is gone,
    /// after which the bus drops this sink.
    fn deliver(&self, event: Event) -> bool;

    /// Release whoever is waiting on this sink.  Called once, on shutdown.
    fn close(&self);
}

impl EventSink for mpsc::Sender<Event> {
    fn deliver(&self, event: Event) -> bool {
        self.send(event).is_ok()
    }

    // Waiters are released when the bus drops the sender.
    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TickEvent;

    /// A test double that emits a fixed sequence of requests.
    struct MockSource {
        requests: Vec<Request>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("mock error")]
    struct MockError;

    impl CommandSource for MockSource {
        type Error = MockError;

        fn run(&mut self, sink: mpsc::Sender<Request>) -> Result<(), MockError> {
            for req in self.requests.drain(..) {
                let _ = sink.send(req);
            }
            Ok(())
        }
    }

    #[test]
    fn mock_source_emits_requests() {
        let mut src = MockSource {
            requests: vec![
                Request::Disconnected { conn: 1 },
                Request::CloseWindow { id: crate::tree::NodeId(9) },
            ],
        };
        let (tx, rx) = mpsc::channel();
        src.run(tx).unwrap();
        let reqs: Vec<Request> = rx.try_iter().collect();
        assert_eq!(reqs.len(), 2);
        assert!(matches!(reqs[0], Request::Disconnected { conn: 1 }));
    }

    #[test]
    fn channel_sink_reports_disconnect() {
        let (tx, rx) = mpsc::channel::<Event>();
        let tick = || {
            Event::Tick(TickEvent {
                first: false,
                payload: "x".into(),
            })
        };
        assert!(tx.deliver(tick()));
        drop(rx);
        assert!(!tx.deliver(tick()));
    }
}
