//! Unix-socket [`CommandSource`] implementation.
//!
//! Binds a Unix stream socket and serves any number of clients at once.
//! Every accepted connection gets two threads:
//!
//! * a reader that parses i3-ipc frames and forwards them to the daemon as
//!   [`Request::Message`]s, and
//! * a writer that drains the connection's [`Outbound`] queue (replies and
//!   events, in the order the daemon produced them).
//!
//! A malformed frame closes only the connection that sent it.  Writer threads
//! are tracked in [`Writers`] so the process can let them flush before it
//! exits.

use crate::daemon::Request;
use crate::event::{ConnectionId, Event, EventBus};
use crate::ipc::protocol::{read_message, write_message, Message, Outbound, ProtocolError};
use crate::traits::CommandSource;
use log::{debug, error, info, warn};
use std::io::BufReader;
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// A [`CommandSource`] that listens on a Unix stream socket for i3-ipc
/// frames.
pub struct UnixSocketListener {
    path: PathBuf,
    listener: Option<UnixListener>,
    bus: Option<Arc<EventBus>>,
    writers: Writers,
}

/// Shared handles of the per-connection writer threads.
#[derive(Clone, Default)]
pub struct Writers(Arc<Mutex<Vec<JoinHandle<()>>>>);

impl Writers {
    fn push(&self, handle: JoinHandle<()>) {
        let mut handles = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait up to `timeout` for every writer to drain its queue and close its
    /// socket.  Returns the number of writers still running afterwards.
    pub fn join(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let handles = {
            let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        while Instant::now() < deadline && handles.iter().any(|h| !h.is_finished()) {
            thread::sleep(Duration::from_millis(5));
        }
        let (done, running): (Vec<_>, Vec<_>) = handles.into_iter().partition(|h| h.is_finished());
        for handle in done {
            if handle.join().is_err() {
                error!("writer thread panicked");
            }
        }
        if !running.is_empty() {
            warn!("{} writer(s) still busy after {:?}", running.len(), timeout);
        }
        running.len()
    }
}

/// Errors produced by the Unix socket listener.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("cannot bind {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl UnixSocketListener {
    /// Create a listener for `path`.  Nothing is bound until
    /// [`bind`](Self::bind) or [`run`](CommandSource::run).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            listener: None,
            bus: None,
            writers: Writers::default(),
        }
    }

    /// Stop accepting connections once `bus` has shut down.
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Handles of the writer threads, shared with the running listener.
    pub fn writers(&self) -> Writers {
        self.writers.clone()
    }

    /// The filesystem path of the socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bind the socket now, replacing a stale socket file.  Clients may
    /// connect as soon as this returns; they are served once
    /// [`run`](CommandSource::run) starts.
    pub fn bind(&mut self) -> Result<(), ListenerError> {
        if self.listener.is_some() {
            return Ok(());
        }
        // Remove stale socket if present.
        let _ = std::fs::remove_file(&self.path);
        let listener = UnixListener::bind(&self.path).map_err(|source| ListenerError::Bind {
            path: self.path.clone(),
            source,
        })?;
        info!("listening on {}", self.path.display());
        self.listener = Some(listener);
        Ok(())
    }

    fn bus_closed(&self) -> bool {
        self.bus.as_ref().is_some_and(|bus| bus.is_closed())
    }
}

impl CommandSource for UnixSocketListener {
    type Error = ListenerError;

    /// Accept connections until the daemon goes away or the bus shuts down.
    ///
    /// This method **blocks**.  Run it on a dedicated thread.
    fn run(&mut self, sink: mpsc::Sender<Request>) -> Result<(), Self::Error> {
        self.bind()?;
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };

        for stream in listener.incoming() {
            if self.bus_closed() {
                info!("event bus shut down, no longer accepting connections");
                return Ok(());
            }
            match stream {
                Ok(stream) => {
                    let conn = NEXT_CONNECTION.fetch_add(1, Ordering::SeqCst);
                    debug!("client {} connected", conn);
                    match serve(conn, stream, sink.clone(), &self.writers) {
                        Ok(true) => {}
                        Ok(false) => {
                            info!("sink closed, shutting down");
                            return Ok(());
                        }
                        Err(e) => error!("cannot serve client {}: {}", conn, e),
                    }
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
        Ok(())
    }
}

/// Register `conn` with the daemon and start its reader and writer.
/// Returns `false` when the daemon is gone.
fn serve(
    conn: ConnectionId,
    stream: UnixStream,
    sink: mpsc::Sender<Request>,
    writers: &Writers,
) -> std::io::Result<bool> {
    let writer = stream.try_clone()?;
    let (out_tx, out_rx) = mpsc::channel();
    if sink
        .send(Request::Connected {
            conn,
            outbound: out_tx.clone(),
        })
        .is_err()
    {
        return Ok(false);
    }
    writers.push(thread::spawn(move || write_loop(conn, writer, out_rx)));
    thread::spawn(move || read_loop(conn, stream, out_tx, sink));
    Ok(true)
}

fn read_loop(
    conn: ConnectionId,
    stream: UnixStream,
    outbound: mpsc::Sender<Outbound>,
    sink: mpsc::Sender<Request>,
) {
    let mut reader = BufReader::new(&stream);
    loop {
        match read_message(&mut reader) {
            Ok(message) => {
                debug!(
                    "client {} sent type {} ({} bytes)",
                    conn,
                    message.kind,
                    message.payload.len()
                );
                let req = Request::Message {
                    conn,
                    message,
                    reply: outbound.clone(),
                };
                if sink.send(req).is_err() {
                    break;
                }
            }
            Err(ProtocolError::Closed) => {
                debug!("client {} disconnected", conn);
                break;
            }
            Err(e) => {
                warn!("closing client {}: {}", conn, e);
                let _ = outbound.send(Outbound::Close);
                break;
            }
        }
    }
    let _ = sink.send(Request::Disconnected { conn });
}

/// Write queued frames until the queue closes, a close marker arrives, or a
/// shutdown event has been written.
fn write_loop(conn: ConnectionId, mut stream: UnixStream, outbound: mpsc::Receiver<Outbound>) {
    for item in outbound {
        let (frame, last) = match item {
            Outbound::Reply(msg) => (Ok(msg), false),
            Outbound::Event(event) => {
                let last = matches!(event, Event::Shutdown(_));
                (Message::event(&event), last)
            }
            Outbound::Close => break,
        };
        match frame {
            Ok(msg) => {
                if let Err(e) = write_message(&mut stream, &msg) {
                    debug!("write to client {} failed: {}", conn, e);
                    break;
                }
            }
            Err(e) => error!("failed to encode event for client {}: {}", conn, e),
        }
        if last {
            break;
        }
    }
    debug!("closing client {}", conn);
    let _ = stream.shutdown(Shutdown::Both);
}

//  Tests
