//! The single-writer actor that owns the [`Engine`].
//!
//! Listener threads turn socket traffic into [`Request`]s and send them down
//! one [`mpsc`] channel.  [`Daemon::run`] handles them strictly in arrival
//! order, so every query sees the tree either fully before or fully after
//! any command.  Replies and events go back through each connection's
//! outbound queue, which keeps them in the order the daemon produced them.

use crate::command::CommandResult;
use crate::engine::Engine;
use crate::event::{ConnectionId, Event, EventBus, EventKind, ShutdownEvent, TickEvent};
use crate::ipc::protocol::{Message, MessageType, Outbound};
use crate::tree::{InvariantViolation, NodeId};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

/// Work handed to the daemon.
#[derive(Debug)]
pub enum Request {
    /// A client connected; `outbound` feeds its writer thread.
    Connected {
        conn: ConnectionId,
        outbound: mpsc::Sender<Outbound>,
    },
    /// A framed IPC message.  The reply goes to `reply`.
    Message {
        conn: ConnectionId,
        message: Message,
        reply: mpsc::Sender<Outbound>,
    },
    Disconnected {
        conn: ConnectionId,
    },
    /// Map a new window next to the focused one.
    OpenWindow {
        app_id: String,
        reply: Option<mpsc::Sender<NodeId>>,
    },
    CloseWindow {
        id: NodeId,
    },
}

/// Whether the loop should keep going after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Exit,
}

/// Fatal daemon errors.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("tree invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Reply to `SUBSCRIBE` and `SEND_TICK`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SuccessReply {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Reply to `GET_VERSION`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionReply {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub human_readable: String,
    pub loaded_config_file_name: String,
}

impl VersionReply {
    fn current(config: Option<&PathBuf>) -> Self {
        let part = |s: &str| -> u32 { s.parse().unwrap_or(0) };
        Self {
            major: part(env!("CARGO_PKG_VERSION_MAJOR")),
            minor: part(env!("CARGO_PKG_VERSION_MINOR")),
            patch: part(env!("CARGO_PKG_VERSION_PATCH")),
            human_readable: format!("mosaic {}", env!("CARGO_PKG_VERSION")),
            loaded_config_file_name: config.map(|p| p.display().to_string()).unwrap_or_default(),
        }
    }
}

pub struct Daemon {
    engine: Engine,
    bus: Arc<EventBus>,
    config_path: Option<PathBuf>,
}

impl Daemon {
    pub fn new(engine: Engine, bus: Arc<EventBus>) -> Self {
        Self {
            engine,
            bus,
            config_path: None,
        }
    }

    /// Record the config file reported by `GET_VERSION`.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Handle requests until `exit` or until every sender is gone.
    pub fn run(&mut self, requests: mpsc::Receiver<Request>) -> Result<(), DaemonError> {
        info!("mosaic running");
        for req in requests {
            if self.handle(req)? == Control::Exit {
                info!("exit command received, stopping");
                return Ok(());
            }
        }
        info!("all request sources closed, exiting");
        Ok(())
    }

    pub fn handle(&mut self, req: Request) -> Result<Control, DaemonError> {
        match req {
            Request::Connected { conn, outbound } => {
                debug!("connection {} registered", conn);
                if self.bus.register(conn, Box::new(outbound.clone())).is_err() {
                    let _ = outbound.send(Outbound::Close);
                }
                Ok(Control::Continue)
            }
            Request::Disconnected { conn } => {
                debug!("connection {} gone", conn);
                self.bus.unregister(conn);
                Ok(Control::Continue)
            }
            Request::Message { conn, message, reply } => self.handle_message(conn, message, &reply),
            Request::OpenWindow { app_id, reply } => {
                match self.engine.open_window(&app_id) {
                    Ok(id) => {
                        if let Some(reply) = reply {
                            let _ = reply.send(id);
                        }
                    }
                    Err(e) => warn!("cannot open window {}: {}", app_id, e),
                }
                self.flush_events();
                self.engine.tree().check_invariants()?;
                Ok(Control::Continue)
            }
            Request::CloseWindow { id } => {
                if let Err(e) = self.engine.close_window(id) {
                    warn!("cannot close window {}: {}", id, e);
                }
                self.flush_events();
                self.engine.tree().check_invariants()?;
                Ok(Control::Continue)
            }
        }
    }

    fn handle_message(
        &mut self,
        conn: ConnectionId,
        message: Message,
        reply: &mpsc::Sender<Outbound>,
    ) -> Result<Control, DaemonError> {
        if self.engine.reap_empty_workspaces() > 0 {
            self.flush_events();
            self.engine.tree().check_invariants()?;
        }

        let Some(kind) = MessageType::from_code(message.kind) else {
            debug!("connection {} sent unsupported type {}", conn, message.kind);
            let error = format!("unsupported message type {}", message.kind);
            send_reply(reply, message.kind, &SuccessReply::failed(error));
            return Ok(Control::Continue);
        };
        debug!("connection {}: {:?}", conn, kind);

        match kind {
            MessageType::RunCommand => {
                let text = String::from_utf8_lossy(&message.payload);
                let results: Vec<CommandResult> = self.engine.execute(&text);
                send_reply(reply, message.kind, &results);
                self.flush_events();
                self.engine.tree().check_invariants()?;
                if self.engine.exit_requested() {
                    self.shutdown();
                    return Ok(Control::Exit);
                }
            }
            MessageType::GetTree => send_reply(reply, message.kind, &self.engine.tree().snapshot()),
            MessageType::GetWorkspaces => {
                send_reply(reply, message.kind, &self.engine.workspace_infos())
            }
            MessageType::GetOutputs => send_reply(reply, message.kind, &self.engine.output_infos()),
            MessageType::GetVersion => send_reply(
                reply,
                message.kind,
                &VersionReply::current(self.config_path.as_ref()),
            ),
            MessageType::Subscribe => {
                let kinds = message
                    .parse::<Vec<String>>()
                    .map_err(|e| e.to_string())
                    .and_then(|names| EventKind::parse_list(&names).map_err(|e| e.to_string()));
                match kinds {
                    Ok(kinds) => {
                        // The ack must reach the client before the first tick.
                        send_reply(reply, message.kind, &SuccessReply::ok());
                        match self.bus.subscribe(conn, &kinds) {
                            Ok(true) => info!("connection {} subscribed to {:?}", conn, kinds),
                            Ok(false) => warn!("subscribe from unregistered connection {}", conn),
                            Err(e) => debug!("subscribe after shutdown: {}", e),
                        }
                    }
                    Err(e) => {
                        debug!("bad subscribe payload from {}: {}", conn, e);
                        send_reply(reply, message.kind, &SuccessReply::failed(e));
                    }
                }
            }
            MessageType::SendTick => {
                let payload = String::from_utf8_lossy(&message.payload).into_owned();
                self.publish(Event::Tick(TickEvent { first: false, payload }));
                send_reply(reply, message.kind, &SuccessReply::ok());
            }
        }
        Ok(Control::Continue)
    }

    fn flush_events(&mut self) {
        for event in self.engine.drain_events() {
            self.publish(event);
        }
    }

    fn publish(&self, event: Event) {
        let kind = event.kind();
        match self.bus.publish(event) {
            Ok(n) => debug!("{:?} event delivered to {} subscriber(s)", kind, n),
            Err(e) => debug!("dropping {:?} event: {}", kind, e),
        }
    }

    /// Notify shutdown subscribers and release every connection.
    fn shutdown(&self) {
        self.publish(Event::Shutdown(ShutdownEvent::exit()));
    }
}

fn send_reply<T: Serialize>(reply: &mpsc::Sender<Outbound>, kind: u32, value: &T) {
    match Message::json(kind, value) {
        Ok(msg) => {
            if reply.send(Outbound::Reply(msg)).is_err() {
                debug!("reply dropped, connection already closed");
            }
        }
        Err(e) => error!("failed to encode reply: {}", e),
    }
}
