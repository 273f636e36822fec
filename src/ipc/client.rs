//! Blocking i3-ipc client, used by `mosaic-msg` and the end-to-end tests.

use crate::command::CommandResult;
use crate::daemon::{SuccessReply, VersionReply};
use crate::engine::{OutputInfo, WorkspaceInfo};
use crate::event::EventKind;
use crate::ipc::protocol::{
    event_kind, read_message, write_message, Message, MessageType, ProtocolError,
};
use crate::tree::NodeSnapshot;
use log::debug;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected frame type {0:#x}")]
    UnexpectedFrame(u32),
}

/// One connection to the daemon.
///
/// Events that arrive while waiting for a reply are kept and handed out by
/// [`next_event`](Self::next_event) later.
pub struct Client {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
    events: VecDeque<Message>,
}

impl Client {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| ClientError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            events: VecDeque::new(),
        })
    }

    /// Bound how long a read may block.  `None` waits forever.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.writer.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send one frame and wait for the reply of the same type.
    pub fn request_raw(&mut self, kind: u32, payload: &[u8]) -> Result<Message, ClientError> {
        write_message(&mut self.writer, &Message::new(kind, payload))?;
        loop {
            let msg = read_message(&mut self.reader)?;
            if msg.is_event() {
                self.events.push_back(msg);
            } else if msg.kind == kind {
                return Ok(msg);
            } else {
                return Err(ClientError::UnexpectedFrame(msg.kind));
            }
        }
    }

    pub fn request<T: DeserializeOwned>(
        &mut self,
        kind: MessageType,
        payload: &str,
    ) -> Result<T, ClientError> {
        let reply = self.request_raw(kind.code(), payload.as_bytes())?;
        Ok(reply.parse()?)
    }

    /// `RUN_COMMAND`.
    pub fn command(&mut self, text: &str) -> Result<Vec<CommandResult>, ClientError> {
        self.request(MessageType::RunCommand, text)
    }

    pub fn get_tree(&mut self) -> Result<NodeSnapshot, ClientError> {
        self.request(MessageType::GetTree, "")
    }

    pub fn get_workspaces(&mut self) -> Result<Vec<WorkspaceInfo>, ClientError> {
        self.request(MessageType::GetWorkspaces, "")
    }

    pub fn get_outputs(&mut self) -> Result<Vec<OutputInfo>, ClientError> {
        self.request(MessageType::GetOutputs, "")
    }

    pub fn get_version(&mut self) -> Result<VersionReply, ClientError> {
        self.request(MessageType::GetVersion, "")
    }

    pub fn subscribe(&mut self, kinds: &[EventKind]) -> Result<SuccessReply, ClientError> {
        let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
        let payload = serde_json::to_string(&names).map_err(ProtocolError::from)?;
        self.request(MessageType::Subscribe, &payload)
    }

    pub fn send_tick(&mut self, payload: &str) -> Result<SuccessReply, ClientError> {
        self.request(MessageType::SendTick, payload)
    }

    /// Block until the next event frame arrives.
    pub fn next_event(&mut self) -> Result<(EventKind, serde_json::Value), ClientError> {
        let msg = match self.events.pop_front() {
            Some(msg) => msg,
            None => read_message(&mut self.reader)?,
        };
        let kind = event_kind(msg.kind).ok_or(ClientError::UnexpectedFrame(msg.kind))?;
        debug!("received {:?} event", kind);
        Ok((kind, msg.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use crate::daemon::Daemon;
    use crate::engine::Engine;
    use crate::event::EventBus;
    use crate::ipc::listener::UnixSocketListener;
    use crate::traits::CommandSource;
    use crate::tree::{Layout, NodeType};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    static TEST_ID: AtomicU32 = AtomicU32::new(0);

    fn tmp_socket_path() -> PathBuf {
        let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
        let name = format!("mosaic-client-test-{}-{}.sock", std::process::id(), id);
        std::env::temp_dir().join(name)
    }

    /// Run a full daemon (listener + actor) on background threads.  Like
    /// `main`, the actor thread waits for the connection writers after
    /// `exit` and yields how many were still busy.
    fn spawn_daemon(outputs: &[OutputConfig]) -> (PathBuf, thread::JoinHandle<usize>) {
        let path = tmp_socket_path();
        let bus = Arc::new(EventBus::new());
        let mut listener = UnixSocketListener::new(&path).with_bus(bus.clone());
        listener.bind().unwrap();
        let writers = listener.writers();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = listener.run(tx);
        });
        let engine = Engine::new(outputs, Layout::SplitH);
        let handle = thread::spawn(move || {
            Daemon::new(engine, bus).run(rx).unwrap();
            writers.join(Duration::from_secs(5))
        });
        (path, handle)
    }

    fn client(path: &Path) -> Client {
        let c = Client::connect(path).unwrap();
        c.set_timeout(Some(Duration::from_secs(5))).unwrap();
        c
    }

    #[test]
    fn commands_and_queries() {
        let (path, _) = spawn_daemon(&[OutputConfig::default()]);
        let mut c = client(&path);

        let tree = c.get_tree().unwrap();
        assert_eq!(tree.node_type, NodeType::Root);
        assert_eq!(tree.nodes[0].nodes[0].nodes.len(), 0);

        let results = c.command("workspace 4").unwrap();
        assert_eq!(results, vec![CommandResult::ok()]);
        let workspaces = c.get_workspaces().unwrap();
        let focused: Vec<i32> = workspaces
            .iter()
            .filter(|w| w.focused)
            .map(|w| w.num)
            .collect();
        assert_eq!(focused, vec![4]);

        let outputs = c.get_outputs().unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].current_workspace.as_deref(), Some("4"));
        assert_eq!(c.get_version().unwrap().major.to_string(), env!("CARGO_PKG_VERSION_MAJOR"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn tick_reaches_other_connections() {
        let (path, _) = spawn_daemon(&[OutputConfig::default()]);
        let mut sub = client(&path);
        let mut sender = client(&path);

        assert!(sub.subscribe(&[EventKind::Tick]).unwrap().success);
        let (kind, first) = sub.next_event().unwrap();
        assert_eq!(kind, EventKind::Tick);
        assert_eq!(first, serde_json::json!({"first": true, "payload": ""}));

        assert!(sender.send_tick("ping").unwrap().success);
        let (kind, tick) = sub.next_event().unwrap();
        assert_eq!(kind, EventKind::Tick);
        assert_eq!(tick, serde_json::json!({"first": false, "payload": "ping"}));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn exit_delivers_shutdown_then_closes() {
        let (path, daemon) = spawn_daemon(&[OutputConfig::default()]);
        let mut sub = client(&path);
        let mut cmd = client(&path);
        assert!(sub.subscribe(&[EventKind::Shutdown]).unwrap().success);

        assert_eq!(cmd.command("exit").unwrap(), vec![CommandResult::ok()]);
        let (kind, body) = sub.next_event().unwrap();
        assert_eq!(kind, EventKind::Shutdown);
        assert_eq!(body["change"], "exit");
        assert!(matches!(
            sub.next_event(),
            Err(ClientError::Protocol(ProtocolError::Closed))
        ));
        assert_eq!(daemon.join().unwrap(), 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn every_shutdown_subscriber_is_flushed_before_exit() {
        let (path, daemon) = spawn_daemon(&[OutputConfig::default()]);
        let mut subs: Vec<Client> = (0..12).map(|_| client(&path)).collect();
        for sub in &mut subs {
            assert!(sub.subscribe(&[EventKind::Shutdown]).unwrap().success);
        }
        let mut cmd = client(&path);
        assert_eq!(cmd.command("exit").unwrap(), vec![CommandResult::ok()]);

        // All writers have finished by the time the daemon side returns, so
        // everything below is already sitting in the socket buffers.
        assert_eq!(daemon.join().unwrap(), 0);
        for sub in &mut subs {
            let (kind, body) = sub.next_event().unwrap();
            assert_eq!(kind, EventKind::Shutdown);
            assert_eq!(body["change"], "exit");
            assert!(matches!(
                sub.next_event(),
                Err(ClientError::Protocol(ProtocolError::Closed))
            ));
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn events_are_buffered_behind_replies() {
        let outputs = [OutputConfig::default()];
        let (path, _) = spawn_daemon(&outputs);
        let mut c = client(&path);
        assert!(c.subscribe(&[EventKind::Workspace]).unwrap().success);
        c.command("workspace 2").unwrap();
        c.get_tree().unwrap();
        let (kind, init) = c.next_event().unwrap();
        assert_eq!(kind, EventKind::Workspace);
        assert_eq!(init["change"], "init");
        let (_, focus) = c.next_event().unwrap();
        assert_eq!(focus["change"], "focus");
        assert_eq!(focus["current"]["num"], 2);
        assert_eq!(focus["old"]["num"], 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn move_to_new_workspace_over_the_wire() {
        let (path, _) = spawn_daemon(&[OutputConfig::default()]);
        let mut c = client(&path);
        c.command("workspace 1").unwrap();
        // Windows are not created through IPC; an empty workspace has
        // nothing to move.
        let results = c.command("move window to workspace 3").unwrap();
        assert!(!results[0].success);
        assert!(c.get_workspaces().unwrap().iter().all(|w| w.num != 3));
        let _ = std::fs::remove_file(&path);
    }
}
