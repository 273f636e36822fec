//! i3-compatible message framing.
//!
//! # Wire format
//!
//! ```text
//! +--------+----------------+----------------+-----------------+
//! | i3-ipc | length: u32 LE | type: u32 LE   | payload (length) |
//! +--------+----------------+----------------+-----------------+
//! ```
//!
//! Replies carry the type of the request they answer.  Events set the high
//! bit of the type field.

use crate::event::{Event, EventKind};
use crate::traits::EventSink;
use std::io::{self, Read, Write};
use std::sync::mpsc;

pub const MAGIC: &[u8; 6] = b"i3-ipc";
pub const HEADER_LEN: usize = MAGIC.len() + 8;
/// Largest payload accepted from a peer.
pub const MAX_PAYLOAD: u32 = 16 * 1024 * 1024;
/// High bit set on the type field of event frames.
pub const EVENT_MASK: u32 = 1 << 31;

/// Request types understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    RunCommand,
    GetWorkspaces,
    Subscribe,
    GetOutputs,
    GetTree,
    GetVersion,
    SendTick,
}

impl MessageType {
    pub fn code(self) -> u32 {
        match self {
            MessageType::RunCommand => 0,
            MessageType::GetWorkspaces => 1,
            MessageType::Subscribe => 2,
            MessageType::GetOutputs => 3,
            MessageType::GetTree => 4,
            MessageType::GetVersion => 7,
            MessageType::SendTick => 10,
        }
    }

    pub fn from_code(code: u32) -> Option<MessageType> {
        Some(match code {
            0 => MessageType::RunCommand,
            1 => MessageType::GetWorkspaces,
            2 => MessageType::Subscribe,
            3 => MessageType::GetOutputs,
            4 => MessageType::GetTree,
            7 => MessageType::GetVersion,
            10 => MessageType::SendTick,
            _ => return None,
        })
    }

    /// Name used by `mosaic-msg -t`.
    pub fn from_name(name: &str) -> Option<MessageType> {
        Some(match name {
            "command" | "run_command" => MessageType::RunCommand,
            "get_workspaces" => MessageType::GetWorkspaces,
            "subscribe" => MessageType::Subscribe,
            "get_outputs" => MessageType::GetOutputs,
            "get_tree" => MessageType::GetTree,
            "get_version" => MessageType::GetVersion,
            "send_tick" => MessageType::SendTick,
            _ => return None,
        })
    }
}

/// Type code of event frames of `kind`.
pub fn event_code(kind: EventKind) -> u32 {
    EVENT_MASK
        | match kind {
            EventKind::Workspace => 0,
            EventKind::Window => 3,
            EventKind::Shutdown => 6,
            EventKind::Tick => 7,
        }
}

/// Inverse of [`event_code`].
pub fn event_kind(code: u32) -> Option<EventKind> {
    if code & EVENT_MASK == 0 {
        return None;
    }
    match code & !EVENT_MASK {
        0 => Some(EventKind::Workspace),
        3 => Some(EventKind::Window),
        6 => Some(EventKind::Shutdown),
        7 => Some(EventKind::Tick),
        _ => None,
    }
}

/// Errors produced while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The peer closed the connection between frames.
    #[error("connection closed")]
    Closed,
    #[error("bad magic {0:?}")]
    BadMagic([u8; 6]),
    #[error("payload of {0} bytes exceeds the limit")]
    TooLarge(u32),
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One frame: a type code and its raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: u32,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A reply frame carrying `value` as JSON.
    pub fn json<T: serde::Serialize>(kind: u32, value: &T) -> Result<Self, ProtocolError> {
        Ok(Self::new(kind, serde_json::to_vec(value)?))
    }

    /// Encode `event` as an event frame.
    pub fn event(event: &Event) -> Result<Self, ProtocolError> {
        Ok(Self::new(event_code(event.kind()), event.to_json()?))
    }

    pub fn is_event(&self) -> bool {
        self.kind & EVENT_MASK != 0
    }

    pub fn text(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload).map_err(|_| ProtocolError::NotUtf8)
    }

    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Read one frame.  A clean EOF before the first header byte is
/// [`ProtocolError::Closed`]; EOF anywhere else is an I/O error.
pub fn read_message(reader: &mut impl Read) -> Result<Message, ProtocolError> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Err(ProtocolError::Closed),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let mut magic = [0u8; 6];
    magic.copy_from_slice(&header[..6]);
    if &magic != MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }
    let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
    let kind = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
    if len > MAX_PAYLOAD {
        return Err(ProtocolError::TooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(Message { kind, payload })
}

/// Write one frame and flush.
pub fn write_message(writer: &mut impl Write, message: &Message) -> Result<(), ProtocolError> {
    let len = u32::try_from(message.payload.len())
        .ok()
        .filter(|l| *l <= MAX_PAYLOAD)
        .ok_or(ProtocolError::TooLarge(u32::MAX))?;
    let mut frame = Vec::with_capacity(HEADER_LEN + message.payload.len());
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&message.kind.to_le_bytes());
    frame.extend_from_slice(&message.payload);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// What a connection's writer thread sends next.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Reply(Message),
    Event(Event),
    /// Shut the socket down and stop.
    Close,
}

impl EventSink for mpsc::Sender<Outbound> {
    fn deliver(&self, event: Event) -> bool {
        self.send(Outbound::Event(event)).is_ok()
    }

    fn close(&self) {
        let _ = self.send(Outbound::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TickEvent;
    use std::io::Cursor;

    fn frame(magic: &[u8], len: u32, kind: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = magic.to_vec();
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&kind.to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn header_layout_matches_i3() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Message::new(0, "workspace 2")).unwrap();
        assert_eq!(&buf[..6], b"i3-ipc");
        assert_eq!(&buf[6..10], &11u32.to_le_bytes());
        assert_eq!(&buf[10..14], &0u32.to_le_bytes());
        assert_eq!(&buf[14..], b"workspace 2");
    }

    #[test]
    fn reads_consecutive_frames() {
        let mut buf = frame(MAGIC, 4, 4, b"null");
        buf.extend(frame(MAGIC, 0, 10, b""));
        let mut cursor = Cursor::new(buf);
        let first = read_message(&mut cursor).unwrap();
        assert_eq!((first.kind, first.payload.as_slice()), (4, &b"null"[..]));
        let second = read_message(&mut cursor).unwrap();
        assert_eq!(second, Message::new(10, Vec::<u8>::new()));
        assert!(matches!(read_message(&mut cursor), Err(ProtocolError::Closed)));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut cursor = Cursor::new(frame(b"i4-ipc", 0, 0, b""));
        assert!(matches!(
            read_message(&mut cursor),
            Err(ProtocolError::BadMagic(m)) if &m == b"i4-ipc"
        ));
    }

    #[test]
    fn rejects_oversized_length_without_reading_it() {
        let mut cursor = Cursor::new(frame(MAGIC, MAX_PAYLOAD + 1, 0, b""));
        assert!(matches!(read_message(&mut cursor), Err(ProtocolError::TooLarge(_))));
    }

    #[test]
    fn truncated_frames_are_io_errors() {
        let mut cursor = Cursor::new(frame(MAGIC, 10, 0, b"abc"));
        assert!(matches!(read_message(&mut cursor), Err(ProtocolError::Io(_))));
        let mut cursor = Cursor::new(b"i3-i".to_vec());
        assert!(matches!(read_message(&mut cursor), Err(ProtocolError::Io(_))));
    }

    #[test]
    fn event_codes_set_the_high_bit() {
        assert_eq!(event_code(EventKind::Workspace), 0x8000_0000);
        assert_eq!(event_code(EventKind::Window), 0x8000_0003);
        assert_eq!(event_code(EventKind::Shutdown), 0x8000_0006);
        assert_eq!(event_code(EventKind::Tick), 0x8000_0007);
        assert_eq!(event_kind(0x8000_0007), Some(EventKind::Tick));
        assert_eq!(event_kind(7), None);

        let tick = Event::Tick(TickEvent {
            first: true,
            payload: String::new(),
        });
        let msg = Message::event(&tick).unwrap();
        assert!(msg.is_event());
        let body: serde_json::Value = msg.parse().unwrap();
        assert_eq!(body, serde_json::json!({"first": true, "payload": ""}));
    }

    #[test]
    fn message_types_round_trip_codes() {
        for code in [0, 1, 2, 3, 4, 7, 10] {
            assert_eq!(MessageType::from_code(code).unwrap().code(), code);
        }
        assert_eq!(MessageType::from_code(5), None);
        assert_eq!(MessageType::from_name("command"), Some(MessageType::RunCommand));
        assert_eq!(MessageType::from_name("get_bar_config"), None);
    }

    #[test]
    fn outbound_sink_closes_with_a_close_marker() {
        let (tx, rx) = mpsc::channel::<Outbound>();
        assert!(tx.deliver(Event::Tick(TickEvent {
            first: false,
            payload: "p".into(),
        })));
        tx.close();
        let items: Vec<Outbound> = rx.try_iter().collect();
        assert!(matches!(items.as_slice(), [Outbound::Event(_), Outbound::Close]));
    }
}
