//! IPC over a Unix socket, using the i3 wire format.
//!
//! External tools (i3/sway IPC libraries, `mosaic-msg`, test harnesses) can
//! connect to the socket, run commands, query the tree, and subscribe to
//! events.

pub mod client;
pub mod listener;
pub mod protocol;
