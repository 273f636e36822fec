//! **mosaic**: a tiling window manager core driven over i3-compatible IPC.
//!
//! Outputs hold workspaces, workspaces hold containers and windows, and the
//! whole tree is manipulated through i3's command language (`workspace
//! next`, `move window to workspace 3`, `layout toggle split`, …) sent over
//! a Unix socket.  Clients can subscribe to workspace, window, tick, and
//! shutdown events on the same socket.
//!
//! # Architecture
//!
//! * [`tree`]: the container tree, its split ratios and focus stacks.
//! * [`command`]: parser for the command language.
//! * [`engine`]: applies commands to the tree atomically.
//! * [`event`]: the publish/subscribe [`EventBus`](event::EventBus).
//! * [`daemon`]: the single actor that owns the engine and serializes
//!   every request.
//! * [`ipc`]: i3-ipc framing, the socket listener, and a blocking client.
//!
//! The daemon is decoupled from its transports by the two traits in
//! [`traits`]: [`CommandSource`](traits::CommandSource) feeds it requests
//! and [`EventSink`](traits::EventSink) carries events back out.

pub mod command;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod event;
pub mod ipc;
pub mod traits;
pub mod tree;
