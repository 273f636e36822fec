//! `mosaic-msg`: send one message to a running mosaic (or any i3-ipc
//! compatible) daemon and print the reply.
//!
//! ```text
//! mosaic-msg [-s <socket>] [-t <type>] [-m] [payload...]
//! ```
//!
//! The socket defaults to `$SWAYSOCK`, then `$I3SOCK`.  With `-m` and
//! `-t subscribe`, events are printed until the daemon closes the
//! connection.

use mosaic::ipc::client::Client;
use mosaic::ipc::protocol::MessageType;
use log::{debug, error};
use std::path::PathBuf;

struct Args {
    socket: Option<PathBuf>,
    kind: MessageType,
    monitor: bool,
    payload: String,
}

fn parse_args() -> Result<Args, String> {
    let mut socket = None;
    let mut kind = MessageType::RunCommand;
    let mut monitor = false;
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-s" | "--socket" => {
                socket = Some(PathBuf::from(args.next().ok_or("-s requires a path")?));
            }
            "-t" | "--type" => {
                let name = args.next().ok_or("-t requires a message type")?;
                kind = MessageType::from_name(&name)
                    .ok_or_else(|| format!("unknown message type {:?}", name))?;
            }
            "-m" | "--monitor" => monitor = true,
            _ => words.push(arg),
        }
    }
    Ok(Args {
        socket,
        kind,
        monitor,
        payload: words.join(" "),
    })
}

fn socket_from_env() -> Option<PathBuf> {
    ["SWAYSOCK", "I3SOCK"]
        .iter()
        .find_map(|var| std::env::var_os(var))
        .map(PathBuf::from)
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("cannot format reply: {}", e),
    }
}

//  Main

fn main() {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("mosaic-msg: {}", e);
            eprintln!("usage: mosaic-msg [-s <socket>] [-t <type>] [-m] [payload...]");
            std::process::exit(2);
        }
    };
    let Some(socket) = args.socket.or_else(socket_from_env) else {
        eprintln!("mosaic-msg: no socket given and neither SWAYSOCK nor I3SOCK is set");
        std::process::exit(2);
    };
    debug!("connecting to {}", socket.display());

    let mut client = match Client::connect(&socket) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("mosaic-msg: {}", e);
            std::process::exit(1);
        }
    };

    let reply: serde_json::Value = match client.request(args.kind, &args.payload) {
        Ok(reply) => reply,
        Err(e) => {
            eprintln!("mosaic-msg: {}", e);
            std::process::exit(1);
        }
    };
    print_json(&reply);

    if args.kind == MessageType::RunCommand {
        let failed = reply
            .as_array()
            .is_some_and(|results| results.iter().any(|r| r["success"] == false));
        if failed {
            std::process::exit(2);
        }
    }

    if args.monitor && args.kind == MessageType::Subscribe {
        loop {
            match client.next_event() {
                Ok((_, body)) => print_json(&body),
                Err(e) => {
                    debug!("event stream ended: {}", e);
                    break;
                }
            }
        }
    }
}
