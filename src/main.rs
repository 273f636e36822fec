//! Entry point for the **mosaic** daemon.
//!
//! Binds the IPC socket, announces its path on stdout, runs the socket
//! [`CommandSource`](mosaic::traits::CommandSource) on a background thread,
//! and processes requests on the main thread until `exit`.

use mosaic::config::{Config, LaunchOptions};
use mosaic::daemon::Daemon;
use mosaic::engine::Engine;
use mosaic::event::EventBus;
use mosaic::ipc::listener::UnixSocketListener;
use mosaic::traits::CommandSource;
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// How long queued replies and shutdown events may take to flush on exit.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Default socket path: `$XDG_RUNTIME_DIR/mosaic-ipc.<pid>.sock`.
fn default_socket_path() -> PathBuf {
    let runtime = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(runtime).join(format!("mosaic-ipc.{}.sock", std::process::id()))
}

/// Resolve the config directory (`$XDG_CONFIG_HOME/mosaic`).
fn config_dir() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        format!("{}/.config", home)
    });
    PathBuf::from(base).join("mosaic")
}

/// Load the config named on the command line, or the default one, falling
/// back to compiled-in defaults.  Returns the path actually loaded.
fn load_config(opts: &LaunchOptions) -> (Config, Option<PathBuf>) {
    if opts.no_config {
        info!("--no-config given, using defaults");
        return (Config::default(), None);
    }
    let path = opts.config.clone().unwrap_or_else(|| config_dir().join("config.json"));
    match Config::load(&path) {
        Ok(cfg) => {
            info!("loaded config from {}", path.display());
            (cfg, Some(path))
        }
        Err(e) => {
            info!("no config file ({}), using defaults", e);
            (Config::default(), None)
        }
    }
}

//  Main

fn main() {
    env_logger::init();

    let opts = match LaunchOptions::parse(std::env::args().skip(1)) {
        Ok(opts) => opts,
        Err(e) => {
            error!("{}", e);
            eprintln!(
                "usage: mosaic [--virtual-output WxH]... [--no-config [1]] \
                 [--config <path>] [--socket <path>]"
            );
            std::process::exit(2);
        }
    };
    let (config, config_path) = load_config(&opts);
    let outputs = opts.outputs(&config);

    let socket = opts.socket.clone().unwrap_or_else(default_socket_path);
    let bus = Arc::new(EventBus::new());
    let mut listener = UnixSocketListener::new(&socket).with_bus(bus.clone());
    if let Err(e) = listener.bind() {
        error!("{}", e);
        std::process::exit(1);
    }

    // Clients discover the socket from this line.
    println!("Listening to IPC socket on path: {}", socket.display());
    let _ = std::io::stdout().flush();

    let writers = listener.writers();
    let (req_tx, req_rx) = mpsc::channel();
    std::thread::spawn(move || {
        if let Err(e) = listener.run(req_tx) {
            error!("socket listener error: {}", e);
        }
    });

    let engine = Engine::new(&outputs, config.default_layout);
    let mut daemon = Daemon::new(engine, bus).with_config_path(config_path);
    let result = daemon.run(req_rx);
    // Connections were closed by the shutdown; let their writers finish.
    writers.join(FLUSH_TIMEOUT);
    let _ = std::fs::remove_file(&socket);

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
