//! Application configuration and command-line options.
//!
//! The configuration is loaded from a JSON file, by default
//! `$XDG_CONFIG_HOME/mosaic/config.json`.  Every field is optional, so `{}`
//! is a valid file.
//!
//! # Example
//!
//! ```json
//! {
//!   "outputs": [
//!     { "name": "HDMI-A-1", "width": 2560, "height": 1440 },
//!     { "name": "DP-1", "width": 1920, "height": 1080, "x": 2560 }
//!   ],
//!   "default_layout": "tabbed"
//! }
//! ```

use crate::tree::{Layout, Rect};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Outputs created at startup.  Empty means one 1920×1080 output.
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,

    /// Layout of new workspaces, and the target of `layout default`.
    #[serde(default)]
    pub default_layout: Layout,
}

/// One output and its place in the global coordinate space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            name: "VIRTUAL-1".into(),
            width: 1920,
            height: 1080,
            x: 0,
            y: 0,
        }
    }
}

impl OutputConfig {
    pub fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigError(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }
}

/// Error from loading a configuration file or parsing the command line.
#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(String);

/// Parse a `WIDTHxHEIGHT` geometry such as `800x600`.
pub fn parse_geometry(text: &str) -> Result<(u32, u32), ConfigError> {
    let bad = || ConfigError(format!("invalid geometry {:?}, expected WIDTHxHEIGHT", text));
    let (w, h) = text.split_once(['x', 'X']).ok_or_else(bad)?;
    let width: u32 = w.trim().parse().map_err(|_| bad())?;
    let height: u32 = h.trim().parse().map_err(|_| bad())?;
    if width == 0 || height == 0 {
        return Err(bad());
    }
    Ok((width, height))
}

/// Options of the `mosaic` daemon command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchOptions {
    /// One entry per `--virtual-output WxH`.
    pub virtual_outputs: Vec<(u32, u32)>,
    pub no_config: bool,
    pub config: Option<PathBuf>,
    pub socket: Option<PathBuf>,
}

impl LaunchOptions {
    /// Parse arguments, not including the program name.
    pub fn parse<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut opts = Self::default();
        let mut args = args.into_iter().map(Into::into).peekable();
        while let Some(arg) = args.next() {
            if arg == "--no-config" {
                // Takes an optional value: `--no-config`, `--no-config 1`.
                let value = args.next_if(|next| !next.starts_with("--"));
                opts.no_config = !matches!(value.as_deref(), Some("0" | "false" | "no"));
                continue;
            }
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| ConfigError(format!("{} requires a value", flag)))
            };
            match arg.as_str() {
                "--virtual-output" => {
                    let geometry = value("--virtual-output")?;
                    opts.virtual_outputs.push(parse_geometry(&geometry)?);
                }
                "--config" => opts.config = Some(PathBuf::from(value("--config")?)),
                "--socket" => opts.socket = Some(PathBuf::from(value("--socket")?)),
                // Display backend selection belongs to the compositor.
                "--platform-display-libs" => {
                    value("--platform-display-libs")?;
                }
                other => return Err(ConfigError(format!("unknown argument {:?}", other))),
            }
        }
        Ok(opts)
    }

    /// The outputs to create: the `--virtual-output`s laid out left to
    /// right when any were given, the configured ones otherwise.
    pub fn outputs(&self, config: &Config) -> Vec<OutputConfig> {
        if self.virtual_outputs.is_empty() {
            return config.outputs.clone();
        }
        let mut x = 0i32;
        self.virtual_outputs
            .iter()
            .enumerate()
            .map(|(i, (width, height))| {
                let out = OutputConfig {
                    name: format!("VIRTUAL-{}", i + 1),
                    width: *width,
                    height: *height,
                    x,
                    y: 0,
                };
                x = x.saturating_add(i32::try_from(*width).unwrap_or(i32::MAX));
                out
            })
            .collect()
    }
}
