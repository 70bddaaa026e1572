//! # CLI Module
//!
//! Command-line front end for the preview server.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Serve a directory until interrupted:
//!
//! ```bash
//! livepreview serve _site --port 8080 --watch
//! ```
//!
//! Options:
//! - `[DIR]` - Site directory (default: `.`)
//! - `--port <PORT>` - First port to try; `0` picks any free port (default: 8080)
//! - `--retries <N>` - How many following ports to try when the port is taken
//! - `--watch` - Reload browsers when files below `DIR` change
//! - `--inject-base-url` - Publish the base URL in `LIVEPREVIEW_SERVER_BASEURL`
//! - `--no-live-reload` - Serve files untouched
//! - `--config <FILE>` - TOML configuration file
//! - `--log-level <LEVEL>` - trace, debug, info, warn or error
//!
//! Settings are layered: defaults, then the config file, then `LIVEPREVIEW_*`
//! environment variables, then command-line flags.
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use livepreview::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! run_cli(Cli::parse())?;
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{build_config, run_cli, Cli, Commands, ServeArgs};
