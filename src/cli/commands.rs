use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::ServerConfig;
use crate::logging::{init_logging_with_config, LogConfig, TracingLogger};
use crate::server::{DevServer, ServerOptions};

/// Command-line interface for livepreview
#[derive(Parser, Debug)]
#[command(name = "livepreview", version)]
#[command(about = "Development preview server with live reload", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve a directory with live reload
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Site directory to serve
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// First port to try (0 for any free port)
    #[arg(short, long, default_value_t = 8080, env = "LIVEPREVIEW_PORT")]
    pub port: u16,

    /// Ports to try after the first one is taken
    #[arg(long)]
    pub retries: Option<u32>,

    /// Reload browsers when files change
    #[arg(short, long, default_value_t = false)]
    pub watch: bool,

    /// Publish the base URL into the environment while serving
    #[arg(long, default_value_t = false)]
    pub inject_base_url: bool,

    /// Do not inject the reload client or answer its endpoints
    #[arg(long, default_value_t = false)]
    pub no_live_reload: bool,

    /// Host name used in the advertised base URL
    #[arg(long)]
    pub host: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Layer defaults, the config file, the environment and the flags in `args`.
pub fn build_config(args: &ServeArgs) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    config.apply_env_overrides();

    if let Some(retries) = args.retries {
        config.port_reassignment_retry_count = retries;
    }
    if args.watch {
        config.watch = true;
    }
    if args.inject_base_url {
        config.inject_base_url_into_environment = true;
    }
    if args.no_live_reload {
        config.live_reload = false;
    }
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    Ok(config)
}

/// Run a parsed command line to completion.
pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve(args) => serve(&args),
    }
}

fn serve(args: &ServeArgs) -> Result<()> {
    let mut log_config = LogConfig::from_env();
    if let Some(level) = &args.log_level {
        log_config.log_level = level.clone();
    }
    init_logging_with_config(&log_config)?;

    let config = build_config(args)?;
    if !args.dir.is_dir() {
        anyhow::bail!("{} is not a directory", args.dir.display());
    }

    let name = args
        .dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "site".to_string());
    let options = ServerOptions::new()
        .with_config(config)
        .with_logger(Arc::new(TracingLogger::new(name.clone())));
    let server = DevServer::new(name, &args.dir, options);

    server.serve(args.port)?;
    let port = server
        .port()
        .with_context(|| format!("could not start serving {}", args.dir.display()))?;
    info!(port, root = %args.dir.display(), "serving; press Ctrl-C to stop");

    wait_for_shutdown()?;
    server.close();
    Ok(())
}

#[cfg(unix)]
fn wait_for_shutdown() -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "shutting down");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown() -> Result<()> {
    loop {
        std::thread::park();
    }
}
