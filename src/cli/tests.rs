//! Unit tests for CLI commands

use crate::cli::{build_config, Cli, Commands};
use clap::Parser;
use std::io::Write;

fn serve_args(argv: &[&str]) -> crate::cli::ServeArgs {
    let cli = Cli::try_parse_from(argv).unwrap();
    match cli.command {
        Commands::Serve(args) => args,
    }
}

#[test]
fn test_serve_defaults() {
    let args = serve_args(&["livepreview", "serve"]);
    assert_eq!(args.dir.to_string_lossy(), ".");
    assert!(!args.watch);
    assert!(!args.inject_base_url);
    assert!(args.retries.is_none());
}

#[test]
fn test_serve_with_flags() {
    let args = serve_args(&[
        "livepreview",
        "serve",
        "_site",
        "--port",
        "4000",
        "--retries",
        "3",
        "--watch",
        "--inject-base-url",
        "--no-live-reload",
        "--host",
        "preview.local",
    ]);
    assert_eq!(args.dir.to_string_lossy(), "_site");
    assert_eq!(args.port, 4000);

    let config = build_config(&args).unwrap();
    assert_eq!(config.port_reassignment_retry_count, 3);
    assert!(config.watch);
    assert!(config.inject_base_url_into_environment);
    assert!(!config.live_reload);
    assert_eq!(config.base_url(4000), "http://preview.local:4000/");
}

#[test]
fn test_flags_override_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "port_reassignment_retry_count = 20\nindex_file_names = [\"index.htm\"]"
    )
    .unwrap();
    let path = file.path().to_string_lossy().into_owned();

    let from_file = build_config(&serve_args(&["livepreview", "serve", "--config", &path])).unwrap();
    assert_eq!(from_file.port_reassignment_retry_count, 20);
    assert_eq!(from_file.index_file_names, vec!["index.htm".to_string()]);

    let overridden = build_config(&serve_args(&[
        "livepreview",
        "serve",
        "--config",
        &path,
        "--retries",
        "2",
    ]))
    .unwrap();
    assert_eq!(overridden.port_reassignment_retry_count, 2);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let args = serve_args(&["livepreview", "serve", "--config", "/no/such/livepreview.toml"]);
    assert!(build_config(&args).is_err());
}

#[test]
fn test_unknown_subcommand_rejected() {
    assert!(Cli::try_parse_from(["livepreview", "generate"]).is_err());
}
