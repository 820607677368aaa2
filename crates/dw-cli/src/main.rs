//! CLI entry point for dirwatch.
//!
//! This binary watches one or more directories and prints every change
//! until it is interrupted.
//!
//! # Usage
//!
//! ```bash
//! dirwatch [OPTIONS] <COMMAND>
//!
//! # Watch the current directory tree
//! dirwatch watch
//!
//! # Watch two roots, creations and deletions only, as JSON lines
//! dirwatch watch /srv/dic /srv/spool --events create,delete --format json
//!
//! # Print the effective configuration
//! dirwatch --config dirwatch.json config
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dw_core::{ChangeKind, Config};
use dw_watcher::{ChangeEvent, ChannelCallback, DirectoryWatcher};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watches directory trees and reports created, modified, and deleted entries.
#[derive(Parser)]
#[command(name = "dirwatch", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON configuration file.
    #[arg(short, long, global = true, env = "DIRWATCH_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Watch directories and print each change until interrupted.
    Watch(WatchArgs),

    /// Print the effective configuration as JSON.
    Config,
}

/// Arguments of the `watch` command.
#[derive(Args)]
struct WatchArgs {
    /// Directories to watch (overrides `watch.roots`).
    ///
    /// Defaults to the current directory when neither paths nor configured
    /// roots are given.
    paths: Vec<Utf8PathBuf>,

    /// Comma-separated change kinds to report (create, modify, delete).
    #[arg(short, long, value_delimiter = ',', env = "DIRWATCH_EVENTS")]
    events: Option<Vec<ChangeKind>>,

    /// Watch only the given directories, not their subdirectories.
    #[arg(long)]
    non_recursive: bool,

    /// Output format for change events.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Change event output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// `<kind> <path>` per line.
    Text,
    /// One JSON object per line.
    Json,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default. The
/// `notify` crate is kept at `warn`.
///
/// Logs go to stderr so that stdout carries only change events.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Builds the effective [`Config`]: file (if any), then command-line
/// overrides.
///
/// # Errors
///
/// Returns an error if the configuration file cannot be loaded or the
/// result does not validate.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Commands::Watch(args) = &cli.command {
        if !args.paths.is_empty() {
            config.watch.roots.clone_from(&args.paths);
        }
        if let Some(events) = &args.events {
            config.watch.events.clone_from(events);
        }
        if args.non_recursive {
            config.watch.recursive = false;
        }
        if config.watch.roots.is_empty() {
            config.watch.roots.push(Utf8PathBuf::from("."));
        }
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Watches the configured roots and prints events until a shutdown signal.
///
/// # Errors
///
/// Returns an error if the watcher cannot be created or stdout fails.
async fn run_watch(config: &Config, format: OutputFormat) -> color_eyre::Result<()> {
    let kinds = config.watch.event_kinds()?;
    let (callback, mut events) = ChannelCallback::new();
    let watcher = DirectoryWatcher::create(callback, kinds.iter())?;

    for root in &config.watch.roots {
        let registered = if config.watch.recursive {
            watcher.watch_directory_tree(root)
        } else {
            usize::from(watcher.watch_directory(root).is_some())
        };
        info!(root = %root, directories = registered, "Root registered");
    }

    if watcher.watched_count() == 0 {
        warn!("No directories are being watched");
    }
    info!(
        directories = watcher.watched_count(),
        kinds = %watcher.event_kinds(),
        "Watching for changes, press Ctrl-C to stop"
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let stdout = std::io::stdout();
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                let mut handle = stdout.lock();
                writeln!(handle, "{}", render_event(&event, format)?)?;
                handle.flush()?;
            }
        }
    }

    watcher.shutdown().await?;
    info!("Watcher stopped");
    Ok(())
}

/// Prints the effective configuration as pretty JSON.
fn run_config(config: &Config) -> color_eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", serde_json::to_string_pretty(config)?)?;
    Ok(())
}

/// Formats one change event for output.
fn render_event(event: &ChangeEvent, format: OutputFormat) -> color_eyre::Result<String> {
    match format {
        OutputFormat::Text => Ok(event.to_string()),
        OutputFormat::Json => serde_json::to_string(event)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize event: {}", e)),
    }
}

/// Resolves when the process receives Ctrl-C (or SIGTERM on Unix).
async fn shutdown_signal() -> color_eyre::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C, shutting down");
    }

    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Resolve configuration
    let config = build_config(&cli)?;

    // 5. Route to appropriate command
    match &cli.command {
        Commands::Watch(args) => run_watch(&config, args.format).await,
        Commands::Config => run_config(&config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("dirwatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_watch_defaults_to_current_directory() {
        let config = build_config(&parse(&["watch"])).unwrap();
        assert_eq!(config.watch.roots, vec![Utf8PathBuf::from(".")]);
        assert!(config.watch.recursive);
        assert_eq!(config.watch.events, ChangeKind::ALL.to_vec());
    }

    #[test]
    fn test_watch_overrides() {
        let cli = parse(&[
            "watch",
            "/srv/dic",
            "/srv/spool",
            "--events",
            "create,delete",
            "--non-recursive",
            "--format",
            "json",
        ]);
        let config = build_config(&cli).unwrap();

        assert_eq!(
            config.watch.roots,
            vec![Utf8PathBuf::from("/srv/dic"), Utf8PathBuf::from("/srv/spool")]
        );
        assert_eq!(
            config.watch.events,
            vec![ChangeKind::Create, ChangeKind::Delete]
        );
        assert!(!config.watch.recursive);
        match cli.command {
            Commands::Watch(args) => assert_eq!(args.format, OutputFormat::Json),
            Commands::Config => unreachable!(),
        }
    }

    #[test]
    fn test_unknown_event_kind_is_rejected() {
        let result = Cli::try_parse_from(["dirwatch", "watch", "--events", "rename"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_event() {
        let event = ChangeEvent::new(ChangeKind::Modify, "/srv/dic/words.txt");
        insta::assert_snapshot!(
            render_event(&event, OutputFormat::Text).unwrap(),
            @"modify /srv/dic/words.txt"
        );
        insta::assert_snapshot!(
            render_event(&event, OutputFormat::Json).unwrap(),
            @r#"{"kind":"modify","path":"/srv/dic/words.txt"}"#
        );
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = parse(&["--config", "/nonexistent/dirwatch.json", "config"]);
        assert!(build_config(&cli).is_err());
    }
}
