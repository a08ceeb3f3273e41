//! nexus-scan - Ticket check-in console for fest hosts
//!
//! Verifies attendee tickets against the Nexus backend. Without a camera
//! backend the console runs in manual-entry mode: type a ticket number (or
//! `t <number>`), then `allow`, `deny` or `dismiss`.

use anyhow::Result;
use clap::Parser;
use nexus_common::config::{
    default_config_path, load_toml_config_or_default, RootFolderInitializer, RootFolderResolver,
};
use nexus_common::EventBus;
use nexus_scan::api::HttpScanApi;
use nexus_scan::auth::{resolve_credential, TOKEN_ENV};
use nexus_scan::config::{resolve_fest_id, ScannerSettings};
use nexus_scan::console::{parse_line, render_event};
use nexus_scan::{CheckInController, OperatorCommand, ScanError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const TOOL_NAME: &str = "nexus-scan";

#[derive(Parser, Debug)]
#[command(name = "nexus-scan", version, about = "Ticket check-in console for fest hosts")]
struct Args {
    /// Fest identifier
    #[arg(long, env = "NEXUS_FEST")]
    fest: Option<String>,

    /// Scanner page URL carrying a `fest` query parameter
    #[arg(long)]
    page_url: Option<String>,

    /// Backend API base URL
    #[arg(long, env = "NEXUS_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Host bearer token
    #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,

    /// Root folder for session files
    #[arg(long, env = "NEXUS_ROOT")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path(TOOL_NAME));
    let toml_config = load_toml_config_or_default(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)),
        )
        .init();

    info!(
        "Starting Nexus Scan (nexus-scan) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(TOOL_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&toml_config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;
    info!("Root folder: {}", initializer.root().display());

    let fest_id = resolve_fest_id(args.fest.as_deref(), args.page_url.as_deref())
        .map_err(redirect)?;
    let token = resolve_credential(args.token.as_deref(), &initializer.credential_path())
        .map_err(redirect)?;

    let api_base_url = args
        .api_base_url
        .clone()
        .unwrap_or_else(|| toml_config.api_base_url().to_string());
    info!("API base URL: {}", api_base_url);

    let api = HttpScanApi::new(api_base_url, token)?;
    let settings = ScannerSettings::from_toml(&toml_config.scanner);
    let events = EventBus::new(100);

    let printer = tokio::spawn(print_events(events.subscribe()));

    let mut controller = CheckInController::new(fest_id, Arc::new(api), settings, events)
        .with_stats_cache_file(initializer.session_cache_path());
    controller.start();

    let (commands_tx, commands_rx) = mpsc::channel(16);
    tokio::spawn(read_console(commands_tx));

    let outcome = controller.run(commands_rx).await;
    printer.abort();
    outcome.map_err(redirect)?;

    info!("nexus-scan stopped");
    Ok(())
}

/// Log where a fail-closed precondition sends the operator
fn redirect(err: ScanError) -> ScanError {
    match err.redirect_target() {
        Some(target) => error!("{}; redirecting to {}", err, target),
        None => error!("{}", err),
    }
    err
}

async fn read_console(commands: mpsc::Sender<OperatorCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(command) = parse_line(&line) else {
                    continue;
                };
                let quit = command == OperatorCommand::Shutdown;
                if commands.send(command).await.is_err() || quit {
                    break;
                }
            }
            Ok(None) => {
                let _ = commands.send(OperatorCommand::Shutdown).await;
                break;
            }
            Err(e) => {
                warn!("Console read failed: {}", e);
                let _ = commands.send(OperatorCommand::Shutdown).await;
                break;
            }
        }
    }
}

async fn print_events(mut rx: broadcast::Receiver<nexus_common::NexusEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => println!("{}", render_event(&event)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Console fell behind; {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
