//! Deployhook - Entry Point
//!
//! Receives GitHub webhooks and deploys the pushed build with docker-compose.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::Context;
use deployhook::app::options::AppOptions;
use deployhook::app::run::run;
use deployhook::deploy::runner::ProcessRunner;
use deployhook::filesys::file::File;
use deployhook::logs::{init_logging, LogOptions};
use deployhook::notify::telegram::TelegramNotifier;
use deployhook::storage::settings::Settings;
use deployhook::utils::{run_diagnostic, version_info};

use tracing::{error, info};

/// Settings file used when `--config` is not given
const DEFAULT_SETTINGS_PATH: &str = "/etc/deployhook/settings.json";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Failed to render version: {}", e),
        }
        return;
    }

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    let settings_path = cli_args
        .get("config")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = Settings::load(&File::new(&settings_path)).await;

    // Run diagnostics
    if cli_args.contains_key("check") {
        let passed = run_diagnostic(&settings).await;
        std::process::exit(if passed { 0 } else { 1 });
    }

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to load settings from {}: {}", settings_path, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = start(settings).await {
        error!("Failed to run deployhook: {:#}", e);
        eprintln!("Failed to run deployhook: {:#}", e);
        std::process::exit(1);
    }
}

async fn start(settings: Settings) -> anyhow::Result<()> {
    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        ..Default::default()
    };
    let _log_guard = init_logging(log_options).context("failed to initialize logging")?;

    let notifier = TelegramNotifier::from_settings(&settings)
        .context("failed to create the Telegram notifier")?;
    let runner = ProcessRunner::new(settings.deploy.command_timeout());
    let options = AppOptions::from_settings(&settings);

    info!("Running deployhook with options: {:?}", options);
    run(
        Arc::new(settings),
        options,
        Arc::new(notifier),
        Arc::new(runner),
        await_shutdown_signal(),
    )
    .await
    .context("deployhook stopped with an error")
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, waiting for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
