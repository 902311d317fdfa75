//! Redeploy - Entry Point
//!
//! Replaces the files of a running service with a new build, keeping a
//! backup and rolling back when the deployment fails.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use redeploy::deploy::{
    Deployer, DeployerConfig, DeploymentOptions, DeploymentProgress, DeploymentResult, Stage,
};
use redeploy::logs::{init_logging, LogOptions};
use redeploy::storage::layout::StorageLayout;
use redeploy::storage::settings::Settings;
use redeploy::utils::version_info;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let mut cli_args: HashMap<String, String> = HashMap::new();
    for arg in env::args().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --dry-run
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Unable to render version info: {}", e),
        }
        return ExitCode::SUCCESS;
    }

    match run(&cli_args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli_args: &HashMap<String, String>) -> anyhow::Result<bool> {
    let layout = StorageLayout::default();

    // Retrieve the settings file
    let settings_path = cli_args
        .get("settings")
        .map(PathBuf::from)
        .unwrap_or_else(|| layout.settings_file().path().to_path_buf());
    let mut settings = Settings::load(&settings_path)
        .await
        .with_context(|| format!("Unable to read settings file {}", settings_path.display()))?;
    settings
        .apply_env_overrides()
        .context("Invalid environment override")?;

    // Initialize logging; the guard flushes the log file when dropped
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: cli_args.get("log-dir").map(PathBuf::from),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = build_options(&settings, cli_args)?;
    let config = DeployerConfig {
        audit_log_dir: settings
            .audit_log_dir
            .clone()
            .unwrap_or_else(|| layout.logs_dir().path().to_path_buf()),
        settle_delay: Duration::from_secs(settings.settle_delay_secs),
    };
    let deployer = Deployer::with_defaults(config, settings.max_concurrency);

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            await_shutdown_signal().await;
            warn!("Cancelling deployment");
            cancel.cancel();
        }
    });

    info!(
        "Deploying {} from {} to {}",
        options.service_name,
        options.source_path.display(),
        options.destination_path.display()
    );
    let result = deployer.deploy(&options, &print_progress, &cancel).await;
    signal_task.abort();

    print_summary(&result);
    Ok(result.success)
}

/// Settings first, then per-invocation flags
fn build_options(
    settings: &Settings,
    cli_args: &HashMap<String, String>,
) -> anyhow::Result<DeploymentOptions> {
    let mut options = DeploymentOptions::from_settings(settings);

    if let Some(service) = cli_args.get("service") {
        options.service_name = service.clone();
    }
    if let Some(source) = cli_args.get("source") {
        options.source_path = PathBuf::from(source);
    }
    if let Some(dest) = cli_args.get("dest") {
        options.destination_path = PathBuf::from(dest);
    }
    if let Some(host) = cli_args.get("host") {
        options = options.with_remote_host(host.clone());
    }
    if let Some(tag) = cli_args.get("tag") {
        options = options.with_version_tag(tag.clone());
    }

    let backup = options.enable_backup && !flag(cli_args, "no-backup");
    let verify = options.verify_after_copy && !flag(cli_args, "no-verify");
    let rollback = options.enable_rollback && !flag(cli_args, "no-rollback");
    options = options
        .with_dry_run(flag(cli_args, "dry-run"))
        .with_backup(backup)
        .with_verify(verify)
        .with_rollback(rollback);

    if options.service_name.is_empty() {
        bail!("No service given, pass --service=<name> or set service_name in the settings file");
    }
    Ok(options)
}

fn flag(cli_args: &HashMap<String, String>, name: &str) -> bool {
    cli_args
        .get(name)
        .map(|v| v != "false")
        .unwrap_or(false)
}

fn print_progress(progress: DeploymentProgress) {
    let stage = format!("[{}]", progress.stage);
    let stage = match progress.stage {
        Stage::Failed => stage.red(),
        Stage::Completed => stage.green(),
        _ => stage.cyan(),
    };
    println!("{} {:>3}% {}", stage, progress.percent, progress.message);
}

fn print_summary(result: &DeploymentResult) {
    println!();
    if result.success {
        println!(
            "{} {} files in {:.1}s",
            "Deployment succeeded:".green().bold(),
            result.files_copied,
            result.duration.as_secs_f64()
        );
    } else {
        let message = result.error_message.as_deref().unwrap_or("unknown error");
        println!("{} {}", "Deployment failed:".red().bold(), message);
        error!("Deployment failed at stage {}: {}", result.final_stage, message);
        println!("Rollback: {:?}", result.rollback);
        if result.rollback.is_unrecoverable() {
            println!(
                "{}",
                "The service needs manual recovery, see the audit log".red().bold()
            );
        }
    }
    if let Some(backup) = &result.backup_path {
        println!("Backup: {}", backup.display());
    }
    println!("Service running: {}", result.service_running);
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received");
                    }
                    Ok(()) = tokio::signal::ctrl_c() => {
                        info!("Ctrl+C received");
                    }
                }
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
                info!("Ctrl+C received");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received");
    }
}
