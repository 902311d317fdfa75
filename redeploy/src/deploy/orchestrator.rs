//! The deployment workflow: stop, back up, copy, verify, start, and roll
//! back on failure.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::backup::naming::backup_root_for;
use crate::backup::{BackupManager, BackupStore};
use crate::deploy::audit::AuditLog;
use crate::deploy::options::DeploymentOptions;
use crate::deploy::result::{
    copy_percent, DeploymentResult, ProgressReporter, ProgressSink, RollbackOutcome,
};
use crate::deploy::retry::retry;
use crate::deploy::stage::{Stage, StageMachine};
use crate::deploy::target::resolve_host;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::service::{ServiceController, ServiceStatus, SystemdController};
use crate::storage::layout::StorageLayout;
use crate::transfer::{FileOps, TransferEngine, TransferProgress};
use crate::utils::{generate_uuid, local_hostname};

/// Deployer settings that do not change between runs
#[derive(Debug, Clone)]
pub struct DeployerConfig {
    /// Directory receiving the daily audit log files
    pub audit_log_dir: PathBuf,

    /// Wait between a successful start and the status check
    pub settle_delay: Duration,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            audit_log_dir: StorageLayout::default().logs_dir().path().to_path_buf(),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Runs deployments against injected service, file and backup capabilities.
///
/// At most one deployment per destination may run at a time in one process;
/// a second concurrent request for the same destination fails validation.
pub struct Deployer {
    services: Arc<dyn ServiceController>,
    files: Arc<dyn FileOps>,
    backups: Arc<dyn BackupStore>,
    config: DeployerConfig,
    active: Mutex<HashSet<PathBuf>>,
}

impl Deployer {
    pub fn new(
        services: Arc<dyn ServiceController>,
        files: Arc<dyn FileOps>,
        backups: Arc<dyn BackupStore>,
        config: DeployerConfig,
    ) -> Self {
        Self {
            services,
            files,
            backups,
            config,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// systemd control, the parallel transfer engine and a backup manager
    /// copying with `backup_concurrency` workers
    pub fn with_defaults(config: DeployerConfig, backup_concurrency: usize) -> Self {
        let files: Arc<dyn FileOps> = Arc::new(TransferEngine::new());
        let backups = Arc::new(BackupManager::new(files.clone(), backup_concurrency));
        Self::new(Arc::new(SystemdController::new()), files, backups, config)
    }

    /// Run one deployment. Never returns an error: every failure ends up in
    /// the result's `error_message`.
    pub async fn deploy(
        &self,
        options: &DeploymentOptions,
        progress: ProgressSink<'_>,
        cancel: &CancellationToken,
    ) -> DeploymentResult {
        let run_id = generate_uuid();
        let span = info_span!("deploy", run_id = %run_id, service = %options.service_name);
        self.deploy_impl(options, progress, cancel, run_id)
            .instrument(span)
            .await
    }

    async fn deploy_impl(
        &self,
        options: &DeploymentOptions,
        progress: ProgressSink<'_>,
        cancel: &CancellationToken,
        run_id: String,
    ) -> DeploymentResult {
        let started = Instant::now();
        let mut run = Run {
            options,
            host: resolve_host(options.remote_host.as_deref(), &options.destination_path),
            audit: AuditLog::daily(&self.config.audit_log_dir, run_id),
            progress: ProgressReporter::new(progress),
            stages: StageMachine::new(),
            backup_path: None,
            files_copied: 0,
            service_running: false,
        };

        run.audit
            .info(&format!(
                "========== Deployment started: service '{}' | {} -> {} | host {} | tag {} | run {} on {}{} ==========",
                options.service_name,
                options.source_path.display(),
                options.destination_path.display(),
                run.host.as_deref().unwrap_or("local"),
                options.version_tag.as_deref().unwrap_or("-"),
                run.audit.run_id(),
                local_hostname(),
                if options.dry_run { " | DRY RUN" } else { "" },
            ))
            .await;
        run.progress.report(Stage::Starting, 0, "Starting deployment");

        if let Err(e) = validate_source(options).await {
            return self.fail(run, started, e, false).await;
        }

        let Some(_claim) = ActiveClaim::acquire(&self.active, &options.destination_path) else {
            let e = DeployError::ValidationError(format!(
                "A deployment to {} is already in progress",
                options.destination_path.display()
            ));
            return self.fail(run, started, e, false).await;
        };

        match self.execute(&mut run, cancel).await {
            Ok(()) => self.complete(run, started).await,
            Err(e) => self.fail(run, started, e, true).await,
        }
    }

    async fn execute(&self, run: &mut Run<'_>, cancel: &CancellationToken) -> Result<(), DeployError> {
        let options = run.options;
        let host = run.host.clone();
        let name = options.service_name.as_str();

        // Stop
        run.enter(Stage::StoppingService, 10, format!("Stopping service {}", name))?;
        if options.dry_run {
            run.audit.info(&format!("[DRY RUN] Would stop service {}", name)).await;
        } else {
            let timer = Instant::now();
            let stopped = retry("Stop service", options.max_retries, options.retry_delay, cancel, || {
                self.services.stop(name, host.as_deref(), options.service_timeout)
            })
            .await?;
            if !stopped {
                return Err(DeployError::ServiceError(format!(
                    "Failed to stop service {} after {} attempts",
                    name, options.max_retries
                )));
            }
            run.audit
                .info(&format!("Service {} stopped ({:.1}s)", name, timer.elapsed().as_secs_f64()))
                .await;
        }
        run.progress.report(Stage::StoppingService, 20, "Service stopped");

        // Backup
        if options.enable_backup {
            run.enter(Stage::CreatingBackup, 25, "Creating backup")?;
            if options.dry_run {
                run.audit
                    .info(&format!(
                        "[DRY RUN] Would back up {} to {}",
                        options.destination_path.display(),
                        backup_root_for(&options.destination_path).display()
                    ))
                    .await;
            } else {
                let timer = Instant::now();
                let existed = Dir::new(&options.destination_path).exists().await;
                let created = self
                    .backups
                    .create_backup(&options.destination_path, options.version_tag.as_deref(), cancel)
                    .await?;
                match created {
                    Some(path) => {
                        run.audit
                            .info(&format!(
                                "Backup created at {} ({:.1}s)",
                                path.display(),
                                timer.elapsed().as_secs_f64()
                            ))
                            .await;
                        run.backup_path = Some(path);
                    }
                    None if existed => {
                        run.audit
                            .warn("Backup could not be created, continuing without one")
                            .await;
                    }
                    None => {
                        run.audit
                            .info("No existing deployment to back up")
                            .await;
                    }
                }
            }
            run.progress.report(Stage::CreatingBackup, 35, "Backup stage finished");
        }

        // Copy
        run.enter(Stage::CopyingFiles, 40, "Copying files")?;
        if options.dry_run {
            run.audit
                .info(&format!(
                    "[DRY RUN] Would copy {} to {}",
                    options.source_path.display(),
                    options.destination_path.display()
                ))
                .await;
        } else {
            let timer = Instant::now();
            let reporter = &run.progress;
            let on_copied = |done: usize, total: usize| {
                reporter.report(
                    Stage::CopyingFiles,
                    copy_percent(done, total),
                    format!("Copied {}/{} files", done, total),
                );
            };
            let on_copied: &TransferProgress<'_> = &on_copied;
            let outcome = self
                .files
                .copy_directory(
                    &options.source_path,
                    &options.destination_path,
                    options.max_concurrency,
                    Some(on_copied),
                    cancel,
                )
                .await?;
            run.files_copied = outcome.files_copied;

            if !outcome.success {
                let reason = match outcome.failure {
                    Some(f) => f.to_string(),
                    None => format!(
                        "copied {} of {} files",
                        outcome.files_copied, outcome.files_total
                    ),
                };
                return Err(DeployError::TransferError(reason));
            }
            run.audit
                .info(&format!(
                    "Copied {} files ({:.1}s)",
                    outcome.files_copied,
                    timer.elapsed().as_secs_f64()
                ))
                .await;
        }
        run.progress.report(Stage::CopyingFiles, 70, "Files copied");

        // Verify
        if options.verify_after_copy {
            run.enter(Stage::VerifyingFiles, 75, "Verifying files")?;
            if options.dry_run {
                run.audit.info("[DRY RUN] Would verify copied files").await;
            } else {
                let timer = Instant::now();
                let outcome = self
                    .files
                    .verify_directory(
                        &options.source_path,
                        &options.destination_path,
                        options.max_concurrency,
                        cancel,
                    )
                    .await?;
                if let Some(failure) = outcome.failure {
                    return Err(DeployError::VerificationError(failure.to_string()));
                }
                run.audit
                    .info(&format!(
                        "Verified {} files ({:.1}s)",
                        outcome.files_checked,
                        timer.elapsed().as_secs_f64()
                    ))
                    .await;
            }
            run.progress.report(Stage::VerifyingFiles, 85, "Files verified");
        }

        // Start
        run.enter(Stage::StartingService, 90, format!("Starting service {}", name))?;
        if options.dry_run {
            run.audit.info(&format!("[DRY RUN] Would start service {}", name)).await;
            return Ok(());
        }

        let timer = Instant::now();
        let started = retry("Start service", options.max_retries, options.retry_delay, cancel, || {
            self.services.start(name, host.as_deref(), options.service_timeout)
        })
        .await?;
        if !started {
            return Err(DeployError::ServiceError(format!(
                "Failed to start service {} after {} attempts",
                name, options.max_retries
            )));
        }

        // The new build is already running; a cancel here only skips the check
        let settled = tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.settle_delay) => true,
        };
        if !settled {
            run.audit
                .warn(&format!("Service {} started, status check skipped after cancellation", name))
                .await;
            return Ok(());
        }
        let status = self.query_status(name, host.as_deref()).await;
        run.service_running = status == Some(ServiceStatus::Running);
        run.audit
            .info(&format!(
                "Service {} started ({:.1}s), status: {}",
                name,
                timer.elapsed().as_secs_f64(),
                status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string())
            ))
            .await;

        Ok(())
    }

    async fn query_status(&self, name: &str, host: Option<&str>) -> Option<ServiceStatus> {
        match self.services.status(name, host).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Unable to query status of {}: {}", name, e);
                None
            }
        }
    }

    async fn complete(&self, mut run: Run<'_>, started: Instant) -> DeploymentResult {
        if let Err(e) = run.enter(Stage::Completed, 100, "Deployment completed") {
            warn!("{}", e);
        }

        let options = run.options;
        if options.enable_backup && !options.dry_run {
            if let Some(backup) = &run.backup_path {
                let root = backup
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| backup_root_for(&options.destination_path));
                let report = self
                    .backups
                    .clean_old_backups(&root, options.backup_retention_days)
                    .await;
                if !report.removed.is_empty() {
                    run.audit
                        .info(&format!("Removed {} old backups", report.removed.len()))
                        .await;
                }
                for failed in &report.failed {
                    run.audit
                        .warn(&format!("Unable to remove old backup {}", failed.display()))
                        .await;
                }
            }
        }

        let duration = started.elapsed();
        run.audit
            .info(&format!(
                "========== Deployment completed in {:.1}s ==========",
                duration.as_secs_f64()
            ))
            .await;

        run.into_result(true, None, duration, RollbackOutcome::NotAttempted)
    }

    async fn fail(
        &self,
        mut run: Run<'_>,
        started: Instant,
        error: DeployError,
        can_roll_back: bool,
    ) -> DeploymentResult {
        let message = match &error {
            DeployError::Cancelled => "Deployment cancelled".to_string(),
            other => other.to_string(),
        };
        let failed_in = run.stages.stage();
        run.audit
            .error(&format!("{} failed: {}", failed_in, message))
            .await;
        if let Err(e) = run.stages.advance(Stage::Failed) {
            warn!("{}", e);
        }

        let rollback = if can_roll_back {
            self.roll_back(&mut run).await
        } else {
            RollbackOutcome::NotAttempted
        };

        run.progress
            .report(Stage::Failed, 100, format!("Deployment failed: {}", message));

        let duration = started.elapsed();
        run.audit
            .error(&format!(
                "========== Deployment FAILED after {:.1}s: {} ==========",
                duration.as_secs_f64(),
                message
            ))
            .await;

        run.into_result(false, Some(message), duration, rollback)
    }

    /// Restore the backup and start the service again. Runs on its own
    /// cancellation token so a cancelled deployment still gets restored.
    async fn roll_back(&self, run: &mut Run<'_>) -> RollbackOutcome {
        let options = run.options;
        if options.dry_run || !options.enable_rollback {
            return RollbackOutcome::NotAttempted;
        }
        let Some(backup) = run.backup_path.clone() else {
            run.audit
                .warn("No backup available, rollback not possible")
                .await;
            return RollbackOutcome::NotAttempted;
        };

        let timer = Instant::now();
        let cancel = CancellationToken::new();
        let name = options.service_name.as_str();
        let host = run.host.clone();
        run.audit
            .warn(&format!("Rolling back {} from {}", options.destination_path.display(), backup.display()))
            .await;

        let restored = match self
            .backups
            .restore_backup(&backup, &options.destination_path, &cancel)
            .await
        {
            Ok(restored) => restored,
            Err(e) => {
                warn!("Restore errored: {}", e);
                false
            }
        };
        if !restored {
            run.audit
                .critical(&format!(
                    "ROLLBACK FAILED: could not restore {} from {}. Service {} is stopped and needs manual recovery",
                    options.destination_path.display(),
                    backup.display(),
                    name
                ))
                .await;
            return RollbackOutcome::RestoreFailed;
        }
        run.audit.info("Backup restored").await;

        let restarted = retry("Restart service after rollback", options.max_retries, options.retry_delay, &cancel, || {
            self.services.start(name, host.as_deref(), options.service_timeout)
        })
        .await
        .unwrap_or(false);
        if !restarted {
            run.audit
                .critical(&format!(
                    "ROLLBACK INCOMPLETE: files restored but service {} did not start",
                    name
                ))
                .await;
            return RollbackOutcome::RestoredServiceNotStarted;
        }

        tokio::time::sleep(self.config.settle_delay).await;
        run.service_running = self.query_status(name, host.as_deref()).await == Some(ServiceStatus::Running);
        run.audit
            .info(&format!(
                "Rollback completed ({:.1}s), service {} restarted",
                timer.elapsed().as_secs_f64(),
                name
            ))
            .await;
        RollbackOutcome::Restored
    }
}

/// Check the options and that the source directory exists
async fn validate_source(options: &DeploymentOptions) -> Result<(), DeployError> {
    options.validate()?;
    if !Dir::new(&options.source_path).exists().await {
        return Err(DeployError::ValidationError(format!(
            "Source path does not exist: {}",
            options.source_path.display()
        )));
    }
    Ok(())
}

/// Mutable state of one run
struct Run<'a> {
    options: &'a DeploymentOptions,
    host: Option<String>,
    audit: AuditLog,
    progress: ProgressReporter<'a>,
    stages: StageMachine,
    backup_path: Option<PathBuf>,
    files_copied: usize,
    service_running: bool,
}

impl Run<'_> {
    fn enter(&mut self, stage: Stage, percent: u8, message: impl Into<String>) -> Result<(), DeployError> {
        self.stages.advance(stage).map_err(DeployError::Internal)?;
        self.progress.report(stage, percent, message);
        Ok(())
    }

    fn into_result(
        self,
        success: bool,
        error_message: Option<String>,
        duration: Duration,
        rollback: RollbackOutcome,
    ) -> DeploymentResult {
        DeploymentResult {
            success,
            error_message,
            backup_path: self.backup_path,
            files_copied: self.files_copied,
            duration,
            service_running: self.service_running,
            final_stage: self.stages.stage(),
            rollback,
        }
    }
}

/// Marks a destination as busy until dropped
struct ActiveClaim<'a> {
    active: &'a Mutex<HashSet<PathBuf>>,
    destination: PathBuf,
}

impl<'a> ActiveClaim<'a> {
    fn acquire(active: &'a Mutex<HashSet<PathBuf>>, destination: &Path) -> Option<Self> {
        let mut set = active.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(destination.to_path_buf()) {
            return None;
        }
        Some(Self {
            active,
            destination: destination.to_path_buf(),
        })
    }
}

impl Drop for ActiveClaim<'_> {
    fn drop(&mut self) {
        let mut set = self.active.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.destination);
    }
}
