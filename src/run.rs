//! One backup run over all configured databases.
//!
//! Every database is processed independently: dump, notification and retention.
//! Only after all databases are done the created backups are uploaded.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::backends::{Backup, BackupArtifact, PgDump};
use crate::command::CommandRunner;
use crate::notification::{Notify, ScriptNotifier, Status};
use crate::settings::{load_databases, load_settings, Settings, SettingsError};
use crate::transfer::{FtpUploader, Upload, UploadReport};
use crate::util::retention::RetentionConfig;

/// Exit code if the settings or the database list can't be loaded.
pub const EXIT_FATAL: u8 = 1;
/// Exit code if the run completed but something failed on the way.
pub const EXIT_PARTIAL: u8 = 2;

/// Outcome of processing a single database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOutcome {
    pub database: String,
    /// Created backup, [None] if the dump failed.
    pub artifact: Option<BackupArtifact>,
    /// Old backups deleted by the retention.
    pub removed: Vec<PathBuf>,
    /// Retention couldn't list or delete all backups.
    pub retention_failed: bool,
}

impl DatabaseOutcome {
    pub fn is_success(&self) -> bool {
        self.artifact.is_some() && !self.retention_failed
    }
}

/// Outcome of the upload stage.
#[derive(Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The upload ran, see the report for individual files.
    Completed(UploadReport),
    /// The upload was aborted, e.g. because the server was unreachable.
    Aborted(String),
}

/// Outcome of a whole run.
#[derive(Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// One entry per database, in processing order.
    pub outcomes: Vec<DatabaseOutcome>,
    /// [None] if no upload was attempted.
    pub upload: Option<UploadOutcome>,
}

impl RunSummary {
    /// Backups created during the run, in creation order.
    pub fn artifacts(&self) -> impl Iterator<Item = &BackupArtifact> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.artifact.as_ref())
    }

    /// Databases whose dump failed.
    pub fn failed_databases(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.artifact.is_none())
            .map(|outcome| outcome.database.as_str())
    }

    pub fn is_success(&self) -> bool {
        let upload_ok = match &self.upload {
            None => true,
            Some(UploadOutcome::Completed(report)) => report.is_complete(),
            Some(UploadOutcome::Aborted(_)) => false,
        };

        upload_ok && self.outcomes.iter().all(DatabaseOutcome::is_success)
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_PARTIAL)
        }
    }

    fn log(&self) {
        let failed: Vec<_> = self.failed_databases().collect();
        let created = self.artifacts().count();

        if failed.is_empty() {
            log::info!(target: "run", "Finished: {created} backup(s) created");
        } else {
            log::error!(
                target: "run",
                "Finished: {created} backup(s) created, failed: {}",
                failed.join(", ")
            );
        }

        if let Some(UploadOutcome::Completed(report)) = &self.upload {
            log::info!(
                target: "run",
                "{} backup(s) uploaded, {} skipped, {} failed",
                report.uploaded.len(),
                report.skipped.len(),
                report.failed.len()
            );
        }
    }
}

/// Loads the settings and the database list, then backups all listed databases.
///
/// If either file can't be loaded the error is returned before anything is dumped.
pub fn run_from_files<R: CommandRunner>(
    settings: &Path,
    databases: &Path,
    runner: &R,
    hostname: &str,
    dry_run: bool,
) -> Result<RunSummary, SettingsError> {
    let settings = load_settings(settings)?;
    let database_names = load_databases(databases)?;
    if database_names.is_empty() {
        log::warn!(target: "settings", "No databases listed in {}", databases.display());
    }

    let summary = BackupRun::from_settings(&settings, runner, hostname)
        .dry_run(dry_run)
        .run(&database_names);
    Ok(summary)
}

/// Sequences backup, notification, retention and upload.
#[derive(Debug)]
pub struct BackupRun<B, N, U> {
    backend: B,
    notifier: Option<N>,
    uploader: Option<U>,
    retention: RetentionConfig,
    dry_run: bool,
}

impl<'r, R: CommandRunner> BackupRun<PgDump<&'r R>, ScriptNotifier<&'r R>, FtpUploader> {
    /// Create a run as described by `settings`.
    ///
    /// Notifications and the upload are only set up if enabled.
    pub fn from_settings(settings: &Settings, runner: &'r R, hostname: &str) -> Self {
        let notifier = settings
            .notification
            .as_ref()
            .map(|notification| ScriptNotifier::new(notification, hostname, runner));
        let uploader = settings.ftp.clone().map(FtpUploader::new);

        Self::new(
            PgDump::new(settings, runner),
            notifier,
            uploader,
            RetentionConfig {
                max_backups: settings.max_backups,
            },
        )
    }
}

impl<B, N, U> BackupRun<B, N, U>
where
    B: Backup,
    B::Error: Display,
    N: Notify,
    U: Upload,
{
    pub fn new(
        backend: B,
        notifier: Option<N>,
        uploader: Option<U>,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            backend,
            notifier,
            uploader,
            retention,
            dry_run: false,
        }
    }

    /// On a dry run nothing is dumped, deleted, sent or uploaded.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Processes all `databases` in order and uploads the created backups.
    pub fn run(&mut self, databases: &[String]) -> RunSummary {
        log::info!(target: "run", "Starting backup of {} database(s)", databases.len());

        let outcomes: Vec<_> = databases
            .iter()
            .map(|database| self.process_database(database))
            .collect();

        let artifacts: Vec<_> = outcomes
            .iter()
            .filter_map(|outcome| outcome.artifact.as_ref())
            .map(|artifact| artifact.path().to_path_buf())
            .collect();
        let upload = self.upload(&artifacts);

        let summary = RunSummary { outcomes, upload };
        summary.log();
        summary
    }

    /// Backups `database`, reports the outcome and applies the retention.
    ///
    /// The retention is applied even if the backup failed.
    pub fn process_database(&self, database: &str) -> DatabaseOutcome {
        let artifact = match self.backend.backup(database, self.dry_run) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                log::error!(target: "run", "{e}");
                None
            }
        };

        let status = if artifact.is_some() {
            Status::Success
        } else {
            Status::Failure
        };
        self.notify(status, database);

        let (removed, retention_failed) =
            match self
                .backend
                .retention(database, &self.retention, self.dry_run)
            {
                Ok(sweep) => {
                    let clean = sweep.is_clean();
                    (sweep.removed, !clean)
                }
                Err(e) => {
                    log::error!(target: "run", "Retention of '{database}' skipped: {e}");
                    (Vec::new(), true)
                }
            };

        DatabaseOutcome {
            database: database.to_string(),
            artifact,
            removed,
            retention_failed,
        }
    }

    fn notify(&self, status: Status, database: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        if self.dry_run {
            log::info!(target: "run", "Dry run, not sending {status} notification for '{database}'");
            return;
        }

        if let Err(e) = notifier.notify(status, database) {
            log::error!(target: "run", "Error sending notification: {e}");
        }
    }

    fn upload(&mut self, artifacts: &[PathBuf]) -> Option<UploadOutcome> {
        let uploader = self.uploader.as_mut()?;

        if artifacts.is_empty() {
            log::info!(target: "run", "No backups created, skipping upload");
            return None;
        }

        if self.dry_run {
            for artifact in artifacts {
                log::info!(target: "run", "Dry run, not uploading {}", artifact.display());
            }
            return None;
        }

        let outcome = match uploader.upload(artifacts) {
            Ok(report) => UploadOutcome::Completed(report),
            Err(e) => {
                log::error!(target: "run", "Upload aborted: {e}");
                UploadOutcome::Aborted(e.to_string())
            }
        };
        Some(outcome)
    }
}
