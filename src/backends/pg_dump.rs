//! Implements backup of PostgreSQL databases using [PgDump].

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use derive_more::{Display, Error};

use crate::backends::{Backup, BackupArtifact};
use crate::command::CommandRunner;
use crate::settings::Settings;
use crate::util::retention::{self, RetentionConfig, Sweep};

// lines of pg_dump's stderr kept in a failure
const STDERR_TAIL: usize = 5;

/// The [PgDump] backend dumps databases with `pg_dump` into the backup folder.
///
/// Every backup is a custom format archive including large objects,
/// which can be restored with `pg_restore`.
#[derive(Debug)]
pub struct PgDump<R> {
    pg_dump: PathBuf,
    host: String,
    port: u16,
    username: String,
    backup_folder: PathBuf,
    runner: R,
}

#[derive(Debug, Display, Error)]
/// Reasons for a failed `pg_dump` run.
pub enum DumpFailure {
    /// The backup folder can't be created.
    #[display("Unable to create backup folder: {_0}")]
    BackupFolder(io::Error),
    /// `pg_dump` couldn't be started.
    #[display("Unable to run pg_dump: {_0}")]
    NotRun(io::Error),
    /// `pg_dump` exited unsuccessfully.
    #[display("pg_dump failed with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

#[derive(Debug, Display, Error)]
/// Errors of the [PgDump] backend.
pub enum PgDumpError {
    /// The backup of a database failed.
    #[display("Backup of '{database}' failed: {source}")]
    DumpFailed {
        database: String,
        source: DumpFailure,
    },
    /// Existing backups can't be listed for the retention.
    #[display("Listing backups in {} failed: {source}", folder.display())]
    Retention { folder: PathBuf, source: io::Error },
}

impl<R: CommandRunner> PgDump<R> {
    /// Create a new [PgDump] instance connecting as configured in `settings`.
    pub fn new(settings: &Settings, runner: R) -> Self {
        let backup_folder = settings.backup_folder.clone();
        if backup_folder.is_relative() {
            log::warn!(target: "backend::pg_dump", "backup_folder is relative: {}", backup_folder.display());
        }

        Self {
            pg_dump: settings.pg_dump_path.clone(),
            host: settings.host.clone(),
            port: settings.port,
            username: settings.username.clone(),
            backup_folder,
            runner,
        }
    }

    pub fn backup_folder(&self) -> &Path {
        &self.backup_folder
    }

    /// Arguments of `pg_dump` writing `database` to `file`.
    pub fn command_args(&self, database: &str, file: &Path) -> Vec<OsString> {
        vec![
            "--file".into(),
            file.into(),
            "--host".into(),
            self.host.as_str().into(),
            "--port".into(),
            self.port.to_string().into(),
            "--username".into(),
            self.username.as_str().into(),
            "--verbose".into(),
            "--format=c".into(),
            "--blobs".into(),
            database.into(),
        ]
    }

    fn generate_artifact(&self, database: &str) -> BackupArtifact {
        BackupArtifact::new(&self.backup_folder, database, Local::now().naive_local())
    }

    fn remove_partial(&self, artifact: &BackupArtifact) {
        match fs::remove_file(artifact.path()) {
            Ok(()) => {
                log::warn!(target: "backend::pg_dump", "Removed incomplete backup: {}", artifact.path().display())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!(target: "backend::pg_dump", "Unable to remove incomplete backup {}: {e}", artifact.path().display())
            }
        }
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<_> = stderr.lines().filter(|line| !line.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(STDERR_TAIL)..].join("\n")
}

impl<R: CommandRunner> Backup for PgDump<R> {
    type Error = PgDumpError;

    fn backup(&self, database: &str, dry_run: bool) -> Result<BackupArtifact, Self::Error> {
        let dump_failed = |source| PgDumpError::DumpFailed {
            database: database.to_string(),
            source,
        };
        log::info!(target: "backend::pg_dump", "Create backup of database '{database}'");

        let artifact = self.generate_artifact(database);
        let args = self.command_args(database, artifact.path());
        log::debug!(target: "backend::pg_dump", "Save backup at: {}", artifact.path().display());

        if dry_run {
            log::info!(
                target: "backend::pg_dump",
                "Dry run, not running: {} {}",
                self.pg_dump.display(),
                args.iter().map(|arg| arg.to_string_lossy()).collect::<Vec<_>>().join(" ")
            );
            return Ok(artifact);
        }

        fs::create_dir_all(&self.backup_folder)
            .map_err(|e| dump_failed(DumpFailure::BackupFolder(e)))?;

        let output = self
            .runner
            .run(&self.pg_dump, &args)
            .map_err(|e| dump_failed(DumpFailure::NotRun(e)))?;
        log::trace!(target: "backend::pg_dump", "pg_dump finished with {}", output.status());

        if !output.success() {
            self.remove_partial(&artifact);
            return Err(dump_failed(DumpFailure::Failed {
                status: output.status(),
                stderr: stderr_tail(&output.stderr),
            }));
        }

        // relay the verbose output
        for line in output.stderr.lines() {
            log::debug!(target: "backend::pg_dump", "{line}");
        }

        log::info!(
            target: "backend::pg_dump",
            "Backup for '{database}' created successfully: {}",
            artifact.path().display()
        );

        Ok(artifact)
    }

    fn retention(
        &self,
        database: &str,
        cfg: &RetentionConfig,
        dry_run: bool,
    ) -> Result<Sweep, Self::Error> {
        retention::sweep(&self.backup_folder, database, cfg, dry_run).map_err(|source| {
            PgDumpError::Retention {
                folder: self.backup_folder.clone(),
                source,
            }
        })
    }
}
