use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, SubsecRound};

/// File extension of every backup.
pub const ARTIFACT_EXTENSION: &str = ".backup";

/// Timestamp encoded in the file name of a backup.
///
/// Sorting file names of the same database yields chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// A backup of one database stored as `<database>_<timestamp>.backup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    database: String,
    created: NaiveDateTime,
    path: PathBuf,
}

impl BackupArtifact {
    /// Describes the backup of `database` created at `created` inside `folder`.
    pub fn new(folder: &Path, database: &str, created: NaiveDateTime) -> Self {
        let created = created.trunc_subsecs(0);
        let path = folder.join(Self::file_name(database, &created));

        Self {
            database: database.to_string(),
            created,
            path,
        }
    }

    pub fn file_name(database: &str, created: &NaiveDateTime) -> String {
        format!(
            "{database}_{}{ARTIFACT_EXTENSION}",
            created.format(TIMESTAMP_FORMAT)
        )
    }

    /// Returns if the file is a backup of `database`.
    ///
    /// Only `<database>_<timestamp>.backup` matches, so backups of databases
    /// sharing a prefix (e.g. `app` and `app_audit`) are told apart.
    pub fn belongs_to(file_name: &str, database: &str) -> bool {
        file_name
            .strip_prefix(database)
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| rest.strip_suffix(ARTIFACT_EXTENSION))
            .is_some_and(|timestamp| {
                NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).is_ok()
            })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn created(&self) -> &NaiveDateTime {
        &self.created
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
