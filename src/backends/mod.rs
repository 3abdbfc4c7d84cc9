//! Backend modules for performing individual backup tasks.
//!
//! Currently the following backends are implemented:
//!
//! - [PgDump]: Backup of PostgreSQL databases with `pg_dump` in its custom archive format.

pub mod artifact;
pub mod pg_dump;

pub use artifact::BackupArtifact;
pub use pg_dump::PgDump;

use crate::util::retention::{RetentionConfig, Sweep};

/// Generic backup backend.
pub trait Backup {
    /// Error that may happen on backup.
    type Error;

    /// Backups the `database` into a new [BackupArtifact].
    ///
    /// # Dry Run
    ///
    /// On a dry run (`dry_run=true`) no files are altered.
    /// The returned [BackupArtifact] describes the file a "real" backup would create.
    fn backup(&self, database: &str, dry_run: bool) -> Result<BackupArtifact, Self::Error>;

    /// Applies the [RetentionConfig] to all backups of `database` created by the [Backup].
    ///
    /// # Dry Run
    ///
    /// On a dry run nothing is deleted, the returned [Sweep] lists what would be.
    /// Only backups present on disk are considered: the backup a dry run [Backup::backup]
    /// pretended to create isn't counted, so a real run may delete one backup more.
    fn retention(
        &self,
        database: &str,
        cfg: &RetentionConfig,
        dry_run: bool,
    ) -> Result<Sweep, Self::Error>;
}

impl<B: Backup + ?Sized> Backup for &B {
    type Error = B::Error;

    fn backup(&self, database: &str, dry_run: bool) -> Result<BackupArtifact, Self::Error> {
        (**self).backup(database, dry_run)
    }

    fn retention(
        &self,
        database: &str,
        cfg: &RetentionConfig,
        dry_run: bool,
    ) -> Result<Sweep, Self::Error> {
        (**self).retention(database, cfg, dry_run)
    }
}
