use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::backends::BackupArtifact;

/// Configure retention of backups.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Defines how many backups of a database to keep.
    ///
    /// The newest backups are kept, everything older is deleted.
    pub max_backups: usize,
}

/// Files touched by a single retention sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Backups deleted, or to be deleted on a dry run.
    pub removed: Vec<PathBuf>,
    /// Backups which couldn't be deleted.
    pub failed: Vec<PathBuf>,
}

impl Sweep {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl RetentionConfig {
    /// Returns the file names exceeding the retention, oldest first.
    ///
    /// File names are compared lexicographically which matches
    /// the chronological order of the encoded timestamps.
    pub fn expired(&self, mut file_names: Vec<String>) -> Vec<String> {
        file_names.sort_unstable();
        let excess = file_names.len().saturating_sub(self.max_backups);
        file_names.truncate(excess);
        file_names
    }
}

/// Deletes the oldest backups of `database` in `folder` exceeding `cfg`.
///
/// Failing deletions are logged and skipped, the sweep continues with the next backup.
/// An error is only returned if `folder` can't be listed.
pub fn sweep(
    folder: &Path,
    database: &str,
    cfg: &RetentionConfig,
    dry_run: bool,
) -> io::Result<Sweep> {
    let mut file_names = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };

        if BackupArtifact::belongs_to(&file_name, database) && entry.file_type()?.is_file() {
            file_names.push(file_name);
        }
    }
    log::trace!(target: "retention", "Found {} backup(s) of '{database}'", file_names.len());

    let mut sweep = Sweep::default();
    for file_name in cfg.expired(file_names) {
        let path = folder.join(&file_name);

        if dry_run {
            log::info!(target: "retention", "Dry run, not deleting old backup: {file_name}");
            sweep.removed.push(path);
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!(target: "retention", "Deleted old backup: {file_name}");
                sweep.removed.push(path);
            }
            Err(e) => {
                log::error!(target: "retention", "Deleting old backup {file_name} failed: {e}");
                sweep.failed.push(path);
            }
        }
    }

    Ok(sweep)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T1: &str = "orders_2024-10-01_02_00_00.backup";
    const T2: &str = "orders_2024-10-02_02_00_00.backup";
    const T3: &str = "orders_2024-10-03_02_00_00.backup";
    const T4: &str = "orders_2024-10-04_02_00_00.backup";

    fn touch(folder: &Path, names: &[&str]) {
        for name in names {
            fs::write(folder.join(name), b"PGDMP").unwrap();
        }
    }

    fn remaining(folder: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(folder)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn expired_are_the_oldest() {
        let cfg = RetentionConfig { max_backups: 2 };
        let names = [T3, T1, T4, T2].map(String::from).to_vec();

        assert_eq!(cfg.expired(names), [T1, T2]);
    }

    #[test]
    fn nothing_expires_below_the_cap() {
        let cfg = RetentionConfig { max_backups: 5 };
        let names = [T1, T2].map(String::from).to_vec();

        assert!(cfg.expired(names).is_empty());
    }

    #[test]
    fn oldest_backups_are_deleted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &[T1, T2, T3, T4]);

        let cfg = RetentionConfig { max_backups: 2 };
        let sweep = sweep(dir.path(), "orders", &cfg, false).unwrap();

        assert_eq!(sweep.removed, [dir.path().join(T1), dir.path().join(T2)]);
        assert!(sweep.is_clean());
        assert_eq!(remaining(dir.path()), [T3, T4]);
    }

    #[test]
    fn zero_keeps_nothing() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &[T1, T2]);

        let cfg = RetentionConfig { max_backups: 0 };
        sweep(dir.path(), "orders", &cfg, false).unwrap();

        assert!(remaining(dir.path()).is_empty());
    }

    #[test]
    fn other_files_are_untouched() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                T1,
                T2,
                "customers_2024-09-01_02_00_00.backup",
                "orders_2024-09-01_02_00_00.sql",
                "notes.txt",
            ],
        );

        let cfg = RetentionConfig { max_backups: 1 };
        sweep(dir.path(), "orders", &cfg, false).unwrap();

        assert_eq!(
            remaining(dir.path()),
            [
                "customers_2024-09-01_02_00_00.backup",
                "notes.txt",
                "orders_2024-09-01_02_00_00.sql",
                T2,
            ]
        );
    }

    #[test]
    fn databases_sharing_a_prefix_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let app = ["app_2024-10-01_02_00_00.backup", "app_2024-10-02_02_00_00.backup"];
        let app_audit = [
            "app_audit_2024-10-01_02_00_00.backup",
            "app_audit_2024-10-02_02_00_00.backup",
        ];
        let orders2 = ["orders2_2024-09-01_02_00_00.backup"];
        touch(dir.path(), &app);
        touch(dir.path(), &app_audit);
        touch(dir.path(), &orders2);
        touch(dir.path(), &[T1, T2, T3]);

        let cfg = RetentionConfig { max_backups: 2 };
        let app_sweep = sweep(dir.path(), "app", &cfg, false).unwrap();
        let orders_sweep = sweep(dir.path(), "orders", &cfg, false).unwrap();

        assert!(app_sweep.removed.is_empty());
        assert_eq!(orders_sweep.removed, [dir.path().join(T1)]);
        assert_eq!(
            remaining(dir.path()),
            [
                app[0],
                app[1],
                app_audit[0],
                app_audit[1],
                orders2[0],
                T2,
                T3,
            ]
        );
    }

    #[test]
    fn directories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(T2)).unwrap();
        touch(dir.path(), &[T1]);

        let cfg = RetentionConfig { max_backups: 0 };
        let sweep = sweep(dir.path(), "orders", &cfg, false).unwrap();

        assert_eq!(sweep.removed, [dir.path().join(T1)]);
        assert_eq!(remaining(dir.path()), [T2]);
    }

    #[test]
    fn dry_run_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &[T1, T2, T3]);

        let cfg = RetentionConfig { max_backups: 1 };
        let sweep = sweep(dir.path(), "orders", &cfg, true).unwrap();

        assert_eq!(sweep.removed.len(), 2);
        assert_eq!(remaining(dir.path()), [T1, T2, T3]);
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RetentionConfig { max_backups: 1 };

        assert!(sweep(&dir.path().join("missing"), "orders", &cfg, false).is_err());
    }
}
