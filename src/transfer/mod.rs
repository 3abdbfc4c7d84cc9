//! Upload of the backups created during a run to a remote server.
//!
//! Currently the following uploaders are implemented:
//!
//! - [FtpUploader]: Binary upload into a folder of an FTP server.

pub mod ftp;

pub use ftp::FtpUploader;

use std::fmt::Display;
use std::path::PathBuf;

/// Files handled by an upload.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: Vec<PathBuf>,
    /// Files no longer present locally, e.g. deleted by the retention.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Generic upload target.
pub trait Upload {
    /// Error aborting the whole upload, e.g. a failed connection.
    type Error: Display;

    /// Uploads `files` in the given order.
    ///
    /// Failing files are recorded in the [UploadReport] without aborting the upload.
    fn upload(&mut self, files: &[PathBuf]) -> Result<UploadReport, Self::Error>;
}

/// Splits off files which don't exist anymore into [UploadReport::skipped].
pub(crate) fn existing_files<'f>(files: &'f [PathBuf], report: &mut UploadReport) -> Vec<&'f PathBuf> {
    files
        .iter()
        .filter(|file| {
            let exists = file.is_file();
            if !exists {
                log::warn!(target: "transfer", "Skipping upload of {}, it doesn't exist anymore", file.display());
                report.skipped.push(file.to_path_buf());
            }
            exists
        })
        .collect()
}
