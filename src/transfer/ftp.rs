//! Implements the upload of backups to an FTP server using [FtpUploader].

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

use super::{existing_files, Upload, UploadReport};
use crate::settings::FtpSettings;

#[derive(Debug, Display, Error)]
/// Errors on uploading to the FTP server.
pub enum FtpUploadError {
    /// Connecting to the server failed.
    #[display("Connecting to FTP server {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        source: FtpError,
    },
    /// The server rejected the credentials.
    #[display("FTP login as '{user}' failed: {source}")]
    Login { user: String, source: FtpError },
    /// Switching to binary mode failed.
    #[display("Switching to binary transfer mode failed: {_0}")]
    TransferType(FtpError),
    /// A local backup can't be opened.
    #[display("Opening {} failed: {source}", file.display())]
    Open { file: PathBuf, source: io::Error },
    /// Storing a backup on the server failed.
    #[display("Uploading {} to {remote} failed: {source}", file.display())]
    Store {
        file: PathBuf,
        remote: String,
        source: FtpError,
    },
}

/// Remote location of `file_name` inside `target_folder`.
pub fn remote_path(target_folder: &str, file_name: &str) -> String {
    format!("{}/{file_name}", target_folder.trim_end_matches('/'))
}

/// Uploads backups into the configured folder of an FTP server.
///
/// A connection is only established once [Upload::upload] is called
/// with at least one existing file.
#[derive(Debug)]
pub struct FtpUploader {
    settings: FtpSettings,
}

impl FtpUploader {
    pub fn new(settings: FtpSettings) -> Self {
        Self { settings }
    }

    fn connect(&self) -> Result<FtpStream, FtpUploadError> {
        let FtpSettings { host, port, .. } = &self.settings;
        log::debug!(target: "transfer::ftp", "Connecting to {host}:{port}");

        let mut ftp = FtpStream::connect((host.as_str(), *port)).map_err(|source| {
            FtpUploadError::Connect {
                host: host.clone(),
                port: *port,
                source,
            }
        })?;

        if let Err(e) = self.login(&mut ftp) {
            disconnect(ftp);
            return Err(e);
        }

        log::info!(target: "transfer::ftp", "Connected to FTP server");
        Ok(ftp)
    }

    fn login(&self, ftp: &mut FtpStream) -> Result<(), FtpUploadError> {
        let FtpSettings { user, password, .. } = &self.settings;

        ftp.login(user.as_str(), password.as_str())
            .map_err(|source| FtpUploadError::Login {
                user: user.clone(),
                source,
            })?;
        ftp.transfer_type(FileType::Binary)
            .map_err(FtpUploadError::TransferType)
    }

    fn store(&self, ftp: &mut FtpStream, file: &Path) -> Result<u64, FtpUploadError> {
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let remote = remote_path(&self.settings.target_folder, &file_name);

        let mut reader = File::open(file).map_err(|source| FtpUploadError::Open {
            file: file.to_path_buf(),
            source,
        })?;
        let stored = ftp.put_file(&remote, &mut reader);
        stored.map_err(|source| FtpUploadError::Store {
            file: file.to_path_buf(),
            remote,
            source,
        })
    }
}

fn disconnect(mut ftp: FtpStream) {
    match ftp.quit() {
        Ok(()) => log::info!(target: "transfer::ftp", "Disconnected from FTP server"),
        Err(e) => log::warn!(target: "transfer::ftp", "Disconnecting from FTP server failed: {e}"),
    }
}

impl Upload for FtpUploader {
    type Error = FtpUploadError;

    fn upload(&mut self, files: &[PathBuf]) -> Result<UploadReport, Self::Error> {
        let mut report = UploadReport::default();
        let files = existing_files(files, &mut report);
        if files.is_empty() {
            log::warn!(target: "transfer::ftp", "No backups left to upload");
            return Ok(report);
        }

        let mut ftp = self.connect()?;

        for file in files {
            match self.store(&mut ftp, file) {
                Ok(bytes) => {
                    log::info!(target: "transfer::ftp", "Uploaded {} to FTP ({bytes} bytes)", file.display());
                    report.uploaded.push(file.clone());
                }
                Err(e) => {
                    log::error!(target: "transfer::ftp", "{e}");
                    report.failed.push(file.clone());
                }
            }
        }

        disconnect(ftp);
        Ok(report)
    }
}
