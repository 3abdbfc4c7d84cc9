//! Best effort notifications about the outcome of a database backup.
//!
//! Notifications are sent by an external script (e.g. a Telegram bot wrapper)
//! invoked as `<script> <status> <message>`.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use derive_more::{Display, Error};

use crate::command::CommandRunner;
use crate::settings::NotificationSettings;

/// Outcome of a database backup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum Status {
    #[display("success")]
    Success,
    #[display("failure")]
    Failure,
}

impl Status {
    /// Status token passed to the notification script.
    pub fn token(self) -> &'static str {
        match self {
            Status::Success => "r",
            Status::Failure => "a",
        }
    }
}

#[derive(Debug, Display, Error)]
/// Errors on sending a notification.
pub enum NotifyError {
    /// The script couldn't be started.
    #[display("Unable to run notification script: {_0}")]
    NotRun(io::Error),
    /// The script exited unsuccessfully.
    #[display("Notification script failed with {_0}")]
    Failed(#[error(ignore)] String),
}

/// Reports the outcome of a database backup.
pub trait Notify {
    fn notify(&self, status: Status, database: &str) -> Result<(), NotifyError>;
}

impl<N: Notify + ?Sized> Notify for &N {
    fn notify(&self, status: Status, database: &str) -> Result<(), NotifyError> {
        (**self).notify(status, database)
    }
}

/// Composes the message sent for the backup of `database`.
pub fn compose_message(prefix: &str, hostname: &str, database: &str, status: Status) -> String {
    let outcome = match status {
        Status::Success => "created successfully",
        Status::Failure => "failed",
    };
    let message = format!("{hostname}. Backup for '{database}' {outcome}.");

    if prefix.is_empty() {
        message
    } else {
        format!("{prefix} {message}")
    }
}

/// Sends notifications through an external script.
#[derive(Debug)]
pub struct ScriptNotifier<R> {
    script: PathBuf,
    prefix: String,
    hostname: String,
    runner: R,
}

impl<R: CommandRunner> ScriptNotifier<R> {
    pub fn new(settings: &NotificationSettings, hostname: &str, runner: R) -> Self {
        Self {
            script: settings.script_path.clone(),
            prefix: settings.prefix.clone(),
            hostname: hostname.to_string(),
            runner,
        }
    }
}

impl<R: CommandRunner> Notify for ScriptNotifier<R> {
    fn notify(&self, status: Status, database: &str) -> Result<(), NotifyError> {
        let message = compose_message(&self.prefix, &self.hostname, database, status);

        let output = self
            .runner
            .run(
                &self.script,
                &[OsString::from(status.token()), OsString::from(&message)],
            )
            .map_err(NotifyError::NotRun)?;

        if !output.success() {
            return Err(NotifyError::Failed(output.status()));
        }

        log::info!(target: "notification", "Notification sent: {message}");
        Ok(())
    }
}
