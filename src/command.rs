//! Execution of external programs.
//!
//! `pg_dump` and the notification script are run through [CommandRunner]
//! so they can be replaced in tests.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Command;

/// Result of a finished external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, [None] if the program was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Output of a program exiting with `code`.
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Human readable exit status, e.g. for error messages.
    pub fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs an external program to completion.
pub trait CommandRunner {
    /// Runs `program` with `args` and waits for it to exit.
    ///
    /// An error is only returned if the program couldn't be started;
    /// a non-zero exit is reported through [CommandOutput::code].
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<CommandOutput> {
        (**self).run(program, args)
    }
}

/// Runs programs as child processes of this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<CommandOutput> {
        log::trace!(target: "command", "Running: {} {args:?}", program.display());

        let output = Command::new(program).args(args).output()?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
