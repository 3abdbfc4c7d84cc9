//! Log sink writing every record to the log file and to the terminal.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::Local;
use env_logger::{Builder, Target};
use log::{LevelFilter, SetLoggerError};

/// Appends to the log file (if available) and mirrors to stderr.
pub struct Tee {
    file: Option<File>,
}

impl Tee {
    pub fn new(file: Option<File>) -> Self {
        Self { file }
    }
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = &mut self.file {
            file.write_all(buf)?;
        }
        io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &mut self.file {
            file.flush()?;
        }
        io::stderr().flush()
    }
}

/// Installs the global logger.
///
/// The level defaults to `info`, can be overridden with `RUST_LOG`
/// and finally by `level`.
pub fn init(log_file: &Path, level: Option<LevelFilter>) -> Result<(), SetLoggerError> {
    let (file, open_error) = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => (Some(file), None),
        Err(e) => (None, Some(e)),
    };

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info).parse_default_env();
    if let Some(level) = level {
        builder.filter_level(level);
    }

    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{}: [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee::new(file))))
        .try_init()?;

    if let Some(e) = open_error {
        log::warn!(target: "logger", "Opening log file {} failed, logging to terminal only: {e}", log_file.display());
    }

    Ok(())
}
