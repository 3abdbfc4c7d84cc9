use std::process::ExitCode;

use clap::Parser;
use pg_backuper_lib::cli::Cli;
use pg_backuper_lib::command::SystemRunner;
use pg_backuper_lib::run::{run_from_files, EXIT_FATAL};
use pg_backuper_lib::util::logger;

fn main() -> ExitCode {
    let cli = Cli::parse();

    logger::init(&cli.log_file, cli.verbose).expect("logger should only be initialized once");

    if cli.dry_run {
        log::warn!("Running in dry-run mode");
    }

    let hostname = gethostname::gethostname().to_string_lossy().into_owned();

    match run_from_files(
        &cli.settings,
        &cli.databases,
        &SystemRunner,
        &hostname,
        cli.dry_run,
    ) {
        Ok(summary) => summary.exit_code(),
        Err(e) => {
            log::error!(target: "settings", "{e}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
