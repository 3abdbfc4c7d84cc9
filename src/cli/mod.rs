use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// JSON file with the backup settings.
    #[arg(long, env = "PG_BACKUPER_SETTINGS", default_value = "settings.json")]
    pub settings: PathBuf,

    /// File listing the databases to backup, one per line.
    #[arg(long, env = "PG_BACKUPER_DATABASES", default_value = "databases.txt")]
    pub databases: PathBuf,

    /// File the log is appended to.
    #[arg(long, default_value = "pg_backuper.log")]
    pub log_file: PathBuf,

    /// Simulative backup run.
    #[arg(long)]
    pub dry_run: bool,
}
