use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use tessera_backup::BackupConfig;

use crate::commands::{Backup, Log, Members, Payments, Reports, Settings, Snapshots};

#[derive(Parser, Debug)]
#[clap(name = "tessera", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[clap(long, env = "TESSERA_DB", default_value = "members.sqlite3")]
    pub members_db: String,

    /// Directory receiving the dated backup folders
    #[clap(long, env = "TESSERA_BACKUP_DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Back up automatically after changes
    #[clap(long, env = "TESSERA_AUTO_BACKUP")]
    pub auto_backup: bool,

    /// Seconds without changes before an automatic backup
    #[clap(long, default_value_t = 5)]
    pub debounce_secs: u64,

    /// Number of backup folders to keep
    #[clap(long, default_value_t = 3)]
    pub retention: usize,

    #[clap(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn init() -> Self {
        Self::parse()
    }

    pub fn backup_config(&self) -> BackupConfig {
        BackupConfig {
            debounce: Duration::from_secs(self.debounce_secs),
            retention: self.retention,
            auto_backup: self.auto_backup,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage members
    #[clap(subcommand)]
    Members(Members),
    /// Manage payments
    #[clap(subcommand)]
    Payments(Payments),
    /// Read and write settings
    #[clap(subcommand)]
    Settings(Settings),
    /// Membership reports
    #[clap(subcommand)]
    Reports(Reports),
    /// Export and import snapshots
    #[clap(subcommand, name = "snapshot")]
    Snapshot(Snapshots),
    /// Backups to the backup directory
    #[clap(subcommand)]
    Backup(Backup),
    /// Inspect the change log
    #[clap(subcommand)]
    Log(Log),
}

impl Command {
    /// Does the command only read?
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Command::Reports(_) | Command::Backup(_) | Command::Log(Log::List(_))
        )
    }
}
