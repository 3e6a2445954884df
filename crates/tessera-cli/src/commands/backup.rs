use anyhow::Result;
use clap::Subcommand;

use tessera_backup::BackupCoordinator;
use tessera_db::Connection;

use crate::formatting::PrintFormatted;

#[derive(Subcommand, Debug)]
pub enum Backup {
    /// Back up the ledger now
    #[clap(name = "now")]
    Now,
    /// List the backup folders
    #[clap(name = "list")]
    List,
    /// Show access to the backup directory and the latest backup
    #[clap(name = "status")]
    Status,
}

impl Backup {
    pub async fn run(self, coordinator: &BackupCoordinator<Connection>) -> Result<()> {
        match self {
            Backup::Now => {
                if let Some(folder) = coordinator.perform_backup(true).await? {
                    println!("Backup written to {}.", folder);
                }
            }
            Backup::List => {
                let folders = coordinator.backups().await?;
                println!("{} backups.", folders.len());
                for folder in folders {
                    println!("{}", folder);
                }
            }
            Backup::Status => {
                coordinator.refresh_status().await.print_formatted();
            }
        }
        Ok(())
    }
}
