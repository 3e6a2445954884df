use anyhow::Result;
use clap::{Args, Subcommand};
use inquire::Confirm;

use tessera_data::{ChangeLogEntry, ChangeLogFilter, Query};
use tessera_db::Connection;

use crate::formatting::PrintFormatted;

#[derive(Subcommand, Debug)]
pub enum Log {
    /// List change log entries
    #[clap(name = "list")]
    List(ListLog),
    /// Keep only the latest entry per record
    #[clap(name = "compact")]
    Compact,
}

impl Log {
    pub async fn run(self, db: &Connection) -> Result<()> {
        match self {
            Log::List(cmd) => cmd.run(db).await,
            Log::Compact => {
                let confirm = Confirm::new("Compact the change log?").with_default(true);
                if !confirm.prompt()? {
                    return Ok(());
                }
                let removed = db.compact_change_log().await?;
                println!("{} entries removed.", removed);
                Ok(())
            }
        }
    }
}

#[derive(Args, Debug)]
pub struct ListLog {
    /// members, payments, settings or snapshot
    #[clap(short, long)]
    pub table: Option<String>,
    #[clap(short, long)]
    pub record_id: Option<String>,
}

impl ListLog {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let filter = ChangeLogFilter {
            table: self.table,
            record_id: self.record_id,
        };
        let entries: Vec<ChangeLogEntry> = db.query(&filter).await?;
        println!("{} entries.", entries.len());
        entries.print_formatted();
        Ok(())
    }
}
