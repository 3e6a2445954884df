use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use inquire::Confirm;

use tessera_data::parse_id;
use tessera_db::Connection;
use tessera_snapshot::{export_single_member, export_snapshot, import_snapshot, Snapshot};

#[derive(Subcommand, Debug)]
pub enum Snapshots {
    /// Export the whole ledger
    #[clap(name = "export")]
    Export(ExportSnapshot),
    /// Replace the ledger with a snapshot
    #[clap(name = "import")]
    Import(ImportSnapshot),
    /// Export a single member with its payments
    #[clap(name = "export-member")]
    ExportMember(ExportMember),
}

impl Snapshots {
    pub async fn run(self, db: &Connection) -> Result<()> {
        match self {
            Snapshots::Export(cmd) => cmd.run(db).await,
            Snapshots::Import(cmd) => cmd.run(db).await,
            Snapshots::ExportMember(cmd) => cmd.run(db).await,
        }
    }
}

async fn write_snapshot(snapshot: &Snapshot, output: &PathBuf) -> Result<()> {
    tokio::fs::write(output, snapshot.to_bytes()?).await?;
    println!(
        "{} members and {} payments written to {}.",
        snapshot.members().len(),
        snapshot.payments.len(),
        output.display()
    );
    Ok(())
}

#[derive(Args, Debug)]
pub struct ExportSnapshot {
    #[clap(short, long)]
    pub output: PathBuf,
}

impl ExportSnapshot {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let snapshot = export_snapshot(db).await?;
        write_snapshot(&snapshot, &self.output).await
    }
}

#[derive(Args, Debug)]
pub struct ExportMember {
    #[clap(short, long, value_parser = parse_id)]
    pub id: u32,
    #[clap(short, long)]
    pub output: PathBuf,
}

impl ExportMember {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let snapshot = export_single_member(db, self.id).await?;
        write_snapshot(&snapshot, &self.output).await
    }
}

#[derive(Args, Debug)]
pub struct ImportSnapshot {
    #[clap(short, long)]
    pub input: PathBuf,
}

impl ImportSnapshot {
    pub async fn run(self, db: &Connection) -> Result<()> {
        let bytes = tokio::fs::read(&self.input).await?;
        let snapshot = Snapshot::from_bytes(&bytes)?;

        println!();
        println!("Members:\t\t{}", snapshot.members().len());
        println!("Payments:\t\t{}", snapshot.payments.len());
        println!("Settings:\t\t{}", snapshot.settings.len());
        println!("Change log:\t\t{}", snapshot.change_log.len());
        if let Some(version) = snapshot.schema_version() {
            println!("Schema version:\t\t{}", version);
        }
        if let Some(exported) = snapshot.export_timestamp() {
            println!("Exported:\t\t{}", exported);
        }
        println!();

        if !db.is_empty().await? {
            let confirm = Confirm::new("Replace all data with the snapshot?")
                .with_default(false);
            if !confirm.prompt()? {
                return Ok(());
            }
        }

        let summary = import_snapshot(db, snapshot).await?;
        println!(
            "Imported {} members and {} payments.",
            summary.members, summary.payments
        );
        Ok(())
    }
}
