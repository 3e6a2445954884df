use std::sync::Arc;

use anyhow::Result;
use tokio::sync::oneshot;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tessera_backup::{BackupCoordinator, LocalStorage, Storage};
use tessera_db::Connection;

mod cli;
mod commands;
mod formatting;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::init();

    let conn = Connection::open(&cli.members_db).await?;
    let storage = cli
        .backup_dir
        .clone()
        .map(|dir| Arc::new(LocalStorage::new(dir)) as Arc<dyn Storage>);
    let coordinator = Arc::new(BackupCoordinator::new(
        conn.clone(),
        storage,
        cli.backup_config(),
    ));

    // Changes made by this invocation are backed up before exit
    let (stop, stopped) = oneshot::channel::<()>();
    let watcher = if cli.auto_backup && !cli.command.is_read_only() {
        let coordinator = coordinator.clone();
        let events = conn.subscribe();
        Some(tokio::spawn(async move {
            coordinator
                .run_until(events, async {
                    let _ = stopped.await;
                })
                .await
        }))
    } else {
        None
    };

    debug!(command = ?cli.command, "dispatching");
    let result = match cli.command {
        Command::Members(cmd) => cmd.run(&conn).await,
        Command::Payments(cmd) => cmd.run(&conn).await,
        Command::Settings(cmd) => cmd.run(&conn).await,
        Command::Reports(cmd) => cmd.run(&conn).await,
        Command::Snapshot(cmd) => cmd.run(&conn).await,
        Command::Backup(cmd) => cmd.run(&coordinator).await,
        Command::Log(cmd) => cmd.run(&conn).await,
    };

    let _ = stop.send(());
    if let Some(watcher) = watcher {
        watcher.await?;
    }

    result
}
