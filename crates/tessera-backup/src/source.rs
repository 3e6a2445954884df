use anyhow::Result;
use async_trait::async_trait;

use tessera_db::Connection;
use tessera_snapshot::export_snapshot;

/// Produces the content of a backup.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot_bytes(&self) -> Result<Vec<u8>>;
}

#[async_trait]
impl SnapshotSource for Connection {
    /// Compact the change log, then export the ledger.
    async fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        self.compact_change_log_best_effort().await;
        let snapshot = export_snapshot(self).await?;
        Ok(snapshot.to_bytes()?)
    }
}
