//! Automatic and manual backups of the ledger to external storage.

mod storage;
pub use storage::{EntryKind, LocalStorage, MemoryStorage, Storage, StorageEntry, StorageError};

mod source;
pub use source::SnapshotSource;

mod coordinator;
pub use coordinator::*;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tessera_data::{Insert, Member};
    use tessera_db::connection;
    use tessera_snapshot::Snapshot;

    use super::*;

    #[tokio::test]
    async fn test_backup_ledger() {
        let (_handle, db) = connection::open_test().await;
        db.insert(Member {
            surname: "Rossi".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        let storage = MemoryStorage::new();
        let coordinator = BackupCoordinator::new(
            db.clone(),
            Some(Arc::new(storage.clone()) as Arc<dyn Storage>),
            BackupConfig::default(),
        );
        let folder = coordinator.perform_backup(true).await.unwrap().unwrap();

        let bytes = storage.read_file(&folder, BACKUP_FILE_NAME).await.unwrap();
        let snapshot = Snapshot::from_bytes(&bytes).unwrap();
        assert_eq!(snapshot.members().len(), 1);
        assert_eq!(snapshot.change_log.len(), 1);
    }

    #[tokio::test]
    async fn test_backup_to_local_storage() {
        let (_handle, db) = connection::open_test().await;
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let coordinator = BackupCoordinator::new(
            db,
            Some(Arc::new(storage) as Arc<dyn Storage>),
            BackupConfig::default(),
        );
        let folder = coordinator.perform_backup(true).await.unwrap().unwrap();
        assert!(tmp.path().join(folder).join(BACKUP_FILE_NAME).exists());
    }
}
