use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection},
    Connection as SqlConnection,
};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, info};

use tessera_data::ChangeEvent;

use crate::schema;

/// Capacity of the change event channel. Slow subscribers
/// lag behind and are told how many events they missed.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A thread safe connection to the ledger database.
///
/// Cloning is cheap; all clones share the same SQLite connection
/// and the same change event channel.
#[derive(Clone)]
pub struct Connection {
    conn: Arc<Mutex<SqliteConnection>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Connection {
    /// Open (or create) the database and apply pending migrations.
    pub async fn open(filename: &str) -> Result<Connection> {
        let opts = SqliteConnectOptions::new()
            .filename(filename)
            .create_if_missing(true)
            .foreign_keys(true);
        let mut conn = SqliteConnection::connect_with(&opts).await?;
        let version = schema::install(&mut conn).await?;
        info!(filename, schema_version = version, "ledger opened");

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Connection {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        })
    }

    /// Acquire exclusive access to the underlying connection.
    pub async fn lock(&self) -> MutexGuard<'_, SqliteConnection> {
        self.conn.lock().await
    }

    /// Subscribe to committed ledger changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    /// Publish a committed change. Having no subscribers is fine.
    pub fn notify(&self, event: ChangeEvent) {
        debug!(
            table = %event.table,
            record_id = %event.record_id,
            change_type = %event.change_type,
            "ledger changed"
        );
        let _ = self.changes.send(event);
    }

    /// The ledger is empty when there are no members. A fresh
    /// installation starts with an import.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.count_members().await? == 0)
    }

    pub async fn count_members(&self) -> Result<u64> {
        let mut conn = self.lock().await;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members")
            .fetch_one(&mut *conn)
            .await?;
        Ok(count as u64)
    }
}

pub struct TestHandle {
    filename: String,
}

impl Drop for TestHandle {
    fn drop(&mut self) {
        let path = Path::new(&self.filename);
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }
}

/// Open a new test database connection.
/// The database will be created on each open.
pub async fn open_test() -> (TestHandle, Connection) {
    let filename = std::env::temp_dir()
        .join(format!("tessera_test_{}.sqlite3", rand::random::<u64>()))
        .to_string_lossy()
        .to_string();
    let handle = TestHandle {
        filename: filename.clone(),
    };
    let conn = Connection::open(&filename).await.unwrap();

    (handle, conn)
}
