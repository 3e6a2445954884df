use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqliteConnection, FromRow, QueryBuilder, Sqlite};
use tracing::{debug, warn};

use tessera_data::{ChangeLogEntry, ChangeLogFilter, ChangeType, Query};

use crate::{results::Id, Connection};

/// Change log row as stored. States are JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct ChangeLogRow {
    pub id: i64,
    pub table_name: String,
    pub record_id: String,
    pub change_type: String,
    pub timestamp: DateTime<Utc>,
    pub before_state: Option<String>,
    pub after_state: Option<String>,
}

impl TryFrom<ChangeLogRow> for ChangeLogEntry {
    type Error = anyhow::Error;

    fn try_from(row: ChangeLogRow) -> Result<Self> {
        let decode = |state: Option<String>| -> Result<Option<Value>> {
            state.map(|s| serde_json::from_str(&s)).transpose().map_err(Into::into)
        };
        Ok(ChangeLogEntry {
            id: row.id,
            table: row.table_name,
            record_id: row.record_id,
            change_type: row.change_type.parse()?,
            timestamp: row.timestamp,
            before: decode(row.before_state)?,
            after: decode(row.after_state)?,
        })
    }
}

/// Append an entry to the change log. Callers pass the transaction
/// of the mutation so that the entry commits with it.
pub async fn append(
    conn: &mut SqliteConnection,
    table: &str,
    record_id: &str,
    change_type: ChangeType,
    before: Option<Value>,
    after: Option<Value>,
) -> Result<ChangeLogEntry> {
    let timestamp = Utc::now();
    let before_state = before.as_ref().map(|v| v.to_string());
    let after_state = after.as_ref().map(|v| v.to_string());

    let mut qry = QueryBuilder::<Sqlite>::new(
        r#"INSERT INTO change_log (
            table_name,
            record_id,
            change_type,
            timestamp,
            before_state,
            after_state
        ) VALUES (
        "#,
    );
    qry.separated(", ")
        .push_bind(table)
        .push_bind(record_id)
        .push_bind(change_type.to_string())
        .push_bind(timestamp)
        .push_bind(before_state)
        .push_bind(after_state);
    let insert: Id<i64> = qry
        .push(") RETURNING id")
        .build_query_as()
        .fetch_one(&mut *conn)
        .await?;
    let id = insert.id;

    Ok(ChangeLogEntry {
        id,
        table: table.to_string(),
        record_id: record_id.to_string(),
        change_type,
        timestamp,
        before,
        after,
    })
}

/// Fetch change log rows in sequence order.
pub async fn fetch_rows(
    conn: &mut SqliteConnection,
    filter: &ChangeLogFilter,
) -> Result<Vec<ChangeLogRow>> {
    let mut qry = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT
            id,
            table_name,
            record_id,
            change_type,
            timestamp,
            before_state,
            after_state
        FROM change_log
        WHERE 1
        "#,
    );
    if let Some(table) = &filter.table {
        qry.push(" AND table_name = ").push_bind(table.clone());
    }
    if let Some(record_id) = &filter.record_id {
        qry.push(" AND record_id = ").push_bind(record_id.clone());
    }
    qry.push(" ORDER BY id");

    let rows: Vec<ChangeLogRow> = qry.build_query_as().fetch_all(&mut *conn).await?;
    Ok(rows)
}

/// Bulk load change log rows, keeping their ids.
pub async fn insert_rows(conn: &mut SqliteConnection, rows: &[ChangeLogRow]) -> Result<()> {
    for chunk in rows.chunks(100) {
        let mut qry = QueryBuilder::<Sqlite>::new(
            "INSERT INTO change_log (id, table_name, record_id, change_type, \
             timestamp, before_state, after_state) ",
        );
        qry.push_values(chunk, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(&row.table_name)
                .push_bind(&row.record_id)
                .push_bind(&row.change_type)
                .push_bind(row.timestamp)
                .push_bind(&row.before_state)
                .push_bind(&row.after_state);
        });
        qry.build().execute(&mut *conn).await?;
    }
    Ok(())
}

#[async_trait]
impl Query<ChangeLogEntry> for Connection {
    type Filter = ChangeLogFilter;

    async fn query(&self, filter: &Self::Filter) -> Result<Vec<ChangeLogEntry>> {
        let rows = {
            let mut conn = self.lock().await;
            fetch_rows(&mut conn, filter).await?
        };
        rows.into_iter().map(ChangeLogEntry::try_from).collect()
    }
}

impl Connection {
    /// Reduce the change log to the latest entry per (table, record).
    /// Returns the number of removed entries.
    pub async fn compact_change_log(&self) -> Result<u64> {
        let mut conn = self.lock().await;
        let result = sqlx::query(
            r#"
            DELETE FROM change_log
            WHERE id NOT IN (
                SELECT MAX(id) FROM change_log
                GROUP BY table_name, record_id
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;
        let removed = result.rows_affected();
        debug!(removed, "change log compacted");
        Ok(removed)
    }

    /// Compact the change log as maintenance: failures are logged
    /// and swallowed.
    pub async fn compact_change_log_best_effort(&self) {
        if let Err(err) = self.compact_change_log().await {
            warn!(error = %err, "change log compaction failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use tessera_data::{Delete, Insert, Member, Update, TABLE_MEMBERS};

    use super::*;
    use crate::connection;

    #[tokio::test]
    async fn test_mutations_append_one_entry_each() {
        let (_handle, db) = connection::open_test().await;
        let member = db
            .insert(Member {
                surname: "Rossi".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let mut update = member.clone();
        update.notes = "moved".to_string();
        db.update(update).await.unwrap();
        Delete::<Member>::delete(&db, member.id).await.unwrap();

        let log: Vec<ChangeLogEntry> = db.query(&ChangeLogFilter::default()).await.unwrap();
        assert_eq!(log.len(), 3);
        let types: Vec<ChangeType> = log.iter().map(|e| e.change_type).collect();
        assert_eq!(
            types,
            vec![ChangeType::Create, ChangeType::Update, ChangeType::Delete]
        );
        assert!(log.iter().all(|e| e.table == TABLE_MEMBERS));
        assert!(log[0].before.is_none());
        assert_eq!(log[1].before.as_ref().unwrap()["notes"], "");
        assert_eq!(log[1].after.as_ref().unwrap()["notes"], "moved");
        assert!(log[2].after.is_none());
    }

    #[tokio::test]
    async fn test_compaction_keeps_latest_per_record() {
        let (_handle, db) = connection::open_test().await;
        let a = db
            .insert(Member {
                surname: "Rossi".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let b = db
            .insert(Member {
                surname: "Verdi".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        for notes in ["one", "two", "three"] {
            let mut m = a.clone();
            m.notes = notes.to_string();
            db.update(m).await.unwrap();
        }

        let removed = db.compact_change_log().await.unwrap();
        assert_eq!(removed, 3);

        let log: Vec<ChangeLogEntry> = db.query(&ChangeLogFilter::default()).await.unwrap();
        assert_eq!(log.len(), 2);
        let latest_a = log.iter().find(|e| e.record_id == a.id.to_string()).unwrap();
        assert_eq!(latest_a.after.as_ref().unwrap()["notes"], "three");
        assert!(log.iter().any(|e| e.record_id == b.id.to_string()));
    }
}
