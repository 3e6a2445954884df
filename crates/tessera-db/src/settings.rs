use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{sqlite::SqliteConnection, Connection as SqlConnection, FromRow, QueryBuilder, Sqlite};

use tessera_data::{
    ChangeEvent,
    ChangeType,
    Query,
    Retrieve,
    Setting,
    SettingValue,
    ValidationError,
    TABLE_SETTINGS,
};

use crate::{changelog, results::QueryError, Connection};

/// Setting row as stored, the value encoded as JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SettingRow> for Setting {
    type Error = anyhow::Error;

    fn try_from(row: SettingRow) -> Result<Self> {
        Ok(Setting {
            value: SettingValue::decode(&row.value)?,
            key: row.key,
            updated_at: row.updated_at,
        })
    }
}

pub async fn fetch_rows(conn: &mut SqliteConnection) -> Result<Vec<SettingRow>> {
    let rows: Vec<SettingRow> =
        sqlx::query_as("SELECT key, value, updated_at FROM settings ORDER BY key")
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows)
}

/// Bulk load setting rows.
pub async fn insert_rows(conn: &mut SqliteConnection, rows: &[SettingRow]) -> Result<()> {
    for chunk in rows.chunks(100) {
        let mut qry =
            QueryBuilder::<Sqlite>::new("INSERT INTO settings (key, value, updated_at) ");
        qry.push_values(chunk, |mut b, row| {
            b.push_bind(&row.key)
                .push_bind(&row.value)
                .push_bind(row.updated_at);
        });
        qry.build().execute(&mut *conn).await?;
    }
    Ok(())
}

#[async_trait]
impl Query<Setting> for Connection {
    type Filter = ();

    async fn query(&self, _filter: &Self::Filter) -> Result<Vec<Setting>> {
        let rows = {
            let mut conn = self.lock().await;
            fetch_rows(&mut conn).await?
        };
        rows.into_iter().map(Setting::try_from).collect()
    }
}

#[async_trait]
impl Retrieve<Setting> for Connection {
    type Key = String;

    async fn retrieve(&self, key: Self::Key) -> Result<Setting> {
        let row: Option<SettingRow> = {
            let mut conn = self.lock().await;
            sqlx::query_as("SELECT key, value, updated_at FROM settings WHERE key = ?")
                .bind(&key)
                .fetch_optional(&mut *conn)
                .await?
        };
        match row {
            Some(row) => Setting::try_from(row),
            None => Err(QueryError::RecordNotFound("setting", key).into()),
        }
    }
}

impl Connection {
    /// Get a setting value, falling back to the default when the
    /// key has never been written.
    pub async fn get_setting(&self, key: &str, default: SettingValue) -> Result<SettingValue> {
        let found: Result<Setting> = self.retrieve(key.to_string()).await;
        match found {
            Ok(setting) => Ok(setting.value),
            Err(err) => match err.downcast_ref::<QueryError>() {
                Some(QueryError::RecordNotFound(..)) => Ok(default),
                _ => Err(err),
            },
        }
    }

    /// Write a setting value.
    pub async fn put_setting(&self, key: &str, value: SettingValue) -> Result<Setting> {
        if key.trim().is_empty() {
            return Err(ValidationError::MissingField("key").into());
        }
        let setting = Setting {
            key: key.to_string(),
            value,
            updated_at: Utc::now(),
        };
        let encoded = setting.value.encode()?;

        let entry = {
            let mut conn = self.lock().await;
            let mut tx = conn.begin().await?;
            let before: Option<SettingRow> =
                sqlx::query_as("SELECT key, value, updated_at FROM settings WHERE key = ?")
                    .bind(key)
                    .fetch_optional(&mut *tx)
                    .await?;
            let before = before.map(Setting::try_from).transpose()?;

            sqlx::query(
                r#"
                INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                ON CONFLICT (key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(&encoded)
            .bind(setting.updated_at)
            .execute(&mut *tx)
            .await?;

            let change_type = if before.is_some() {
                ChangeType::Update
            } else {
                ChangeType::Create
            };
            let entry = changelog::append(
                &mut tx,
                TABLE_SETTINGS,
                key,
                change_type,
                before.map(|b| json!(b)),
                Some(json!(setting)),
            )
            .await?;
            tx.commit().await?;
            entry
        };
        self.notify(ChangeEvent::from(&entry));
        Ok(setting)
    }
}
