use anyhow::{anyhow, Result};
use sqlx::{sqlite::SqliteConnection, Connection as SqlConnection, Executor};
use tracing::info;

/// A schema step. Migrations are applied in order, once, when the
/// ledger is opened; the applied version is kept in `user_version`.
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "members and payments",
        sql: r#"
            CREATE TABLE members (
                id                      INTEGER PRIMARY KEY,
                surname                 TEXT    NOT NULL,
                given_name              TEXT    NOT NULL DEFAULT '',
                birth_date              TEXT,
                birthplace              TEXT,
                group_name              TEXT    NOT NULL DEFAULT '',
                first_registration_year INTEGER,
                notes                   TEXT    NOT NULL DEFAULT ''
            );
            CREATE INDEX members_name_idx ON members (surname, given_name);

            CREATE TABLE payments (
                payment_id   TEXT    PRIMARY KEY,
                member_id    INTEGER NOT NULL
                             REFERENCES members (id) ON DELETE CASCADE,
                year         INTEGER NOT NULL,
                payment_date TEXT,
                amount       REAL    NOT NULL DEFAULT 0,
                receipt_no   INTEGER NOT NULL DEFAULT 0,
                booklet_no   INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX payments_member_idx ON payments (member_id, year);
            CREATE INDEX payments_year_idx ON payments (year);
        "#,
    },
    Migration {
        version: 2,
        description: "settings",
        sql: r#"
            CREATE TABLE settings (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 3,
        description: "change log",
        sql: r#"
            CREATE TABLE change_log (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name   TEXT NOT NULL,
                record_id    TEXT NOT NULL,
                change_type  TEXT NOT NULL,
                timestamp    TEXT NOT NULL,
                before_state TEXT,
                after_state  TEXT
            );
            CREATE INDEX change_log_record_idx ON change_log (table_name, record_id);
        "#,
    },
];

/// The schema version a fully migrated ledger has.
pub const SCHEMA_VERSION: u32 = 3;

/// Read the applied schema version.
pub async fn version(conn: &mut SqliteConnection) -> Result<u32> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await?;
    Ok(version as u32)
}

/// Install the database schema by applying all pending migrations.
/// Returns the resulting schema version.
pub async fn install(conn: &mut SqliteConnection) -> Result<u32> {
    let current = version(conn).await?;
    if current > SCHEMA_VERSION {
        return Err(anyhow!(
            "database schema version {} is newer than supported version {}",
            current,
            SCHEMA_VERSION
        ));
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        let mut tx = conn.begin().await?;
        (&mut *tx).execute(migration.sql).await?;
        (&mut *tx)
            .execute(format!("PRAGMA user_version = {}", migration.version).as_str())
            .await?;
        tx.commit().await?;
    }

    version(conn).await
}
