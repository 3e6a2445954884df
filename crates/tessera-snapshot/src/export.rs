use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use sqlx::Connection as SqlConnection;
use tracing::info;

use tessera_data::{Member, MemberFilter, Payment, PaymentFilter, Retrieve};
use tessera_db::{changelog, members, payments, settings, Connection, SCHEMA_VERSION};

use crate::{
    ChangeLogRecord,
    MetadataRecord,
    SettingRecord,
    Snapshot,
    SnapshotError,
    META_APP_VERSION,
    META_EXPORT_TIMESTAMP,
    META_SCHEMA_VERSION,
};

fn metadata() -> Vec<MetadataRecord> {
    vec![
        MetadataRecord {
            key: META_SCHEMA_VERSION.to_string(),
            value: Value::from(SCHEMA_VERSION),
        },
        MetadataRecord {
            key: META_EXPORT_TIMESTAMP.to_string(),
            value: Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        },
        MetadataRecord {
            key: META_APP_VERSION.to_string(),
            value: Value::from(env!("CARGO_PKG_VERSION")),
        },
    ]
}

/// Export the whole ledger. All tables are read in one transaction.
pub async fn export_snapshot(db: &Connection) -> Result<Snapshot, SnapshotError> {
    let (members, payments, settings, change_log) = {
        let mut conn = db.lock().await;
        let mut tx = conn.begin().await?;
        let members = members::fetch(&mut tx, &MemberFilter::default()).await?;
        let payments = payments::fetch(&mut tx, &PaymentFilter::default()).await?;
        let settings = settings::fetch_rows(&mut tx).await?;
        let change_log = changelog::fetch_rows(&mut tx, &Default::default()).await?;
        tx.commit().await?;
        (members, payments, settings, change_log)
    };

    let settings = settings
        .into_iter()
        .map(|row| SettingRecord {
            key: row.key,
            value_encoded: row.value,
            updated_at: row.updated_at,
        })
        .collect();
    let change_log = change_log
        .into_iter()
        .map(|row| ChangeLogRecord {
            id: row.id,
            table: row.table_name,
            change_type: row.change_type,
            record_id: row.record_id,
            timestamp: row.timestamp,
            after_encoded: row.after_state,
        })
        .collect();

    let snapshot = Snapshot {
        members: Some(members),
        payments,
        settings,
        change_log,
        metadata: metadata(),
    };
    info!(
        members = snapshot.members().len(),
        payments = snapshot.payments.len(),
        "snapshot exported"
    );
    Ok(snapshot)
}

/// Export one member with its payments only.
pub async fn export_single_member(
    db: &Connection,
    member_id: u32,
) -> Result<Snapshot, SnapshotError> {
    let member: Member = db.retrieve(member_id).await?;
    let payments: Vec<Payment> = member.get_payments(db).await?;

    Ok(Snapshot {
        members: Some(vec![member]),
        payments,
        metadata: metadata(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use tessera_data::{Insert, SettingValue};
    use tessera_db::connection;

    #[tokio::test]
    async fn test_export_snapshot() {
        let (_handle, db) = connection::open_test().await;
        let member = db
            .insert(Member {
                surname: "Rossi".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        db.insert(Payment {
            member_id: member.id,
            year: 2024,
            amount: 25.0,
            ..Default::default()
        })
        .await
        .unwrap();
        db.put_setting("custom_groups", SettingValue::List(vec![]))
            .await
            .unwrap();

        let snapshot = export_snapshot(&db).await.unwrap();
        assert_eq!(snapshot.members().len(), 1);
        assert_eq!(snapshot.payments.len(), 1);
        assert_eq!(snapshot.settings.len(), 1);
        assert_eq!(snapshot.settings[0].value_encoded, "[]");
        assert_eq!(snapshot.change_log.len(), 3);
        assert_eq!(snapshot.schema_version(), Some(SCHEMA_VERSION));
        assert!(snapshot.export_timestamp().is_some());
        assert!(snapshot.metadata_value(META_APP_VERSION).is_some());
    }

    #[tokio::test]
    async fn test_export_single_member() {
        let (_handle, db) = connection::open_test().await;
        let mut ids = vec![];
        for surname in ["Rossi", "Bianchi"] {
            let member = db
                .insert(Member {
                    surname: surname.to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
            for year in [2023, 2024] {
                db.insert(Payment {
                    member_id: member.id,
                    year,
                    ..Default::default()
                })
                .await
                .unwrap();
            }
            ids.push(member.id);
        }

        let snapshot = export_single_member(&db, ids[1]).await.unwrap();
        assert_eq!(snapshot.members().len(), 1);
        assert_eq!(snapshot.members()[0].surname, "Bianchi");
        assert_eq!(snapshot.payments.len(), 2);
        assert!(snapshot.payments.iter().all(|p| p.member_id == ids[1]));
        assert!(snapshot.settings.is_empty());
        assert!(snapshot.change_log.is_empty());

        assert!(export_single_member(&db, 99).await.is_err());
    }
}
