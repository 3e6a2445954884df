use std::collections::HashSet;

use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{sqlite::SqliteConnection, Connection as SqlConnection};
use tracing::{debug, info};

use tessera_data::{
    ChangeEvent,
    ChangeType,
    Member,
    Payment,
    SettingValue,
    ValidationError,
    TABLE_SNAPSHOT,
};
use tessera_db::{
    changelog::{self, ChangeLogRow},
    members,
    payments,
    settings::{self, SettingRow},
    Connection,
    SCHEMA_VERSION,
};

use crate::{Snapshot, SnapshotError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub members: usize,
    pub payments: usize,
    pub settings: usize,
    pub change_log: usize,
}

/// Rows ready to be loaded, checked against each other.
struct Prepared {
    members: Vec<Member>,
    payments: Vec<Payment>,
    settings: Vec<SettingRow>,
    change_log: Vec<ChangeLogRow>,
}

fn prepare(snapshot: Snapshot) -> Result<Prepared, SnapshotError> {
    if let Some(found) = snapshot.schema_version() {
        if found > SCHEMA_VERSION {
            return Err(SnapshotError::NewerSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }
    }
    let members = snapshot.members.ok_or(SnapshotError::MissingMembers)?;

    let mut member_ids = HashSet::new();
    for member in &members {
        if member.id == 0 {
            return Err(ValidationError::MissingId.into());
        }
        member.validate()?;
        if !member_ids.insert(member.id) {
            return Err(SnapshotError::DuplicateKey("member", member.id.to_string()));
        }
    }

    let mut payment_ids = HashSet::new();
    let mut payments = snapshot.payments;
    for payment in payments.iter_mut() {
        payment.validate()?;
        if !member_ids.contains(&payment.member_id) {
            return Err(SnapshotError::DanglingPayment {
                payment_id: payment.payment_id.clone(),
                member_id: payment.member_id,
            });
        }
        if payment.payment_id.is_empty() {
            payment.payment_id = payments::new_payment_id();
        }
        if !payment_ids.insert(payment.payment_id.clone()) {
            return Err(SnapshotError::DuplicateKey(
                "payment",
                payment.payment_id.clone(),
            ));
        }
    }

    let mut setting_keys = HashSet::new();
    let mut settings = vec![];
    for record in snapshot.settings {
        if !setting_keys.insert(record.key.clone()) {
            return Err(SnapshotError::DuplicateKey("setting", record.key));
        }
        // Values written as plain text are kept as text.
        let value = match SettingValue::decode(&record.value_encoded) {
            Ok(_) => record.value_encoded,
            Err(_) => {
                debug!(key = %record.key, "setting value is not encoded, keeping text");
                SettingValue::Text(record.value_encoded).encode()?
            }
        };
        settings.push(SettingRow {
            key: record.key,
            value,
            updated_at: record.updated_at,
        });
    }

    // Sequence ids are renumbered, keeping the recorded order.
    let mut records = snapshot.change_log;
    records.sort_by_key(|r| r.id);
    let mut change_log = Vec::with_capacity(records.len());
    for (idx, r) in records.into_iter().enumerate() {
        let change_type: ChangeType = r.change_type.parse()?;
        if let Some(encoded) = &r.after_encoded {
            serde_json::from_str::<Value>(encoded)?;
        }
        change_log.push(ChangeLogRow {
            id: idx as i64 + 1,
            table_name: r.table,
            record_id: r.record_id,
            change_type: change_type.to_string(),
            timestamp: r.timestamp,
            before_state: None,
            after_state: r.after_encoded,
        });
    }

    Ok(Prepared {
        members,
        payments,
        settings,
        change_log,
    })
}

async fn wipe(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for table in ["change_log", "payments", "members", "settings"] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Replace the ledger with the content of a snapshot.
///
/// The snapshot is validated before anything is touched. Wiping and
/// loading happen in one transaction while the connection is held,
/// so on failure the previous state is kept and no reader observes
/// a partially loaded ledger.
pub async fn import_snapshot(
    db: &Connection,
    snapshot: Snapshot,
) -> Result<ImportSummary, SnapshotError> {
    let prepared = prepare(snapshot)?;
    let summary = ImportSummary {
        members: prepared.members.len(),
        payments: prepared.payments.len(),
        settings: prepared.settings.len(),
        change_log: prepared.change_log.len(),
    };

    let entry = {
        let mut conn = db.lock().await;
        let mut tx = conn.begin().await?;
        wipe(&mut tx).await?;
        members::insert_rows(&mut tx, &prepared.members).await?;
        payments::insert_rows(&mut tx, &prepared.payments).await?;
        settings::insert_rows(&mut tx, &prepared.settings).await?;
        changelog::insert_rows(&mut tx, &prepared.change_log).await?;
        let entry = changelog::append(
            &mut tx,
            TABLE_SNAPSHOT,
            "import",
            ChangeType::Create,
            None,
            Some(json!(summary)),
        )
        .await?;
        tx.commit().await?;
        entry
    };
    db.notify(ChangeEvent::from(&entry));

    info!(
        members = summary.members,
        payments = summary.payments,
        settings = summary.settings,
        change_log = summary.change_log,
        "snapshot imported"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::{
        export_snapshot,
        ChangeLogRecord,
        MetadataRecord,
        SettingRecord,
        META_SCHEMA_VERSION,
    };

    use tessera_data::{
        ChangeLogEntry,
        ChangeLogFilter,
        Insert,
        MemberFilter,
        PaymentFilter,
        Query,
        SETTING_CUSTOM_GROUPS,
    };
    use tessera_db::connection;

    async fn populate(db: &Connection) {
        let members = [
            ("Rossi", "Mario", Some((1980, 5, 15)), "alfa"),
            ("Bianchi", "Anna", Some((2012, 1, 3)), "Beta"),
            ("Verdi", "Luca", None, ""),
        ];
        for (surname, given_name, birth, group) in members {
            let member = db
                .insert(Member {
                    surname: surname.to_string(),
                    given_name: given_name.to_string(),
                    birth_date: birth.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
                    birthplace: Some("Gubbio".to_string()),
                    group: group.to_string(),
                    first_registration_year: Some(2019),
                    notes: "note".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
            for year in [2022, 2024] {
                db.insert(Payment {
                    member_id: member.id,
                    year,
                    payment_date: NaiveDate::from_ymd_opt(year, 3, 1),
                    amount: 20.5,
                    receipt_no: 4,
                    booklet_no: 1,
                    ..Default::default()
                })
                .await
                .unwrap();
            }
        }
        db.put_setting(
            SETTING_CUSTOM_GROUPS,
            SettingValue::List(vec![SettingValue::from("Gamma")]),
        )
        .await
        .unwrap();
    }

    async fn contents(db: &Connection) -> (HashMap<u32, Member>, HashMap<String, Payment>) {
        let members: Vec<Member> = db.query(&MemberFilter::default()).await.unwrap();
        let payments: Vec<Payment> = db.query(&PaymentFilter::default()).await.unwrap();
        (
            members.into_iter().map(|m| (m.id, m)).collect(),
            payments
                .into_iter()
                .map(|p| (p.payment_id.clone(), p))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_h1, source) = connection::open_test().await;
        populate(&source).await;
        let bytes = export_snapshot(&source).await.unwrap().to_bytes().unwrap();

        let (_h2, target) = connection::open_test().await;
        let mut events = target.subscribe();
        let summary = import_snapshot(&target, Snapshot::from_bytes(&bytes).unwrap())
            .await
            .unwrap();
        assert_eq!(summary.members, 3);
        assert_eq!(summary.payments, 6);
        assert_eq!(summary.settings, 1);

        assert_eq!(contents(&source).await, contents(&target).await);
        let groups = target
            .get_setting(SETTING_CUSTOM_GROUPS, SettingValue::List(vec![]))
            .await
            .unwrap();
        assert_eq!(groups.as_string_list(), vec!["Gamma"]);

        let event = events.try_recv().unwrap();
        assert_eq!(event.table, TABLE_SNAPSHOT);
    }

    #[tokio::test]
    async fn test_import_replaces_existing_data() {
        let (_handle, db) = connection::open_test().await;
        populate(&db).await;

        let snapshot = Snapshot::from_bytes(
            br#"{"Members": [{"id": "12", "surname": "Neri"}],
                 "Payments": [{"payment_id": "", "member_id": 12, "year": 2024}]}"#,
        )
        .unwrap();
        import_snapshot(&db, snapshot).await.unwrap();

        let (members, payments) = contents(&db).await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[&12].surname, "Neri");
        assert_eq!(payments.len(), 1);
        assert!(payments.keys().all(|id| !id.is_empty()));

        // New members continue after the imported ids
        let next = db
            .insert(Member {
                surname: "Gialli".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(next.id, 13);
    }

    #[tokio::test]
    async fn test_rejected_import_keeps_state() {
        let (_handle, db) = connection::open_test().await;
        populate(&db).await;
        let before = contents(&db).await;

        let dangling = Snapshot::from_bytes(
            br#"{"Members": [{"id": 1, "surname": "Neri"}],
                 "Payments": [{"payment_id": "x", "member_id": 2, "year": 2024}]}"#,
        )
        .unwrap();
        let err = import_snapshot(&db, dangling).await.unwrap_err();
        assert!(matches!(err, SnapshotError::DanglingPayment { member_id: 2, .. }));

        let missing = Snapshot::from_bytes(br#"{"Payments": []}"#).unwrap();
        let err = import_snapshot(&db, missing).await.unwrap_err();
        assert!(matches!(err, SnapshotError::MissingMembers));

        let duplicate = Snapshot::from_bytes(
            br#"{"Members": [{"id": 1, "surname": "Neri"}, {"id": "1", "surname": "Neri"}]}"#,
        )
        .unwrap();
        let err = import_snapshot(&db, duplicate).await.unwrap_err();
        assert!(matches!(err, SnapshotError::DuplicateKey("member", _)));

        let newer = Snapshot {
            members: Some(vec![]),
            metadata: vec![MetadataRecord {
                key: META_SCHEMA_VERSION.to_string(),
                value: json!(SCHEMA_VERSION + 1),
            }],
            ..Default::default()
        };
        let err = import_snapshot(&db, newer).await.unwrap_err();
        assert!(matches!(err, SnapshotError::NewerSchema { .. }));

        let unnamed = Snapshot::from_bytes(br#"{"Members": [{"id": 1, "surname": " "}]}"#)
            .unwrap();
        let err = import_snapshot(&db, unnamed).await.unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Invalid(ValidationError::MissingField("surname"))
        ));

        let far_year = Snapshot::from_bytes(
            br#"{"Members": [{"id": 1, "surname": "Neri"}],
                 "Payments": [{"payment_id": "x", "member_id": 1, "year": 2000000}]}"#,
        )
        .unwrap();
        let err = import_snapshot(&db, far_year).await.unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Invalid(ValidationError::InvalidYear(2000000))
        ));

        assert_eq!(contents(&db).await, before);
    }

    #[tokio::test]
    async fn test_corrupt_change_log_is_rejected() {
        let (_handle, db) = connection::open_test().await;
        populate(&db).await;
        let before = contents(&db).await;
        let log_before: Vec<ChangeLogEntry> =
            db.query(&ChangeLogFilter::default()).await.unwrap();

        let snapshot = Snapshot {
            members: Some(vec![]),
            change_log: vec![ChangeLogRecord {
                id: 1,
                table: "members".to_string(),
                change_type: "create".to_string(),
                record_id: "1".to_string(),
                timestamp: chrono::Utc::now(),
                after_encoded: Some("{not json".to_string()),
            }],
            ..Default::default()
        };
        let err = import_snapshot(&db, snapshot).await.unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt(_)));

        assert_eq!(contents(&db).await, before);
        let log_after: Vec<ChangeLogEntry> =
            db.query(&ChangeLogFilter::default()).await.unwrap();
        assert_eq!(log_after.len(), log_before.len());
    }

    #[tokio::test]
    async fn test_failed_load_rolls_back() {
        let (_handle, db) = connection::open_test().await;
        populate(&db).await;
        let before = contents(&db).await;
        let log_before: Vec<ChangeLogEntry> =
            db.query(&ChangeLogFilter::default()).await.unwrap();

        // Settings rows can no longer be written, members and payments can
        {
            let mut conn = db.lock().await;
            sqlx::query("DROP TABLE settings")
                .execute(&mut *conn)
                .await
                .unwrap();
            sqlx::query("CREATE TABLE settings (key TEXT PRIMARY KEY)")
                .execute(&mut *conn)
                .await
                .unwrap();
        }

        let snapshot = Snapshot::from_bytes(
            br#"{"Members": [{"id": 7, "surname": "Neri"}],
                 "Payments": [{"payment_id": "x", "member_id": 7, "year": 2024}],
                 "Settings": [{"key": "motto", "value_encoded": "\"ciao\"",
                               "updated_at": "2024-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        let mut events = db.subscribe();
        let err = import_snapshot(&db, snapshot).await.unwrap_err();
        assert!(matches!(err, SnapshotError::Error(_)));

        assert_eq!(contents(&db).await, before);
        let log_after: Vec<ChangeLogEntry> =
            db.query(&ChangeLogFilter::default()).await.unwrap();
        assert_eq!(log_after.len(), log_before.len());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_plain_text_setting_is_kept() {
        let (_handle, db) = connection::open_test().await;
        let snapshot = Snapshot {
            members: Some(vec![]),
            settings: vec![SettingRecord {
                key: "motto".to_string(),
                value_encoded: "not json".to_string(),
                updated_at: chrono::Utc::now(),
            }],
            ..Default::default()
        };
        import_snapshot(&db, snapshot).await.unwrap();
        let value = db
            .get_setting("motto", SettingValue::from(""))
            .await
            .unwrap();
        assert_eq!(value, SettingValue::from("not json"));
    }
}
