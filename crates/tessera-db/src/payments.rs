use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use sqlx::{sqlite::SqliteConnection, Connection as SqlConnection, QueryBuilder, Sqlite};
use tracing::info;
use uuid::Uuid;

use tessera_data::{
    ChangeEvent,
    ChangeType,
    Delete,
    Insert,
    Payment,
    PaymentFilter,
    Query,
    ReceiptKey,
    Retrieve,
    ValidationError,
    TABLE_PAYMENTS,
};

use crate::{changelog, members, results::QueryError, Connection};

/// Fetch payments, latest year first.
pub async fn fetch(conn: &mut SqliteConnection, filter: &PaymentFilter) -> Result<Vec<Payment>> {
    let mut qry = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT
            payment_id,
            member_id,
            year,
            payment_date,
            amount,
            receipt_no,
            booklet_no
        FROM payments
        WHERE 1
        "#,
    );
    if let Some(member_id) = filter.member_id {
        qry.push(" AND member_id = ").push_bind(member_id);
    }
    if let Some(year) = filter.year {
        qry.push(" AND year = ").push_bind(year);
    }
    if let Some(receipt_no) = filter.receipt_no {
        qry.push(" AND receipt_no = ").push_bind(receipt_no);
    }
    qry.push(" ORDER BY year DESC, member_id, payment_date, payment_id");

    let payments: Vec<Payment> = qry.build_query_as().fetch_all(&mut *conn).await?;
    Ok(payments)
}

/// Bulk load payments, keeping their ids.
pub async fn insert_rows(conn: &mut SqliteConnection, payments: &[Payment]) -> Result<()> {
    for chunk in payments.chunks(100) {
        let mut qry = QueryBuilder::<Sqlite>::new(
            "INSERT INTO payments (payment_id, member_id, year, payment_date, \
             amount, receipt_no, booklet_no) ",
        );
        qry.push_values(chunk, |mut b, p| {
            b.push_bind(&p.payment_id)
                .push_bind(p.member_id)
                .push_bind(p.year)
                .push_bind(p.payment_date)
                .push_bind(p.amount)
                .push_bind(p.receipt_no)
                .push_bind(p.booklet_no);
        });
        qry.build().execute(&mut *conn).await?;
    }
    Ok(())
}

/// Generate a new payment token.
pub fn new_payment_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl Query<Payment> for Connection {
    type Filter = PaymentFilter;

    async fn query(&self, filter: &Self::Filter) -> Result<Vec<Payment>> {
        let mut conn = self.lock().await;
        fetch(&mut conn, filter).await
    }
}

#[async_trait]
impl Retrieve<Payment> for Connection {
    type Key = String;

    async fn retrieve(&self, payment_id: Self::Key) -> Result<Payment> {
        let mut conn = self.lock().await;
        let payment: Option<Payment> = sqlx::query_as(
            r#"
            SELECT
                payment_id,
                member_id,
                year,
                payment_date,
                amount,
                receipt_no,
                booklet_no
            FROM payments
            WHERE payment_id = ?
            "#,
        )
        .bind(&payment_id)
        .fetch_optional(&mut *conn)
        .await?;
        payment.ok_or_else(|| QueryError::RecordNotFound("payment", payment_id).into())
    }
}

#[async_trait]
impl Insert<Payment> for Connection {
    /// Record a payment. A member has at most one payment per year.
    async fn insert(&self, payment: Payment) -> Result<Payment> {
        payment.validate()?;
        let payment = if payment.payment_id.trim().is_empty() {
            Payment {
                payment_id: new_payment_id(),
                ..payment
            }
        } else {
            payment
        };

        let entry = {
            let mut conn = self.lock().await;
            let mut tx = conn.begin().await?;

            // Member must exist
            members::fetch_one(&mut tx, payment.member_id).await?;

            let existing = fetch(
                &mut tx,
                &PaymentFilter {
                    member_id: Some(payment.member_id),
                    year: Some(payment.year),
                    ..Default::default()
                },
            )
            .await?;
            if !existing.is_empty() {
                return Err(ValidationError::DuplicatePayment {
                    member_id: payment.member_id,
                    year: payment.year,
                }
                .into());
            }

            insert_rows(&mut tx, std::slice::from_ref(&payment)).await?;

            let entry = changelog::append(
                &mut tx,
                TABLE_PAYMENTS,
                &payment.payment_id,
                ChangeType::Create,
                None,
                Some(json!(payment)),
            )
            .await?;
            tx.commit().await?;
            entry
        };
        info!(
            member_id = payment.member_id,
            year = payment.year,
            "payment recorded"
        );
        self.notify(ChangeEvent::from(&entry));

        self.retrieve(payment.payment_id).await
    }
}

#[async_trait]
impl Delete<Payment> for Connection {
    type Key = String;

    async fn delete(&self, payment_id: Self::Key) -> Result<Payment> {
        if payment_id.trim().is_empty() {
            return Err(ValidationError::MissingId.into());
        }
        let payment: Payment = self.retrieve(payment_id.clone()).await?;
        let entry = {
            let mut conn = self.lock().await;
            let mut tx = conn.begin().await?;
            let result = sqlx::query("DELETE FROM payments WHERE payment_id = ?")
                .bind(&payment_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(QueryError::RecordNotFound("payment", payment_id).into());
            }
            let entry = changelog::append(
                &mut tx,
                TABLE_PAYMENTS,
                &payment_id,
                ChangeType::Delete,
                Some(json!(payment)),
                None,
            )
            .await?;
            tx.commit().await?;
            entry
        };
        self.notify(ChangeEvent::from(&entry));
        Ok(payment)
    }
}

#[async_trait]
impl Delete<Vec<Payment>> for Connection {
    type Key = ReceiptKey;

    /// Delete all payments of a member written on one receipt for
    /// the given years. One change log entry covers the whole batch.
    async fn delete(&self, key: Self::Key) -> Result<Vec<Payment>> {
        if key.member_id == 0 {
            return Err(ValidationError::MissingId.into());
        }
        let (deleted, entry) = {
            let mut conn = self.lock().await;
            let mut tx = conn.begin().await?;
            let deleted: Vec<Payment> = fetch(
                &mut tx,
                &PaymentFilter {
                    member_id: Some(key.member_id),
                    receipt_no: Some(key.receipt_no),
                    ..Default::default()
                },
            )
            .await?
            .into_iter()
            .filter(|p| key.years.contains(&p.year))
            .collect();
            if deleted.is_empty() {
                return Err(QueryError::RecordNotFound("receipt", key.record_id()).into());
            }

            let mut qry =
                QueryBuilder::<Sqlite>::new("DELETE FROM payments WHERE payment_id IN (");
            let mut ids = qry.separated(", ");
            for p in &deleted {
                ids.push_bind(p.payment_id.clone());
            }
            qry.push(")").build().execute(&mut *tx).await?;

            let entry = changelog::append(
                &mut tx,
                TABLE_PAYMENTS,
                &key.record_id(),
                ChangeType::Delete,
                Some(json!(deleted)),
                None,
            )
            .await?;
            tx.commit().await?;
            (deleted, entry)
        };
        info!(
            member_id = key.member_id,
            receipt_no = key.receipt_no,
            count = deleted.len(),
            "receipt payments deleted"
        );
        self.notify(ChangeEvent::from(&entry));
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;
    use tessera_data::{ChangeLogEntry, ChangeLogFilter, Member};

    use super::*;
    use crate::connection;

    async fn member(db: &Connection) -> Member {
        db.insert(Member {
            surname: "Verdi".to_string(),
            given_name: "Giulia".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    fn payment(member_id: u32, year: i32, receipt_no: u32) -> Payment {
        Payment {
            member_id,
            year,
            payment_date: NaiveDate::from_ymd_opt(year, 1, 15),
            amount: 10.0,
            receipt_no,
            booklet_no: 301,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_payment_insert() {
        let (_handle, db) = connection::open_test().await;
        let m = member(&db).await;
        let p = db.insert(payment(m.id, 2023, 210)).await.unwrap();

        assert!(!p.payment_id.is_empty());
        assert_eq!(p.member_id, m.id);
        assert_eq!(p.year, 2023);
        assert_eq!(p.payment_date, NaiveDate::from_ymd_opt(2023, 1, 15));
        assert_eq!(p.amount, 10.0);
        assert_eq!(p.receipt_no, 210);
        assert_eq!(p.booklet_no, 301);
    }

    #[tokio::test]
    async fn test_payment_requires_existing_member() {
        let (_handle, db) = connection::open_test().await;
        let err = db.insert(payment(7, 2023, 1)).await.unwrap_err();
        assert!(err.downcast_ref::<QueryError>().is_some());
    }

    #[tokio::test]
    async fn test_payment_rejects_duplicate_year() {
        let (_handle, db) = connection::open_test().await;
        let m = member(&db).await;
        db.insert(payment(m.id, 2023, 210)).await.unwrap();
        let err = db.insert(payment(m.id, 2023, 211)).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::DuplicatePayment {
                member_id: m.id,
                year: 2023
            })
        );
    }

    #[tokio::test]
    async fn test_payments_by_member_sorted_by_year_desc() {
        let (_handle, db) = connection::open_test().await;
        let m = member(&db).await;
        for year in [2021, 2025, 2023] {
            db.insert(payment(m.id, year, 1)).await.unwrap();
        }
        let years: Vec<i32> = m
            .get_payments(&db)
            .await
            .unwrap()
            .iter()
            .map(|p| p.year)
            .collect();
        assert_eq!(years, vec![2025, 2023, 2021]);
    }

    #[tokio::test]
    async fn test_payment_delete() {
        let (_handle, db) = connection::open_test().await;
        let m = member(&db).await;
        let p = db.insert(payment(m.id, 2023, 210)).await.unwrap();

        let deleted = Delete::<Payment>::delete(&db, p.payment_id.clone()).await.unwrap();
        assert_eq!(deleted, p);

        let err = Delete::<Payment>::delete(&db, p.payment_id.clone()).await.unwrap_err();
        assert!(err.downcast_ref::<QueryError>().is_some());
    }

    #[tokio::test]
    async fn test_delete_receipt() {
        let (_handle, db) = connection::open_test().await;
        let m = member(&db).await;
        db.insert(payment(m.id, 2022, 450)).await.unwrap();
        db.insert(payment(m.id, 2023, 450)).await.unwrap();
        db.insert(payment(m.id, 2024, 450)).await.unwrap();
        db.insert(payment(m.id, 2025, 500)).await.unwrap();

        let key = ReceiptKey {
            member_id: m.id,
            receipt_no: 450,
            years: BTreeSet::from([2022, 2023, 2025]),
        };
        let deleted = Delete::<Vec<Payment>>::delete(&db, key.clone()).await.unwrap();
        let mut years: Vec<i32> = deleted.iter().map(|p| p.year).collect();
        years.sort();
        assert_eq!(years, vec![2022, 2023]);

        let left: Vec<i32> = m
            .get_payments(&db)
            .await
            .unwrap()
            .iter()
            .map(|p| p.year)
            .collect();
        assert_eq!(left, vec![2025, 2024]);

        let log: Vec<ChangeLogEntry> = db
            .query(&ChangeLogFilter {
                record_id: Some(key.record_id()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].change_type, ChangeType::Delete);

        let err = Delete::<Vec<Payment>>::delete(&db, key).await.unwrap_err();
        assert!(err.downcast_ref::<QueryError>().is_some());
    }
}
