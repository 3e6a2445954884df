use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use sqlx::{sqlite::SqliteConnection, Connection as SqlConnection, QueryBuilder, Sqlite};
use tracing::info;

use tessera_data::{
    ChangeEvent,
    ChangeType,
    Delete,
    Insert,
    Member,
    MemberFilter,
    Query,
    Retrieve,
    Update,
    ValidationError,
    TABLE_MEMBERS,
};

use crate::{
    changelog,
    payments,
    results::{Id, QueryError},
    Connection,
};

const SELECT_MEMBERS: &str = r#"
    SELECT
        id,
        surname,
        given_name,
        birth_date,
        birthplace,
        group_name,
        first_registration_year,
        notes
    FROM members
    WHERE 1
    "#;

/// Fetch members matching the id and group of the filter,
/// sorted by surname and given name.
pub async fn fetch(conn: &mut SqliteConnection, filter: &MemberFilter) -> Result<Vec<Member>> {
    let mut qry = QueryBuilder::<Sqlite>::new(SELECT_MEMBERS);
    if let Some(id) = filter.id {
        qry.push(" AND id = ").push_bind(id);
    }
    if let Some(group) = filter.group.clone() {
        qry.push(" AND group_name = ").push_bind(group);
    }
    qry.push(" ORDER BY surname, given_name, id");

    let members: Vec<Member> = qry.build_query_as().fetch_all(&mut *conn).await?;
    Ok(members)
}

/// Fetch a single member or fail with not found.
pub async fn fetch_one(conn: &mut SqliteConnection, id: u32) -> Result<Member> {
    let filter = MemberFilter {
        id: Some(id),
        ..Default::default()
    };
    fetch(conn, &filter)
        .await?
        .pop()
        .ok_or_else(|| QueryError::RecordNotFound("member", id.to_string()).into())
}

/// Bulk load members, keeping their ids.
pub async fn insert_rows(conn: &mut SqliteConnection, members: &[Member]) -> Result<()> {
    for chunk in members.chunks(100) {
        let mut qry = QueryBuilder::<Sqlite>::new(
            "INSERT INTO members (id, surname, given_name, birth_date, birthplace, \
             group_name, first_registration_year, notes) ",
        );
        qry.push_values(chunk, |mut b, m| {
            b.push_bind(m.id)
                .push_bind(&m.surname)
                .push_bind(&m.given_name)
                .push_bind(m.birth_date)
                .push_bind(&m.birthplace)
                .push_bind(&m.group)
                .push_bind(m.first_registration_year)
                .push_bind(&m.notes);
        });
        qry.build().execute(&mut *conn).await?;
    }
    Ok(())
}

#[async_trait]
impl Query<Member> for Connection {
    type Filter = MemberFilter;

    async fn query(&self, filter: &Self::Filter) -> Result<Vec<Member>> {
        let members = {
            let mut conn = self.lock().await;
            fetch(&mut conn, filter).await?
        };
        // Search terms are matched here rather than with LIKE, which
        // only folds ASCII case in SQLite.
        Ok(members
            .into_iter()
            .filter(|m| filter.matches_terms(m))
            .collect())
    }
}

#[async_trait]
impl Retrieve<Member> for Connection {
    type Key = u32;

    async fn retrieve(&self, member_id: Self::Key) -> Result<Member> {
        if member_id == 0 {
            return Err(ValidationError::MissingId.into());
        }
        let mut conn = self.lock().await;
        fetch_one(&mut conn, member_id).await
    }
}

#[async_trait]
impl Insert<Member> for Connection {
    /// Register a member. The id is assigned as the highest
    /// existing id plus one.
    async fn insert(&self, member: Member) -> Result<Member> {
        member.validate()?;
        let (member_id, entry) = {
            let mut conn = self.lock().await;
            let mut tx = conn.begin().await?;

            let next: Id<i64> =
                sqlx::query_as("SELECT COALESCE(MAX(id), 0) + 1 AS id FROM members")
                    .fetch_one(&mut *tx)
                    .await?;
            let member = Member {
                id: next.id as u32,
                ..member
            };

            let mut qry = QueryBuilder::<Sqlite>::new(
                r#"INSERT INTO members (
                    id,
                    surname,
                    given_name,
                    birth_date,
                    birthplace,
                    group_name,
                    first_registration_year,
                    notes
                ) VALUES (
                "#,
            );
            qry.separated(", ")
                .push_bind(member.id)
                .push_bind(&member.surname)
                .push_bind(&member.given_name)
                .push_bind(member.birth_date)
                .push_bind(&member.birthplace)
                .push_bind(&member.group)
                .push_bind(member.first_registration_year)
                .push_bind(&member.notes);
            qry.push(")").build().execute(&mut *tx).await?;

            let entry = changelog::append(
                &mut tx,
                TABLE_MEMBERS,
                &member.id.to_string(),
                ChangeType::Create,
                None,
                Some(json!(member)),
            )
            .await?;
            tx.commit().await?;
            (member.id, entry)
        };
        info!(member_id, "member registered");
        self.notify(ChangeEvent::from(&entry));

        self.retrieve(member_id).await
    }
}

#[async_trait]
impl Update<Member> for Connection {
    /// Update member
    async fn update(&self, member: Member) -> Result<Member> {
        if member.id == 0 {
            return Err(ValidationError::MissingId.into());
        }
        member.validate()?;
        let entry = {
            let mut conn = self.lock().await;
            let mut tx = conn.begin().await?;
            let before = fetch_one(&mut tx, member.id).await?;

            QueryBuilder::<Sqlite>::new("UPDATE members SET")
                .push(" surname = ")
                .push_bind(&member.surname)
                .push(", given_name = ")
                .push_bind(&member.given_name)
                .push(", birth_date = ")
                .push_bind(member.birth_date)
                .push(", birthplace = ")
                .push_bind(&member.birthplace)
                .push(", group_name = ")
                .push_bind(&member.group)
                .push(", first_registration_year = ")
                .push_bind(member.first_registration_year)
                .push(", notes = ")
                .push_bind(&member.notes)
                .push(" WHERE id = ")
                .push_bind(member.id)
                .build()
                .execute(&mut *tx)
                .await?;

            let entry = changelog::append(
                &mut tx,
                TABLE_MEMBERS,
                &member.id.to_string(),
                ChangeType::Update,
                Some(json!(before)),
                Some(json!(member)),
            )
            .await?;
            tx.commit().await?;
            entry
        };
        self.notify(ChangeEvent::from(&entry));

        self.retrieve(member.id).await
    }
}

#[async_trait]
impl Delete<Member> for Connection {
    type Key = u32;

    /// Delete a member together with all of its payments.
    async fn delete(&self, member_id: Self::Key) -> Result<Member> {
        if member_id == 0 {
            return Err(ValidationError::MissingId.into());
        }
        let (member, entry) = {
            let mut conn = self.lock().await;
            let mut tx = conn.begin().await?;
            let member = fetch_one(&mut tx, member_id).await?;
            let payments = payments::fetch(
                &mut tx,
                &tessera_data::PaymentFilter {
                    member_id: Some(member_id),
                    ..Default::default()
                },
            )
            .await?;

            // Payments go with the member (ON DELETE CASCADE).
            sqlx::query("DELETE FROM members WHERE id = ?")
                .bind(member_id)
                .execute(&mut *tx)
                .await?;

            let entry = changelog::append(
                &mut tx,
                TABLE_MEMBERS,
                &member_id.to_string(),
                ChangeType::Delete,
                Some(json!({ "member": member, "payments": payments })),
                None,
            )
            .await?;
            tx.commit().await?;
            (member, entry)
        };
        info!(member_id, "member deleted");
        self.notify(ChangeEvent::from(&entry));
        Ok(member)
    }
}
