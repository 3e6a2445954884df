use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    check_year,
    ids,
    Payment,
    PaymentFilter,
    Query,
    ValidationError,
};

/// Group label for members without a group.
pub const UNASSIGNED_GROUP: &str = "Unassigned";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MemberFilter {
    pub id: Option<u32>,
    /// Whitespace separated search terms. Every term must match
    /// surname, given name or notes (case insensitive).
    pub search: Option<String>,
    /// Exact group match
    pub group: Option<String>,
}

impl MemberFilter {
    /// Check the search terms of the filter against a member.
    pub fn matches_terms(&self, member: &Member) -> bool {
        let search = match &self.search {
            Some(search) => search.to_lowercase(),
            None => return true,
        };
        let surname = member.surname.to_lowercase();
        let given_name = member.given_name.to_lowercase();
        let notes = member.notes.to_lowercase();

        search.split_whitespace().all(|term| {
            surname.contains(term) || given_name.contains(term) || notes.contains(term)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Member {
    #[serde(default, deserialize_with = "ids::deserialize_id")]
    pub id: u32,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default, deserialize_with = "ids::deserialize_opt_date")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub birthplace: Option<String>,
    #[sqlx(rename = "group_name")]
    #[serde(default)]
    pub group: String,
    #[serde(default, deserialize_with = "ids::deserialize_opt_year")]
    pub first_registration_year: Option<i32>,
    #[serde(default)]
    pub notes: String,
}

impl Member {
    /// Check required fields before the member is written.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.surname.trim().is_empty() {
            return Err(ValidationError::MissingField("surname"));
        }
        if let Some(year) = self.first_registration_year {
            check_year(year)?;
        }
        Ok(())
    }

    /// Display name, surname first.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.surname, self.given_name)
            .trim()
            .to_string()
    }

    pub fn birth_year(&self) -> Option<i32> {
        self.birth_date.map(|d| d.year())
    }

    /// Group name trimmed and uppercased, for aggregation.
    pub fn normalized_group(&self) -> String {
        normalize_group(&self.group)
    }

    /// Get the payments of the member, latest year first.
    pub async fn get_payments<DB>(&self, db: &DB) -> Result<Vec<Payment>>
    where
        DB: Query<Payment, Filter = PaymentFilter>,
    {
        let payments = db
            .query(&PaymentFilter {
                member_id: Some(self.id),
                ..Default::default()
            })
            .await?;
        Ok(payments)
    }
}

/// Normalize a free text group name: trimmed, uppercased,
/// empty becomes "Unassigned".
pub fn normalize_group(group: &str) -> String {
    let group = group.trim();
    if group.is_empty() {
        UNASSIGNED_GROUP.to_string()
    } else {
        group.to_uppercase()
    }
}
