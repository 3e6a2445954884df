use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{check_year, ids, ValidationError};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PaymentFilter {
    pub member_id: Option<u32>,
    pub year: Option<i32>,
    pub receipt_no: Option<u32>,
}

/// An annual dues payment.
#[derive(Debug, Default, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default, deserialize_with = "ids::deserialize_token")]
    pub payment_id: String,
    #[serde(deserialize_with = "ids::deserialize_id")]
    pub member_id: u32,
    #[serde(deserialize_with = "ids::deserialize_year")]
    pub year: i32,
    #[serde(default, deserialize_with = "ids::deserialize_opt_date")]
    pub payment_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "ids::deserialize_amount")]
    pub amount: f64,
    #[serde(default, deserialize_with = "ids::deserialize_counter")]
    pub receipt_no: u32,
    #[serde(default, deserialize_with = "ids::deserialize_counter")]
    pub booklet_no: u32,
}

impl Payment {
    /// Check required fields before the payment is written.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.member_id == 0 {
            return Err(ValidationError::MissingId);
        }
        check_year(self.year)?;
        Ok(())
    }
}

/// Selects the payments written on one receipt: all payments of a
/// member with the receipt number for the given years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptKey {
    pub member_id: u32,
    pub receipt_no: u32,
    pub years: BTreeSet<i32>,
}

impl ReceiptKey {
    pub fn record_id(&self) -> String {
        format!("{}:{}", self.member_id, self.receipt_no)
    }
}

/// Collect the distinct years covered by a list of payments.
pub fn paid_years<'a, I>(payments: I) -> BTreeSet<i32>
where
    I: IntoIterator<Item = &'a Payment>,
{
    payments.into_iter().map(|p| p.year).collect()
}
