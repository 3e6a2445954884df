//! Id normalization and validation errors.
//!
//! Ids reach the ledger from command line arguments, from snapshots written
//! by older versions and from hand edited files. They may arrive as numbers
//! or as numeric strings; everything is normalized to `u32` before any
//! comparison.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use thiserror::Error as ThisError;

#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum ValidationError {
    #[error("missing id")]
    MissingId,
    #[error("invalid id {0:?}")]
    InvalidId(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid year {0}")]
    InvalidYear(i32),
    #[error("member {member_id} already has a payment for {year}")]
    DuplicatePayment { member_id: u32, year: i32 },
}

/// Parse a positive numeric id.
pub fn parse_id(raw: &str) -> Result<u32, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingId);
    }
    match raw.parse::<u32>() {
        Ok(0) | Err(_) => Err(ValidationError::InvalidId(raw.to_string())),
        Ok(id) => Ok(id),
    }
}

/// Years the ledger accepts for registrations, payments and reports.
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2999;

pub fn check_year(year: i32) -> Result<i32, ValidationError> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(year)
    } else {
        Err(ValidationError::InvalidYear(year))
    }
}

/// Parse a year within [`MIN_YEAR`] and [`MAX_YEAR`].
pub fn parse_year(raw: &str) -> Result<i32, ValidationError> {
    let raw = raw.trim();
    let year = raw
        .parse::<i32>()
        .map_err(|_| ValidationError::InvalidYear(0))?;
    check_year(year)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawNumber {
    fn to_i64(&self) -> Option<i64> {
        match self {
            RawNumber::Int(n) => Some(*n),
            RawNumber::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            RawNumber::Float(_) => None,
            RawNumber::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            RawNumber::Int(n) => n.to_string(),
            RawNumber::Float(f) => f.to_string(),
            RawNumber::Text(s) => s.clone(),
        }
    }
}

/// Deserialize a positive id given as number or string.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawNumber::deserialize(deserializer)?;
    match raw.to_i64() {
        Some(n) if n > 0 && n <= u32::MAX as i64 => Ok(n as u32),
        _ => Err(serde::de::Error::custom(ValidationError::InvalidId(raw.describe()))),
    }
}

/// Deserialize a non negative counter (receipt or booklet number).
/// Missing, empty and unparsable values become 0.
pub fn deserialize_counter<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawNumber> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|r| r.to_i64())
        .filter(|n| *n >= 0 && *n <= u32::MAX as i64)
        .map(|n| n as u32)
        .unwrap_or(0))
}

/// Deserialize an optional year given as number, string or null.
pub fn deserialize_opt_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawNumber> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|r| r.to_i64())
        .filter(|n| *n > 0 && *n <= i32::MAX as i64)
        .map(|n| n as i32))
}

/// Deserialize a year given as number or string.
pub fn deserialize_year<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawNumber::deserialize(deserializer)?;
    match raw.to_i64() {
        Some(n) if n > 0 && n <= i32::MAX as i64 => Ok(n as i32),
        _ => Err(serde::de::Error::custom(format!("invalid year {:?}", raw.describe()))),
    }
}

/// Deserialize an amount given as number or string, accepting a
/// decimal comma.
pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawNumber> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(0.0),
        Some(RawNumber::Int(n)) => Ok(n as f64),
        Some(RawNumber::Float(f)) => Ok(f),
        Some(RawNumber::Text(s)) if s.trim().is_empty() => Ok(0.0),
        Some(RawNumber::Text(s)) => s
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid amount {:?}", s))),
    }
}

/// Deserialize a record token (payment id) given as number or string.
pub fn deserialize_token<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawNumber> = Option::deserialize(deserializer)?;
    Ok(raw.map(|r| r.describe()).unwrap_or_default())
}

/// Deserialize an optional ISO date. Empty and malformed dates are
/// treated as unknown.
pub fn deserialize_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_date(&s)))
}

/// Parse a date in ISO format, tolerating a trailing time component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
