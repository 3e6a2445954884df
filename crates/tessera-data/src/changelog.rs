use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TABLE_MEMBERS: &str = "members";
pub const TABLE_PAYMENTS: &str = "payments";
pub const TABLE_SETTINGS: &str = "settings";
pub const TABLE_SNAPSHOT: &str = "snapshot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ChangeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(ChangeType::Create),
            "update" => Ok(ChangeType::Update),
            "delete" => Ok(ChangeType::Delete),
            other => Err(anyhow::anyhow!("unknown change type {:?}", other)),
        }
    }
}

/// An entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub table: String,
    pub record_id: String,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Default, Clone)]
pub struct ChangeLogFilter {
    pub table: Option<String>,
    pub record_id: Option<String>,
}

/// Signal emitted after a mutation has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: String,
    pub record_id: String,
    pub change_type: ChangeType,
}

impl From<&ChangeLogEntry> for ChangeEvent {
    fn from(entry: &ChangeLogEntry) -> Self {
        Self {
            table: entry.table.clone(),
            record_id: entry.record_id.clone(),
            change_type: entry.change_type,
        }
    }
}
