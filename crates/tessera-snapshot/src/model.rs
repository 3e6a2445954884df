use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tessera_data::{ids, Member, Payment};

use crate::SnapshotError;

pub const META_SCHEMA_VERSION: &str = "schema_version";
pub const META_EXPORT_TIMESTAMP: &str = "export_timestamp";
pub const META_APP_VERSION: &str = "app_version";

/// A setting row with its value in storage encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingRecord {
    pub key: String,
    pub value_encoded: String,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// A change log row. Only the state after the change is carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogRecord {
    #[serde(default)]
    pub id: i64,
    pub table: String,
    pub change_type: String,
    #[serde(deserialize_with = "ids::deserialize_token")]
    pub record_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub after_encoded: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Required on import. Missing only in damaged documents.
    #[serde(rename = "Members", default)]
    pub members: Option<Vec<Member>>,
    #[serde(rename = "Payments", default)]
    pub payments: Vec<Payment>,
    #[serde(rename = "Settings", default)]
    pub settings: Vec<SettingRecord>,
    #[serde(rename = "ChangeLog", default)]
    pub change_log: Vec<ChangeLogRecord>,
    #[serde(rename = "Metadata", default)]
    pub metadata: Vec<MetadataRecord>,
}

impl Snapshot {
    /// Encode the snapshot as JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decode a snapshot from JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn members(&self) -> &[Member] {
        self.members.as_deref().unwrap_or(&[])
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.iter().find(|m| m.key == key).map(|m| &m.value)
    }

    /// Schema version recorded at export, if any. Numbers and
    /// numeric strings are accepted.
    pub fn schema_version(&self) -> Option<u32> {
        let value = self.metadata_value(META_SCHEMA_VERSION)?;
        match value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn export_timestamp(&self) -> Option<DateTime<Utc>> {
        self.metadata_value(META_EXPORT_TIMESTAMP)?
            .as_str()?
            .parse()
            .ok()
    }
}
