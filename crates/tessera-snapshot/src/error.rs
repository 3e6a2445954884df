use thiserror::Error as ThisError;

use tessera_data::ValidationError;

#[derive(ThisError, Debug)]
pub enum SnapshotError {
    #[error("snapshot has no Members table")]
    MissingMembers,

    #[error("snapshot schema version {found} is newer than supported version {supported}")]
    NewerSchema { found: u32, supported: u32 },

    #[error("invalid record in snapshot: {0}")]
    Invalid(#[from] ValidationError),

    #[error("duplicate {0} key in snapshot: {1}")]
    DuplicateKey(&'static str, String),

    #[error("payment {payment_id} references unknown member {member_id}")]
    DanglingPayment { payment_id: String, member_id: u32 },

    #[error("corrupt snapshot: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Error(#[from] anyhow::Error),
}
