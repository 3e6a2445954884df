use sqlx::FromRow;
use thiserror::Error as ThisError;

/// Model errors
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum QueryError {
    #[error("{0} {1} not found")]
    RecordNotFound(&'static str, String),
}

#[derive(Debug, Clone, FromRow)]
pub struct Id<T> {
    pub id: T,
}
