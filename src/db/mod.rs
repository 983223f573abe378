use std::fmt;

use thiserror::Error;

pub mod models;
pub mod sqlite;

#[cfg(test)]
pub mod memory;

pub mod prelude {
    pub use crate::db::models::NewRecord;
    pub use crate::db::sqlite::SqliteStore;
    pub use crate::db::{DbError, Store};
}

/// Persistence port: an append-only log of karma operations plus the aggregates read from it.
#[async_trait::async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Appends a record. Records with zero points are rejected.
    async fn insert(&self, record: &models::NewRecord) -> DbResult<()>;

    /// Sums every record received by `name`; fails with [`DbError::NoSuchUser`] when there are
    /// none.
    async fn get_user_score(&self, name: &str) -> DbResult<models::UserScore>;

    /// Top `limit` users by points (descending), ties broken by name (ascending).
    async fn get_leaderboard(&self, limit: u32) -> DbResult<Vec<models::UserScore>>;

    /// Sum of the absolute value of every recorded operation.
    async fn get_total_absolute_points(&self) -> DbResult<i64>;

    /// A uniformly selected record received by `name`.
    async fn get_random_record_for(&self, name: &str) -> DbResult<models::KarmaRecord>;
}

pub type DbResult<T> = core::result::Result<T, DbError>;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error("no such user: {0}")]
    NoSuchUser(String),

    #[error("refusing to store a karma operation worth zero points")]
    ZeroPoints,

    #[error("unreadable timestamp '{0}'")]
    Timestamp(String),
}
