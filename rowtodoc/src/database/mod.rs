//!
//! The seam between the engine and the database driver.
//!
//! Everything above this module sees a database only as something that runs
//! literal SQL and yields [`Row`]s. The sqlx connections implement it by
//! decoding every column dynamically from its type name.
//!

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;

use crate::row::Row;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryDatabase;

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("Column `{column}` has unsupported type `{type_name}`")]
    UnsupportedType { column: String, type_name: String },

    #[error("Query rejected: {0}")]
    Rejected(String),
}

impl DatabaseError {
    pub(crate) fn unsupported(column: &str, type_name: &str) -> Self {
        Self::UnsupportedType {
            column: column.to_string(),
            type_name: type_name.to_string(),
        }
    }
}

/// An open connection able to run literal SQL.
///
/// Implementations never close the connection; its lifecycle belongs to the
/// caller. One connection must only serve one resolution at a time, which
/// `&mut self` enforces.
#[async_trait]
pub trait Database: Send {
    /// Run `sql` and stream its rows as they are decoded.
    fn fetch<'c>(&'c mut self, sql: &'c str) -> BoxStream<'c, Result<Row, DatabaseError>>;

    /// Run `sql` and exhaust its cursor.
    async fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>, DatabaseError> {
        self.fetch(sql).try_collect().await
    }
}
