//!
//! Turn normalized relational rows into self-contained JSON documents.
//!
//! ```text
//! source query        child queries                 documents
//!
//!  orders ──batch──▶  items (order_id = id)  ──▶  {"id": 1,
//!                       └ skus (sku = sku)          "items": [{.., "skus": [..]}]}
//! ```
//!
//! A [`pipeline::Pipeline`] streams the source query in batches
//! ([`producer::RowBatches`]), enriches every batch by running each
//! [`query::ChildQuery`] of the configured tree exactly once
//! ([`engine::resolve_children`]), and writes one document per top-level
//! row ([`document::DocumentWriter`]).
//!

pub mod config;
pub mod database;
pub mod document;
pub mod engine;
pub mod pipeline;
pub mod producer;
pub mod quantify;
pub mod query;
pub mod row;
pub mod transport;
pub mod value;

mod explain;

pub use database::{Database, DatabaseError};
pub use row::Row;
pub use value::Value;

/// Which rows a missing key column was expected in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RowSide {
    /// The rows the child results are attached to.
    Parent,
    /// The rows returned by the child query.
    Child,
}

impl std::fmt::Display for RowSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RowSide::Parent => write!(f, "parent"),
            RowSide::Child => write!(f, "child"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RowToDocError {
    #[error("Invalid configuration at `{path}`: {message}")]
    Configuration { path: String, message: String },

    #[error("Child query `{node}` failed: {source}")]
    QueryExecution {
        node: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Column `{column}` is missing from the {side} rows of `{node}`")]
    SchemaMismatch {
        node: String,
        column: String,
        side: RowSide,
    },

    #[error("Source query failed: {0}")]
    Source(#[source] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] bincode::Error),

    #[error("Bad batch frame: {0}")]
    Frame(String),

    #[error("Document sink error: {0}")]
    Sink(String),
}

impl RowToDocError {
    pub(crate) fn configuration(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type RowToDocResult<T> = Result<T, RowToDocError>;
