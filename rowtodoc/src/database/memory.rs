//!
//! Scripted in-memory database.
//!
//! Answers literal query text with preset rows, and records every query it
//! runs. Clones share the script and the log, so a test can keep one handle
//! while another is lent to the code under test.
//!

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use parking_lot::Mutex;

use super::{Database, DatabaseError};
use crate::row::Row;

#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    results: HashMap<String, Vec<Row>>,
    failures: HashMap<String, Failure>,
    executed: Vec<String>,
}

#[derive(Debug)]
struct Failure {
    after_rows: usize,
    message: String,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `rows`.
    pub fn with_rows(self, sql: impl Into<String>, rows: Vec<Row>) -> Self {
        self.state.lock().results.insert(sql.into(), rows);
        self
    }

    /// Reject `sql` before yielding any row.
    pub fn fail_on(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        self.fail_after(sql, 0, message)
    }

    /// Yield the first `after_rows` rows of `sql`, then fail.
    pub fn fail_after(
        self,
        sql: impl Into<String>,
        after_rows: usize,
        message: impl Into<String>,
    ) -> Self {
        self.state.lock().failures.insert(
            sql.into(),
            Failure {
                after_rows,
                message: message.into(),
            },
        );
        self
    }

    /// Every query run so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    pub fn execution_count(&self) -> usize {
        self.state.lock().executed.len()
    }
}

impl Database for MemoryDatabase {
    fn fetch<'c>(&'c mut self, sql: &'c str) -> BoxStream<'c, Result<Row, DatabaseError>> {
        let mut state = self.state.lock();
        state.executed.push(sql.to_string());

        let rows = state.results.get(sql).cloned();
        let results: Vec<Result<Row, DatabaseError>> = match (rows, state.failures.get(sql)) {
            (rows, Some(failure)) => rows
                .unwrap_or_default()
                .into_iter()
                .take(failure.after_rows)
                .map(Ok)
                .chain(std::iter::once(Err(DatabaseError::Rejected(
                    failure.message.clone(),
                ))))
                .collect(),
            (Some(rows), None) => rows.into_iter().map(Ok).collect(),
            (None, None) => vec![Err(DatabaseError::Rejected(format!(
                "no such query: {}",
                sql
            )))],
        };

        stream::iter(results).boxed()
    }
}
