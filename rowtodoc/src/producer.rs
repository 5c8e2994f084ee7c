//!
//! Batching of a source query.
//!

use std::num::NonZeroUsize;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{BoxStream, Stream};
use futures_util::{ready, StreamExt};
use tracing::debug;

use crate::database::{Database, DatabaseError};
use crate::row::Row;
use crate::{RowToDocError, RowToDocResult};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Runs one query and yields its rows in batches of at most `batch_size`.
///
/// The stream is lazy and cannot be restarted. The last batch may be short;
/// an empty result produces no batch at all. A source error is yielded once,
/// discarding the partial batch, and ends the stream.
pub struct RowBatches<'c> {
    rows: Option<BoxStream<'c, Result<Row, DatabaseError>>>,
    batch_size: NonZeroUsize,
    batch: Vec<Row>,
    rows_seen: usize,
}

impl<'c> RowBatches<'c> {
    pub fn new<D>(db: &'c mut D, query: &'c str, batch_size: NonZeroUsize) -> Self
    where
        D: Database + ?Sized,
    {
        debug!(query, batch_size = batch_size.get(), "executing source query");
        Self {
            rows: Some(db.fetch(query)),
            batch_size,
            batch: Vec::with_capacity(batch_size.get()),
            rows_seen: 0,
        }
    }

    fn take_batch(&mut self) -> Vec<Row> {
        let capacity = if self.rows.is_some() {
            self.batch_size.get()
        } else {
            0
        };
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(capacity));
        debug!(rows_seen = self.rows_seen, batch = batch.len(), "sending batch");
        batch
    }
}

impl Stream for RowBatches<'_> {
    type Item = RowToDocResult<Vec<Row>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let next = match this.rows.as_mut() {
                Some(rows) => ready!(rows.poll_next_unpin(cx)),
                None => return Poll::Ready(None),
            };

            match next {
                Some(Ok(row)) => {
                    this.rows_seen += 1;
                    this.batch.push(row);
                    if this.batch.len() >= this.batch_size.get() {
                        return Poll::Ready(Some(Ok(this.take_batch())));
                    }
                }
                Some(Err(err)) => {
                    this.rows = None;
                    this.batch.clear();
                    return Poll::Ready(Some(Err(RowToDocError::Source(err))));
                }
                None => {
                    this.rows = None;
                    if this.batch.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Ok(this.take_batch())));
                }
            }
        }
    }
}
