//!
//! Source query → child queries → documents.
//!

use std::num::NonZeroUsize;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::database::Database;
use crate::document::{DocumentWriter, PatternFormatter};
use crate::engine::resolve_children;
use crate::producer::RowBatches;
use crate::query::TableQuery;
use crate::row::Row;
use crate::transport;
use crate::{RowToDocError, RowToDocResult};

/// What to do with a batch whose enrichment failed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run and return the error.
    #[default]
    Abort,
    /// Hand the batch to the sink's failure path and carry on.
    Route,
}

/// Where documents go.
#[async_trait]
pub trait DocumentSink: Send {
    async fn write_document(&mut self, document: String) -> RowToDocResult<()>;

    /// Receives the batch as it was produced, before any enrichment,
    /// framed by [`transport::encode_batch`].
    async fn reject_batch(&mut self, frame: Vec<u8>, error: &RowToDocError) -> RowToDocResult<()> {
        warn!(bytes = frame.len(), %error, "dropping failed batch");
        Ok(())
    }
}

#[async_trait]
impl DocumentSink for Vec<String> {
    async fn write_document(&mut self, document: String) -> RowToDocResult<()> {
        self.push(document);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub batches: usize,
    pub rows: usize,
    pub documents: usize,
    pub failed_batches: usize,
    pub child_queries: usize,
}

#[derive(Clone, Debug)]
pub struct Pipeline {
    query: String,
    batch_size: NonZeroUsize,
    child_queries: Option<TableQuery>,
    writer: DocumentWriter,
    failure_policy: FailurePolicy,
}

impl Pipeline {
    pub fn new(query: impl Into<String>, batch_size: NonZeroUsize) -> Self {
        Self {
            query: query.into(),
            batch_size,
            child_queries: None,
            writer: DocumentWriter::default(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_child_queries(mut self, tree: TableQuery) -> Self {
        self.child_queries = Some(tree);
        self
    }

    pub fn with_writer(mut self, writer: DocumentWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Validate a configuration into a runnable pipeline.
    ///
    /// Without an explicit `query`, the root query of the child query tree
    /// is used as the source query.
    pub fn from_config(config: &PipelineConfig) -> RowToDocResult<Self> {
        let child_queries = config.child_queries()?;

        let query = config
            .query
            .as_deref()
            .filter(|query| !query.trim().is_empty())
            .or_else(|| child_queries.as_ref().and_then(TableQuery::query))
            .map(str::to_string)
            .ok_or_else(|| RowToDocError::configuration("query", "a source query is required"))?;

        let batch_size = NonZeroUsize::new(config.batch_size).ok_or_else(|| {
            RowToDocError::configuration("batch_size", "must be a positive integer")
        })?;

        let formatter = PatternFormatter::new(&config.date_format, &config.timestamp_format)?;

        let mut pipeline = Self::new(query, batch_size)
            .with_writer(DocumentWriter::new(formatter))
            .with_failure_policy(config.failure_policy);
        pipeline.child_queries = child_queries;
        Ok(pipeline)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    pub fn child_queries(&self) -> Option<&TableQuery> {
        self.child_queries.as_ref()
    }

    pub fn writer(&self) -> &DocumentWriter {
        &self.writer
    }

    /// Run the source query on `source` and the child queries on `children`,
    /// writing one document per source row to `sink`.
    ///
    /// A source error always ends the run. Enrichment and serialization
    /// errors are handled per batch according to the failure policy.
    #[instrument(skip_all, fields(query = %self.query))]
    pub async fn run<S, C, K>(
        &self,
        source: &mut S,
        children: &mut C,
        sink: &mut K,
    ) -> RowToDocResult<RunSummary>
    where
        S: Database + ?Sized,
        C: Database + ?Sized,
        K: DocumentSink + ?Sized,
    {
        let mut summary = RunSummary::default();
        let mut batches = RowBatches::new(source, &self.query, self.batch_size);

        while let Some(batch) = batches.next().await {
            let mut rows = batch?;
            summary.batches += 1;
            summary.rows += rows.len();
            info!(rows = rows.len(), "number of rows received");

            let original = match self.failure_policy {
                FailurePolicy::Route => Some(transport::encode_batch(&rows)?),
                FailurePolicy::Abort => None,
            };

            match self.process_batch(children, &mut rows, &mut summary).await {
                Ok(documents) => {
                    for document in documents {
                        sink.write_document(document).await?;
                        summary.documents += 1;
                    }
                }
                Err(err) => match original {
                    Some(frame) => {
                        warn!(batch = summary.batches, error = %err, "routing failed batch");
                        summary.failed_batches += 1;
                        sink.reject_batch(frame, &err).await?;
                    }
                    None => {
                        error!(batch = summary.batches, error = %err, "aborting run");
                        return Err(err);
                    }
                },
            }
        }

        info!(
            batches = summary.batches,
            rows = summary.rows,
            documents = summary.documents,
            failed_batches = summary.failed_batches,
            "run complete"
        );
        Ok(summary)
    }

    /// Enrich and serialize one batch. Nothing reaches the sink unless the
    /// whole batch succeeded.
    async fn process_batch<C>(
        &self,
        children: &mut C,
        rows: &mut [Row],
        summary: &mut RunSummary,
    ) -> RowToDocResult<Vec<String>>
    where
        C: Database + ?Sized,
    {
        if let Some(tree) = &self.child_queries {
            let stats = resolve_children(children, tree, rows).await?;
            summary.child_queries += stats.queries;
            debug!(
                queries = stats.queries,
                rows_fetched = stats.rows_fetched,
                "child queries resolved"
            );
        }

        self.writer.write_batch(rows)
    }
}
