//! Pipeline configuration.
//!
//! Loaded from TOML, then validated once into a [`crate::pipeline::Pipeline`]
//! before anything touches a database:
//!
//! ```toml
//! query = "select * from orders"
//! batch_size = 500
//! date_format = "%m/%d/%Y"
//! failure_policy = "route"
//! child_query_json = '''
//! [{"query": "select * from line_items", "primaryKeyColumnName": "id",
//!   "foreignKeyColumnName": "order_id", "propertyName": "items"}]
//! '''
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::document::{DEFAULT_DATE_FORMAT, DEFAULT_TIMESTAMP_FORMAT};
use crate::pipeline::FailurePolicy;
use crate::producer::DEFAULT_BATCH_SIZE;
use crate::query::TableQuery;
use crate::{RowToDocError, RowToDocResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// The source query. Falls back to the root query of the child tree.
    #[serde(default)]
    pub query: Option<String>,

    /// Rows per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Child query tree as inline JSON.
    #[serde(default)]
    pub child_query_json: Option<String>,

    /// Child query tree read from a JSON file.
    #[serde(default)]
    pub child_query_file: Option<PathBuf>,

    /// strftime pattern for date values.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// strftime pattern for timestamp values.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            query: None,
            batch_size: default_batch_size(),
            child_query_json: None,
            child_query_file: None,
            date_format: default_date_format(),
            timestamp_format: default_timestamp_format(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(toml: &str) -> RowToDocResult<Self> {
        toml::from_str(toml).map_err(|e| RowToDocError::configuration("config", e.to_string()))
    }

    pub fn load(path: &Path) -> RowToDocResult<Self> {
        let toml = std::fs::read_to_string(path)
            .map_err(|e| RowToDocError::configuration(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&toml)
    }

    /// Parse the configured child query tree, if any.
    pub fn child_queries(&self) -> RowToDocResult<Option<TableQuery>> {
        match (&self.child_query_json, &self.child_query_file) {
            (Some(_), Some(_)) => Err(RowToDocError::configuration(
                "child_query_json",
                "conflicts with child_query_file",
            )),
            (Some(json), None) => TableQuery::from_json(json).map(Some),
            (None, Some(path)) => {
                let json = std::fs::read_to_string(path).map_err(|e| {
                    RowToDocError::configuration(path.display().to_string(), e.to_string())
                })?;
                TableQuery::from_json(&json).map(Some)
            }
            (None, None) => Ok(None),
        }
    }
}
