//!
//! The child query tree.
//!
//! A [`TableQuery`] is the root of the tree. It is not attached to anything;
//! its child queries are resolved directly against the batch of rows handed to
//! the engine. Every [`ChildQuery`] below it carries the key columns and the
//! property name used to merge its results into its parent's rows.
//!
//! The tree is usually read from a JSON document:
//!
//! ```json
//! {
//!   "query": "select * from orders",
//!   "childQueries": [{
//!     "query": "select * from line_items",
//!     "primaryKeyColumnName": "id",
//!     "foreignKeyColumnName": "order_id",
//!     "propertyName": "items"
//!   }]
//! }
//! ```
//!

use std::collections::HashSet;

use serde::Deserialize;

use crate::quantify::Cardinality;
use crate::{RowToDocError, RowToDocResult};

const ROOT_PATH: &str = "$";

/// Root of a child query tree.
#[derive(Clone, Debug, Default)]
pub struct TableQuery {
    query: Option<String>,
    child_queries: Vec<ChildQuery>,
}

impl TableQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A root that also names the query producing the parent rows.
    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            child_queries: vec![],
        }
    }

    pub fn with_child(mut self, child: ChildQuery) -> Self {
        self.child_queries.push(child);
        self
    }

    /// Parse and validate a query tree from its JSON configuration.
    ///
    /// The top level may also be a bare array of child queries.
    pub fn from_json(json: &str) -> RowToDocResult<Self> {
        let document: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| RowToDocError::configuration(ROOT_PATH, e.to_string()))?;

        let root: QueryDocument = match document {
            serde_json::Value::Array(children) => QueryDocument {
                child_queries: parse_children(children, ROOT_PATH)?,
                ..QueryDocument::default()
            },
            object @ serde_json::Value::Object(_) => serde_json::from_value(object)
                .map_err(|e| RowToDocError::configuration(ROOT_PATH, e.to_string()))?,
            _ => {
                return Err(RowToDocError::configuration(
                    ROOT_PATH,
                    "expected a JSON object or array",
                ))
            }
        };

        let tree = Self {
            query: root.query.filter(|query| !is_blank(query)),
            child_queries: children_from_documents(root.child_queries, ROOT_PATH)?,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Check the invariants that the constructors do not enforce:
    /// non-blank fields and unique sibling property names.
    pub fn validate(&self) -> RowToDocResult<()> {
        validate_children(&self.child_queries, ROOT_PATH)
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn child_queries(&self) -> &[ChildQuery] {
        &self.child_queries
    }

    /// Number of child query nodes in the tree, i.e. the most queries
    /// one batch resolution can run.
    pub fn node_count(&self) -> usize {
        self.child_queries.iter().map(ChildQuery::node_count).sum()
    }

    /// Render the tree as indented text.
    pub fn explain(&self) -> String {
        crate::explain::explain(self)
    }
}

/// A query whose rows are attached to the rows of its parent.
#[derive(Clone, Debug)]
pub struct ChildQuery {
    query: String,
    primary_key_column_name: String,
    foreign_key_column_name: String,
    property_name: String,
    cardinality: Cardinality,
    child_queries: Vec<ChildQuery>,
}

impl ChildQuery {
    /// Attach every row of `query` whose `foreign_key` equals the parent's
    /// `primary_key` as a list under `property`.
    pub fn one_to_many(
        query: impl Into<String>,
        primary_key: impl Into<String>,
        foreign_key: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            primary_key_column_name: primary_key.into(),
            foreign_key_column_name: foreign_key.into(),
            property_name: property.into(),
            cardinality: Cardinality::OneToMany,
            child_queries: vec![],
        }
    }

    /// Like `one_to_many`, but attach only the first matching row, or null.
    pub fn one_to_one(
        query: impl Into<String>,
        primary_key: impl Into<String>,
        foreign_key: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            cardinality: Cardinality::OneToOne,
            ..Self::one_to_many(query, primary_key, foreign_key, property)
        }
    }

    pub fn with_child(mut self, child: ChildQuery) -> Self {
        self.child_queries.push(child);
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Column of the parent rows.
    pub fn primary_key_column_name(&self) -> &str {
        &self.primary_key_column_name
    }

    /// Column of this query's rows.
    pub fn foreign_key_column_name(&self) -> &str {
        &self.foreign_key_column_name
    }

    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn child_queries(&self) -> &[ChildQuery] {
        &self.child_queries
    }

    fn node_count(&self) -> usize {
        1 + self
            .child_queries
            .iter()
            .map(ChildQuery::node_count)
            .sum::<usize>()
    }
}

/// The JSON shape of one tree node, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct QueryDocument {
    query: Option<String>,
    primary_key_column_name: Option<String>,
    foreign_key_column_name: Option<String>,
    property_name: Option<String>,
    relationship: Option<Cardinality>,
    #[serde(default)]
    child_queries: Vec<QueryDocument>,
}

fn child_path(parent: &str, index: usize) -> String {
    format!("{}.childQueries[{}]", parent, index)
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn parse_children(
    children: Vec<serde_json::Value>,
    parent: &str,
) -> RowToDocResult<Vec<QueryDocument>> {
    children
        .into_iter()
        .enumerate()
        .map(|(index, child)| {
            serde_json::from_value(child)
                .map_err(|e| RowToDocError::configuration(child_path(parent, index), e.to_string()))
        })
        .collect()
}

fn children_from_documents(
    documents: Vec<QueryDocument>,
    parent: &str,
) -> RowToDocResult<Vec<ChildQuery>> {
    documents
        .into_iter()
        .enumerate()
        .map(|(index, document)| child_from_document(document, &child_path(parent, index)))
        .collect()
}

fn child_from_document(document: QueryDocument, path: &str) -> RowToDocResult<ChildQuery> {
    let required = |field: Option<String>, name: &str| {
        field
            .filter(|value| !is_blank(value))
            .ok_or_else(|| RowToDocError::configuration(path, format!("`{}` is required", name)))
    };

    Ok(ChildQuery {
        query: required(document.query, "query")?,
        primary_key_column_name: required(
            document.primary_key_column_name,
            "primaryKeyColumnName",
        )?,
        foreign_key_column_name: required(
            document.foreign_key_column_name,
            "foreignKeyColumnName",
        )?,
        property_name: required(document.property_name, "propertyName")?,
        cardinality: document.relationship.unwrap_or_default(),
        child_queries: children_from_documents(document.child_queries, path)?,
    })
}

fn validate_children(children: &[ChildQuery], parent: &str) -> RowToDocResult<()> {
    let mut properties = HashSet::new();

    for (index, child) in children.iter().enumerate() {
        let path = child_path(parent, index);

        for (name, value) in [
            ("query", &child.query),
            ("primaryKeyColumnName", &child.primary_key_column_name),
            ("foreignKeyColumnName", &child.foreign_key_column_name),
            ("propertyName", &child.property_name),
        ] {
            if is_blank(value) {
                return Err(RowToDocError::configuration(
                    path,
                    format!("`{}` must not be blank", name),
                ));
            }
        }

        if !properties.insert(child.property_name.as_str()) {
            return Err(RowToDocError::configuration(
                path,
                format!("duplicate propertyName `{}`", child.property_name),
            ));
        }

        validate_children(&child.child_queries, &path)?;
    }

    Ok(())
}
