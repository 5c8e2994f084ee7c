//!
//! Child query resolution.
//!
//! Each node of the query tree runs exactly once per batch, however many
//! parent rows the batch holds:
//!
//! ```text
//!  parents (n rows)          items query (1x)           skus query (1x)
//!  ┌────────┐  id = order_id  ┌──────────────┐  sku = sku  ┌─────────┐
//!  │ orders │ ◀────────────── │ line_items   │ ◀────────── │ skus    │
//!  └────────┘   group by fk   └──────────────┘  group by fk└─────────┘
//! ```
//!
//! The rows fetched for a node are grouped by the node's foreign key and each
//! group is attached to the parent rows with the matching primary key. The
//! node's own children are then resolved against the whole flat set of rows
//! it fetched, never group by group.
//!

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::debug;

use crate::database::Database;
use crate::query::{ChildQuery, TableQuery};
use crate::row::Row;
use crate::value::GroupKey;
use crate::{RowSide, RowToDocError, RowToDocResult};

/// What one resolution did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExecutionStats {
    /// Child queries run against the database.
    pub queries: usize,
    /// Rows fetched by those queries.
    pub rows_fetched: usize,
}

/// Resolve the child queries of `tree` against a batch of parent rows.
///
/// The rows are enriched in place. On error, whatever was attached before the
/// failing node stays attached and the batch must be treated as failed.
pub async fn resolve_children<D>(
    db: &mut D,
    tree: &TableQuery,
    parents: &mut [Row],
) -> RowToDocResult<ExecutionStats>
where
    D: Database + ?Sized,
{
    let mut stats = ExecutionStats::default();
    resolve_level(db, tree.child_queries(), parents, "", &mut stats).await?;
    Ok(stats)
}

fn resolve_level<'a, D>(
    db: &'a mut D,
    children: &'a [ChildQuery],
    parents: &'a mut [Row],
    parent_path: &'a str,
    stats: &'a mut ExecutionStats,
) -> BoxFuture<'a, RowToDocResult<()>>
where
    D: Database + ?Sized,
{
    async move {
        if parents.is_empty() {
            return Ok(());
        }

        for child in children {
            let path = node_path(parent_path, child.property_name());
            let parent_keys = parent_keys(parents, child, &path)?;

            debug!(node = %path, query = child.query(), "executing child query");
            let mut fetched = db
                .fetch_all(child.query())
                .await
                .map_err(|source| RowToDocError::QueryExecution {
                    node: path.clone(),
                    source,
                })?;
            stats.queries += 1;
            stats.rows_fetched += fetched.len();
            debug!(node = %path, rows = fetched.len(), "child query fetched");

            let groups = group_by_foreign_key(&fetched, child, &path)?;
            attach(parents, &parent_keys, &groups, &fetched, child);

            if !child.child_queries().is_empty() && !fetched.is_empty() {
                resolve_level(db, child.child_queries(), &mut fetched, &path, stats).await?;
                // The groups attached above are copies taken before the
                // grandchildren were merged into `fetched`.
                attach(parents, &parent_keys, &groups, &fetched, child);
            }
        }

        Ok(())
    }
    .boxed()
}

fn node_path(parent_path: &str, property: &str) -> String {
    if parent_path.is_empty() {
        property.to_string()
    } else {
        format!("{}.{}", parent_path, property)
    }
}

/// Look up every parent's primary key up front, so a missing column fails
/// before the child query is run.
fn parent_keys(
    parents: &[Row],
    child: &ChildQuery,
    path: &str,
) -> RowToDocResult<Vec<Option<GroupKey>>> {
    let column = child.primary_key_column_name();
    parents
        .iter()
        .map(|parent| {
            parent
                .get(column)
                .map(|value| value.group_key())
                .ok_or_else(|| schema_mismatch(path, column, RowSide::Parent))
        })
        .collect()
}

/// Group the fetched rows by foreign key, as indices into `fetched`
/// in result-set order.
fn group_by_foreign_key(
    fetched: &[Row],
    child: &ChildQuery,
    path: &str,
) -> RowToDocResult<HashMap<GroupKey, Vec<usize>>> {
    let column = child.foreign_key_column_name();
    let mut groups: HashMap<GroupKey, Vec<usize>> = HashMap::new();

    for (index, row) in fetched.iter().enumerate() {
        let value = row
            .get(column)
            .ok_or_else(|| schema_mismatch(path, column, RowSide::Child))?;

        if let Some(key) = value.group_key() {
            groups.entry(key).or_default().push(index);
        }
    }

    Ok(groups)
}

fn attach(
    parents: &mut [Row],
    parent_keys: &[Option<GroupKey>],
    groups: &HashMap<GroupKey, Vec<usize>>,
    fetched: &[Row],
    child: &ChildQuery,
) {
    let cardinality = child.cardinality();

    for (parent, key) in parents.iter_mut().zip(parent_keys) {
        let value = match key.as_ref().and_then(|key| groups.get(key)) {
            Some(indices) => cardinality.quantify(indices.iter().map(|&i| &fetched[i])),
            None => cardinality.empty(),
        };
        parent.insert(child.property_name(), value);
    }
}

fn schema_mismatch(path: &str, column: &str, side: RowSide) -> RowToDocError {
    RowToDocError::SchemaMismatch {
        node: path.to_string(),
        column: column.to_string(),
        side,
    }
}
