//!
//! The row record flowing through the pipeline.
//!

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;
use crate::{RowToDocError, RowToDocResult};

/// One record of column name to value data.
///
/// Column order is insertion order, which is also the order in which
/// the columns are written to documents. Resolution only ever adds keys.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: IndexMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Insert a value. An existing column keeps its position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse a JSON document back into a row.
    ///
    /// Scalars come back as their JSON kinds: formatted dates and
    /// timestamps are text.
    pub fn from_json_document(document: &str) -> RowToDocResult<Self> {
        match Value::from_json(serde_json::from_str(document)?) {
            Value::Record(row) => Ok(row),
            _ => Err(RowToDocError::Serialization(serde::de::Error::custom(
                "document is not a JSON object",
            ))),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<'r> IntoIterator for &'r Row {
    type Item = (&'r String, &'r Value);
    type IntoIter = indexmap::map::Iter<'r, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

/// Build a `Row` from `column => value` pairs.
///
/// ```
/// let row = rowtodoc::row! { "id" => 1, "customer" => "A" };
/// assert_eq!(row.len(), 2);
/// ```
#[macro_export]
macro_rules! row {
    () => { $crate::row::Row::new() };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::row::Row::new();
        $( row.insert($column, $value); )+
        row
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinsert_keeps_position() {
        let mut row = crate::row! { "a" => 1, "b" => 2 };
        row.insert("a", "x");
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&Value::Text("x".into())));
    }

    #[test]
    fn document_must_be_an_object() {
        assert!(Row::from_json_document("[1, 2]").is_err());
        let row = Row::from_json_document(r#"{"z": 1, "a": null}"#).unwrap();
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(row.get("a"), Some(&Value::Null));
    }
}
