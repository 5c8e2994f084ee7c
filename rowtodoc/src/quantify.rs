//!
//! Quantification of child groups.
//!
//! In this context it means mapping the group of child rows matching
//! one parent into the value attached to that parent.
//!

use serde::{Deserialize, Serialize};

use crate::row::Row;
use crate::value::Value;

/// How many child rows one parent row relates to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    /// Attach the whole matching group as a list, possibly empty.
    #[default]
    OneToMany,
    /// Attach the first matching row, or null.
    OneToOne,
}

impl Cardinality {
    /// Quantify a group of matching child rows.
    pub fn quantify<'r, I>(self, group: I) -> Value
    where
        I: IntoIterator<Item = &'r Row>,
    {
        let mut group = group.into_iter();
        match self {
            Cardinality::OneToMany => {
                Value::List(group.map(|row| Value::Record(row.clone())).collect())
            }
            Cardinality::OneToOne => group
                .next()
                .map(|row| Value::Record(row.clone()))
                .unwrap_or(Value::Null),
        }
    }

    /// The value attached when no child row matches.
    pub fn empty(self) -> Value {
        match self {
            Cardinality::OneToMany => Value::List(vec![]),
            Cardinality::OneToOne => Value::Null,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Cardinality::OneToMany => write!(f, "one-to-many"),
            Cardinality::OneToOne => write!(f, "one-to-one"),
        }
    }
}
