//!
//! Dynamically typed column values.
//!
//! A `Value` is either a scalar as returned by the database driver,
//! or a nested structure attached while resolving child queries.
//!

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::row::Row;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    /// All driver integer widths are widened to `i64`.
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Record(Row),
    List(Vec<Value>),
}

impl Value {
    pub fn as_record(&self) -> Option<&Row> {
        match self {
            Value::Record(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    /// The key used to match this value against a primary/foreign key.
    ///
    /// `None` never matches anything: nulls, nested values and NaN.
    pub fn group_key(&self) -> Option<GroupKey> {
        match self {
            Value::Null | Value::Record(_) | Value::List(_) => None,
            Value::Bool(b) => Some(GroupKey::Bool(*b)),
            Value::Int(i) => Some(GroupKey::Int(*i)),
            Value::Float(f) if f.is_nan() => None,
            // -0.0 == 0.0
            Value::Float(f) => Some(GroupKey::Float((f + 0.0).to_bits())),
            Value::Text(s) => Some(GroupKey::Text(s.clone())),
            Value::Bytes(b) => Some(GroupKey::Bytes(b.clone())),
            Value::Date(d) => Some(GroupKey::Date(*d)),
            Value::Timestamp(ts) => Some(GroupKey::Timestamp(*ts)),
        }
    }

    /// Convert a plain JSON value, e.g. a parsed document or a json column.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(values) => {
                Value::List(values.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Record(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from_json(value)))
                    .collect(),
            ),
        }
    }
}

/// Hashable projection of a scalar `Value`, compared with the
/// equality the driver returned the value with (`Int(1)` != `Float(1.0)`).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum GroupKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value.into())
                }
            }
        )*
    };
}

impl_from!(
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
    Row => Record
);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
