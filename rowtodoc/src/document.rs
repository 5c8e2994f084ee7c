//!
//! JSON documents from enriched rows.
//!
//! Records become objects, lists become arrays, and scalars are written
//! through a [`ScalarFormatter`] at every nesting depth.
//!

use std::fmt::Write;
use std::sync::Arc;

use base64::Engine as _;
use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::row::Row;
use crate::value::Value;
use crate::{RowToDocError, RowToDocResult};

/// ISO calendar date.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Formatting of the scalars JSON has no native type for.
pub trait ScalarFormatter: std::fmt::Debug + Send + Sync {
    fn format_date(&self, date: &NaiveDate) -> String;

    fn format_timestamp(&self, timestamp: &NaiveDateTime) -> String;

    fn format_bytes(&self, bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }
}

/// Formats dates and timestamps with strftime patterns.
#[derive(Clone, Debug)]
pub struct PatternFormatter {
    date_format: String,
    timestamp_format: String,
}

impl PatternFormatter {
    /// Patterns are checked here, so formatting itself cannot fail.
    pub fn new(
        date_format: impl Into<String>,
        timestamp_format: impl Into<String>,
    ) -> RowToDocResult<Self> {
        let date_format = date_format.into();
        let timestamp_format = timestamp_format.into();

        let sample = NaiveDate::from_ymd_opt(2018, 9, 1)
            .and_then(|date| date.and_hms_opt(12, 30, 0))
            .ok_or_else(|| RowToDocError::configuration("date_format", "no sample date"))?;
        check_pattern("date_format", &date_format, |out, pattern| {
            write!(out, "{}", sample.date().format(pattern))
        })?;
        check_pattern("timestamp_format", &timestamp_format, |out, pattern| {
            write!(out, "{}", sample.format(pattern))
        })?;

        Ok(Self {
            date_format,
            timestamp_format,
        })
    }
}

impl Default for PatternFormatter {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl ScalarFormatter for PatternFormatter {
    fn format_date(&self, date: &NaiveDate) -> String {
        date.format(&self.date_format).to_string()
    }

    fn format_timestamp(&self, timestamp: &NaiveDateTime) -> String {
        timestamp.format(&self.timestamp_format).to_string()
    }
}

fn check_pattern(
    field: &str,
    pattern: &str,
    format: impl FnOnce(&mut String, &str) -> std::fmt::Result,
) -> RowToDocResult<()> {
    let mut out = String::new();
    format(&mut out, pattern).map_err(|_| {
        RowToDocError::configuration(field, format!("invalid format pattern `{}`", pattern))
    })
}

/// Serializes one row into one standalone JSON document.
#[derive(Clone, Debug)]
pub struct DocumentWriter {
    formatter: Arc<dyn ScalarFormatter>,
}

impl DocumentWriter {
    pub fn new(formatter: impl ScalarFormatter + 'static) -> Self {
        Self {
            formatter: Arc::new(formatter),
        }
    }

    pub fn to_json(&self, row: &Row) -> RowToDocResult<String> {
        Ok(serde_json::to_string(&Formatted {
            value: row,
            formatter: self.formatter.as_ref(),
        })?)
    }

    /// One document per row, in batch order.
    pub fn write_batch(&self, rows: &[Row]) -> RowToDocResult<Vec<String>> {
        rows.iter().map(|row| self.to_json(row)).collect()
    }
}

impl Default for DocumentWriter {
    fn default() -> Self {
        Self::new(PatternFormatter::default())
    }
}

struct Formatted<'a, T: ?Sized> {
    value: &'a T,
    formatter: &'a dyn ScalarFormatter,
}

impl<'a, T: ?Sized> Formatted<'a, T> {
    fn wrap<U: ?Sized>(&self, value: &'a U) -> Formatted<'a, U> {
        Formatted {
            value,
            formatter: self.formatter,
        }
    }
}

impl Serialize for Formatted<'_, Row> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.value.len()))?;
        for (column, value) in self.value.iter() {
            map.serialize_entry(column, &self.wrap(value))?;
        }
        map.end()
    }
}

impl Serialize for Formatted<'_, Value> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&self.formatter.format_bytes(b)),
            Value::Date(d) => serializer.serialize_str(&self.formatter.format_date(d)),
            Value::Timestamp(ts) => serializer.serialize_str(&self.formatter.format_timestamp(ts)),
            Value::Record(row) => self.wrap(row).serialize(serializer),
            Value::List(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(&self.wrap(value))?;
                }
                seq.end()
            }
        }
    }
}
