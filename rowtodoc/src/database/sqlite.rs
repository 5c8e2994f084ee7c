use chrono::{NaiveDate, NaiveDateTime};
use futures_util::stream::BoxStream;
use futures_util::{future, StreamExt, TryStreamExt};
use sqlx::sqlite::{SqliteColumn, SqliteConnection, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use super::{Database, DatabaseError};
use crate::row::Row;
use crate::value::Value;

impl Database for SqliteConnection {
    fn fetch<'c>(&'c mut self, sql: &'c str) -> BoxStream<'c, Result<Row, DatabaseError>> {
        sqlx::query(sql)
            .fetch(self)
            .map_err(DatabaseError::from)
            .and_then(|row| future::ready(decode_row(&row)))
            .boxed()
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row, DatabaseError> {
    let mut decoded = Row::with_capacity(row.len());
    for column in row.columns() {
        decoded.insert(column.name(), decode_value(row, column)?);
    }
    Ok(decoded)
}

fn decode_value(row: &SqliteRow, column: &SqliteColumn) -> Result<Value, DatabaseError> {
    let index = column.ordinal();
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    // SQLite stores these as TEXT or INTEGER; only the declared type tells them apart.
    let declared = column.type_info().name();
    let storage = raw.type_info();
    let type_name = match declared {
        "BOOLEAN" | "DATE" | "DATETIME" => declared,
        _ => storage.name(),
    };

    let value = match type_name {
        "INTEGER" => Value::Int(row.try_get_unchecked(index)?),
        "REAL" => Value::Float(row.try_get_unchecked(index)?),
        "TEXT" => Value::Text(row.try_get_unchecked(index)?),
        "BLOB" => Value::Bytes(row.try_get_unchecked(index)?),
        "BOOLEAN" => Value::Bool(row.try_get_unchecked(index)?),
        "DATE" => Value::Date(row.try_get_unchecked::<NaiveDate, _>(index)?),
        "DATETIME" => Value::Timestamp(row.try_get_unchecked::<NaiveDateTime, _>(index)?),
        other => return Err(DatabaseError::unsupported(column.name(), other)),
    };

    Ok(value)
}
