use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::{future, StreamExt, TryStreamExt};
use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};
use sqlx::postgres::{PgColumn, PgConnection, PgRow};
use sqlx::types::Decimal;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use super::{Database, DatabaseError};
use crate::row::Row;
use crate::value::Value;

impl Database for PgConnection {
    fn fetch<'c>(&'c mut self, sql: &'c str) -> BoxStream<'c, Result<Row, DatabaseError>> {
        sqlx::query(sql)
            .fetch(self)
            .map_err(DatabaseError::from)
            .and_then(|row| future::ready(decode_row(&row)))
            .boxed()
    }
}

/// How a Postgres column is read, by type name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PgKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    /// Kept as text, since an `f64` would round it.
    Numeric,
    Text,
    Bytes,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    Json,
}

fn kind_of(type_name: &str) -> Option<PgKind> {
    let kind = match type_name {
        "BOOL" => PgKind::Bool,
        "INT2" => PgKind::Int2,
        "INT4" => PgKind::Int4,
        "INT8" => PgKind::Int8,
        "OID" => PgKind::Oid,
        "FLOAT4" => PgKind::Float4,
        "FLOAT8" => PgKind::Float8,
        "NUMERIC" => PgKind::Numeric,
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => PgKind::Text,
        "BYTEA" => PgKind::Bytes,
        "DATE" => PgKind::Date,
        "TIME" => PgKind::Time,
        "TIMETZ" => PgKind::TimeTz,
        "TIMESTAMP" => PgKind::Timestamp,
        "TIMESTAMPTZ" => PgKind::TimestampTz,
        "INTERVAL" => PgKind::Interval,
        "UUID" => PgKind::Uuid,
        "JSON" | "JSONB" => PgKind::Json,
        _ => return None,
    };
    Some(kind)
}

fn decode_row(row: &PgRow) -> Result<Row, DatabaseError> {
    let mut decoded = Row::with_capacity(row.len());
    for column in row.columns() {
        decoded.insert(column.name(), decode_value(row, column)?);
    }
    Ok(decoded)
}

fn decode_value(row: &PgRow, column: &PgColumn) -> Result<Value, DatabaseError> {
    let index = column.ordinal();
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let type_name = column.type_info().name();
    let kind =
        kind_of(type_name).ok_or_else(|| DatabaseError::unsupported(column.name(), type_name))?;

    let value = match kind {
        PgKind::Bool => Value::Bool(row.try_get(index)?),
        PgKind::Int2 => Value::Int(row.try_get::<i16, _>(index)?.into()),
        PgKind::Int4 => Value::Int(row.try_get::<i32, _>(index)?.into()),
        PgKind::Int8 => Value::Int(row.try_get(index)?),
        PgKind::Oid => Value::Int(row.try_get::<Oid, _>(index)?.0.into()),
        PgKind::Float4 => Value::Float(row.try_get::<f32, _>(index)?.into()),
        PgKind::Float8 => Value::Float(row.try_get(index)?),
        PgKind::Numeric => Value::Text(row.try_get::<Decimal, _>(index)?.to_string()),
        PgKind::Text => Value::Text(row.try_get(index)?),
        PgKind::Bytes => Value::Bytes(row.try_get(index)?),
        PgKind::Date => Value::Date(row.try_get::<NaiveDate, _>(index)?),
        PgKind::Time => Value::Text(row.try_get::<NaiveTime, _>(index)?.to_string()),
        PgKind::TimeTz => {
            let time = row.try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(index)?;
            Value::Text(format!("{}{}", time.time, time.offset))
        }
        PgKind::Timestamp => Value::Timestamp(row.try_get::<NaiveDateTime, _>(index)?),
        PgKind::TimestampTz => {
            Value::Timestamp(row.try_get::<DateTime<Utc>, _>(index)?.naive_utc())
        }
        PgKind::Interval => Value::Text(format_interval(&row.try_get::<PgInterval, _>(index)?)),
        PgKind::Uuid => Value::Text(row.try_get::<sqlx::types::Uuid, _>(index)?.to_string()),
        PgKind::Json => Value::from_json(row.try_get::<sqlx::types::JsonValue, _>(index)?),
    };

    Ok(value)
}

/// ISO 8601 duration, e.g. `P1Y2M3DT4H5M6.5S`.
fn format_interval(interval: &PgInterval) -> String {
    const MICROS_PER_SECOND: i64 = 1_000_000;
    const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
    const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

    let mut out = String::from("P");
    let years = interval.months / 12;
    let months = interval.months % 12;
    if years != 0 {
        out.push_str(&format!("{}Y", years));
    }
    if months != 0 {
        out.push_str(&format!("{}M", months));
    }
    if interval.days != 0 {
        out.push_str(&format!("{}D", interval.days));
    }

    let micros = interval.microseconds;
    if micros != 0 {
        out.push('T');
        let hours = micros / MICROS_PER_HOUR;
        let minutes = micros % MICROS_PER_HOUR / MICROS_PER_MINUTE;
        let rest = micros % MICROS_PER_MINUTE;
        if hours != 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes != 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if rest != 0 {
            let sign = if rest < 0 { "-" } else { "" };
            let rest = rest.abs();
            let seconds = rest / MICROS_PER_SECOND;
            let fraction = rest % MICROS_PER_SECOND;
            if fraction == 0 {
                out.push_str(&format!("{}{}S", sign, seconds));
            } else {
                let fraction = format!("{:06}", fraction);
                let fraction = fraction.trim_end_matches('0');
                out.push_str(&format!("{}{}.{}S", sign, seconds, fraction));
            }
        }
    }

    if out == "P" {
        out.push_str("T0S");
    }
    out
}
