// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL parameter encoding and row decoding helpers

use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use compact_str::CompactString;
use serde_json::{Number, Value};
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgRow, PgTypeInfo, Postgres};
use sqlx::{Column, Row, Type, TypeInfo, ValueRef};
use uuid::Uuid;

use sqlgate_core::{FieldInfo, Record};

/// A text parameter sent as the type PostgreSQL inferred for its placeholder.
///
/// sqlx transmits parameters in binary format, so the text has to be
/// converted before it goes on the wire. This lets `WHERE id = $1` and
/// `LIMIT $1` work with `["3"]` and no cast in the query.
#[derive(Debug, Clone)]
pub(crate) struct InferredParam {
    value: Option<String>,
    type_info: PgTypeInfo,
}

impl InferredParam {
    /// `inferred` is `None` when the server reported no type for this
    /// position; the value is then sent as `text`.
    pub(crate) fn new(value: Option<String>, inferred: Option<&PgTypeInfo>) -> Self {
        Self {
            value,
            type_info: inferred
                .cloned()
                .unwrap_or_else(<String as Type<Postgres>>::type_info),
        }
    }
}

impl Type<Postgres> for InferredParam {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }
}

impl Encode<'_, Postgres> for InferredParam {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        match self.value.as_deref() {
            None => Ok(IsNull::Yes),
            Some(text) => encode_text_as(text, &self.type_info, buf),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.type_info.clone())
    }
}

fn encode_text_as(
    text: &str,
    type_info: &PgTypeInfo,
    buf: &mut PgArgumentBuffer,
) -> Result<IsNull, BoxDynError> {
    match type_info.name() {
        "INT2" => encode_parsed::<i16>(text, buf),
        "INT4" => encode_parsed::<i32>(text, buf),
        "INT8" => encode_parsed::<i64>(text, buf),
        "FLOAT4" => encode_parsed::<f32>(text, buf),
        "FLOAT8" => encode_parsed::<f64>(text, buf),
        "NUMERIC" => encode_parsed::<BigDecimal>(text, buf),
        "UUID" => encode_parsed::<Uuid>(text, buf),
        "DATE" => encode_parsed::<NaiveDate>(text, buf),
        "TIME" => encode_parsed::<NaiveTime>(text, buf),
        "BOOL" => <bool as Encode<'_, Postgres>>::encode_by_ref(&parse_bool(text)?, buf),
        "TIMESTAMP" => {
            let value = parse_timestamp(text)?;
            <NaiveDateTime as Encode<'_, Postgres>>::encode_by_ref(&value, buf)
        }
        "TIMESTAMPTZ" => {
            let value = parse_timestamptz(text)?;
            <DateTime<Utc> as Encode<'_, Postgres>>::encode_by_ref(&value, buf)
        }
        "JSONB" => {
            // jsonb binary format: version byte, then the document text
            buf.push(1);
            buf.extend_from_slice(text.as_bytes());
            Ok(IsNull::No)
        }
        // text-like types, json, and anything else the server parses from text
        _ => <&str as Encode<'_, Postgres>>::encode_by_ref(&text, buf),
    }
}

fn encode_parsed<T>(text: &str, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError>
where
    T: FromStr + for<'q> Encode<'q, Postgres>,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: T = text.trim().parse()?;
    <T as Encode<'_, Postgres>>::encode_by_ref(&value, buf)
}

fn parse_bool(text: &str) -> Result<bool, BoxDynError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(format!("invalid input syntax for type boolean: \"{text}\"").into()),
    }
}

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, BoxDynError> {
    let text = text.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::from_str(text)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("invalid input syntax for type timestamp: \"{text}\"").into())
}

/// RFC 3339, or a timestamp without offset taken as UTC.
fn parse_timestamptz(text: &str) -> Result<DateTime<Utc>, BoxDynError> {
    match DateTime::parse_from_rfc3339(text.trim()) {
        Ok(with_offset) => Ok(with_offset.with_timezone(&Utc)),
        Err(_) => parse_timestamp(text).map(|naive| naive.and_utc()),
    }
}

/// Converts a row into a record keyed by column name, in column order.
pub(crate) fn convert_row(pg_row: &PgRow) -> Record {
    pg_row
        .columns()
        .iter()
        .map(|col| (col.name().to_string(), extract_value(pg_row, col.ordinal())))
        .collect()
}

pub(crate) fn field_info(pg_row: &PgRow) -> Vec<FieldInfo> {
    pg_row
        .columns()
        .iter()
        .map(|col| FieldInfo {
            name: CompactString::from(col.name()),
            type_id: col.type_info().oid().map(|oid| oid.0),
            type_name: CompactString::from(col.type_info().name()),
        })
        .collect()
}

fn float(f: f64) -> Value {
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(f.to_string()))
}

/// `bytea` values travel as standard base64.
fn binary(bytes: &[u8]) -> Value {
    Value::String(STANDARD.encode(bytes))
}

/// Decodes one column, trying common types from most to least specific.
///
/// `numeric` values are returned as exact text. Unknown types fall back to
/// the raw text representation.
pub(crate) fn extract_value(row: &PgRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| float(f as f64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(idx) {
        return v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Uuid>, _>(idx) {
        return v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v
            .map(|bytes| binary(&bytes))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<i64>>, _>(idx) {
        return v
            .map(|vals| Value::Array(vals.into_iter().map(Value::from).collect()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<i32>>, _>(idx) {
        return v
            .map(|vals| Value::Array(vals.into_iter().map(Value::from).collect()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<f64>>, _>(idx) {
        return v
            .map(|vals| Value::Array(vals.into_iter().map(float).collect()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<bool>>, _>(idx) {
        return v
            .map(|vals| Value::Array(vals.into_iter().map(Value::Bool).collect()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<Option<String>>>, _>(idx) {
        return v
            .map(|vals| {
                Value::Array(
                    vals.into_iter()
                        .map(|item| item.map(Value::String).unwrap_or(Value::Null))
                        .collect(),
                )
            })
            .unwrap_or(Value::Null);
    }

    if let Ok(raw) = row.try_get_raw(idx) {
        if raw.is_null() {
            return Value::Null;
        }
        if let Ok(text) = raw.as_str() {
            return Value::String(text.to_string());
        }
        if let Ok(bytes) = raw.as_bytes() {
            if !bytes.is_empty() {
                return Value::String(String::from_utf8_lossy(bytes).to_string());
            }
        }
    }
    Value::Null
}
