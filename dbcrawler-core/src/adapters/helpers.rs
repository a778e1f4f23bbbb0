//! Helper utilities shared by the sqlx-based drivers.

use crate::models::Row;
use base64::Engine;
use serde_json::Value as JsonValue;
use sqlx::{Column, ColumnIndex, Decode, Row as SqlxRow, Type, TypeInfo, ValueRef};

/// Converts a driver row to a JSON row, keeping column order.
#[cfg_attr(not(feature = "sqlite"), allow(dead_code))]
pub(crate) fn row_to_map<R>(row: &R) -> Row
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> chrono::NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> chrono::NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> chrono::NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
{
    row_to_map_with(row, |_, _| None)
}

/// Like [`row_to_map`], but offers every non-null value to `native` first.
/// Drivers use it for types the shared decode chain cannot express.
#[cfg_attr(not(any(feature = "mysql", feature = "sqlite")), allow(dead_code))]
pub(crate) fn row_to_map_with<R, F>(row: &R, native: F) -> Row
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> chrono::NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> chrono::NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> chrono::NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
    F: Fn(&R, usize) -> Option<JsonValue>,
{
    let mut map = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(
            column.name().to_string(),
            extract_column_value(row, index, &native),
        );
    }
    map
}

/// Extract a column value as a JSON value.
///
/// Types are tried in order of likelihood, after the driver's own decoder.
/// Values nothing accepts are reported by type name rather than silently
/// dropped.
#[cfg_attr(not(any(feature = "mysql", feature = "sqlite")), allow(dead_code))]
pub(crate) fn extract_column_value<R, F>(row: &R, index: usize, native: &F) -> JsonValue
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> chrono::NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> chrono::NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> chrono::NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
    F: Fn(&R, usize) -> Option<JsonValue>,
{
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return JsonValue::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return JsonValue::Null,
    };

    if let Some(value) = native(row, index) {
        return value;
    }

    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v
            .map(|n| JsonValue::Number(n.into()))
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(JsonValue::Bool).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v
            .map(|t| JsonValue::String(t.to_string()))
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return v
            .map(|d| JsonValue::String(d.to_string()))
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(index) {
        return v
            .map(|t| JsonValue::String(t.to_string()))
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        // For BLOB data, convert to base64 string
        return v.map(|bytes| encode_binary(&bytes)).unwrap_or(JsonValue::Null);
    }

    JsonValue::String(format!("<unsupported {}>", type_name))
}

/// Exact decimals travel as strings, scale included, so no digit is lost to
/// `f64`.
#[cfg(feature = "mysql")]
pub(crate) fn decimal_value(value: &sqlx::types::BigDecimal) -> JsonValue {
    JsonValue::String(value.to_string())
}

/// Binary values travel as `base64:`-prefixed strings.
#[cfg_attr(not(any(feature = "mysql", feature = "sqlite")), allow(dead_code))]
pub(crate) fn encode_binary(bytes: &[u8]) -> JsonValue {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    JsonValue::String(format!("base64:{}", encoded))
}

/// Saturating conversion for counts reported as signed integers.
pub(crate) fn count_to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_binary_prefix() {
        assert_eq!(encode_binary(b"hi"), JsonValue::String("base64:aGk=".to_string()));
    }

    #[cfg(feature = "mysql")]
    #[test]
    fn test_decimal_keeps_every_digit() {
        use std::str::FromStr;
        let price = sqlx::types::BigDecimal::from_str("12345678901234567890.125").unwrap();
        assert_eq!(
            decimal_value(&price),
            JsonValue::String("12345678901234567890.125".to_string())
        );
        let whole = sqlx::types::BigDecimal::from_str("10.00").unwrap();
        assert_eq!(decimal_value(&whole), JsonValue::String("10.00".to_string()));
    }

    #[test]
    fn test_negative_counts_clamp_to_zero() {
        assert_eq!(count_to_u64(-1), 0);
        assert_eq!(count_to_u64(42), 42);
    }
}
