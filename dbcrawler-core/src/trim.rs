//! Row trimming for bounded samples and previews.

use crate::models::Row;
use serde_json::Value;

/// Caps a row set at `max_rows` rows and every value at `max_value_length`
/// characters.
///
/// Non-positive bounds mean "unlimited". A non-null value whose string form
/// is longer than the bound is replaced by the first `max_value_length`
/// characters of that string form; shorter values keep their native type.
/// Nulls never change.
///
/// # Example
/// ```rust
/// use dbcrawler_core::trim::trim;
/// use serde_json::{Map, json};
///
/// let mut row = Map::new();
/// row.insert("note".into(), json!("abcdef"));
/// row.insert("qty".into(), json!(12345));
/// let trimmed = trim(vec![row.clone(), row], 1, 3);
/// assert_eq!(trimmed.len(), 1);
/// assert_eq!(trimmed[0]["note"], json!("abc"));
/// assert_eq!(trimmed[0]["qty"], json!("123"));
/// ```
pub fn trim(rows: Vec<Row>, max_rows: i64, max_value_length: i64) -> Vec<Row> {
    let row_limit = usize::try_from(max_rows).ok().filter(|n| *n > 0);
    let value_limit = usize::try_from(max_value_length).ok().filter(|n| *n > 0);

    let rows = rows.into_iter().take(row_limit.unwrap_or(usize::MAX));
    match value_limit {
        None => rows.collect(),
        Some(limit) => rows.map(|row| trim_row(row, limit)).collect(),
    }
}

/// Applies the value bound to one row in place of its values.
pub fn trim_row(row: Row, max_value_length: usize) -> Row {
    row.into_iter()
        .map(|(column, value)| (column, trim_value(value, max_value_length)))
        .collect()
}

fn trim_value(value: Value, limit: usize) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => {
            if s.chars().count() > limit {
                Value::String(s.chars().take(limit).collect())
            } else {
                Value::String(s)
            }
        }
        other => {
            let text = other.to_string();
            if text.chars().count() > limit {
                Value::String(text.chars().take(limit).collect())
            } else {
                other
            }
        }
    }
}
