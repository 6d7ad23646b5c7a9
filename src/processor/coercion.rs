use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::debug;

use super::schema::{ColumnKind, ColumnSpec};

/// A value after it has been checked against its column kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Str(Option<String>),
    Int(i64),
    Bool(bool),
    Timestamp(Option<NaiveDateTime>),
    Date(Option<NaiveDate>),
    Opaque(String),
}

const OPAQUE_DEFAULT: &str = "[]";

/// Parses a timestamp keeping its wall-clock value; any UTC offset is dropped, not applied.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Checks `value` against the column's kind, replacing mismatches with the kind's default.
pub fn coerce(spec: &ColumnSpec, value: &Value) -> Cell {
    let cell = match spec.kind {
        ColumnKind::String => Cell::Str(match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        ColumnKind::Int => Cell::Int(match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => i,
                None => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => f as i64,
                    _ => return mismatch(spec, value, Cell::Int(0)),
                },
            },
            Value::Null => 0,
            _ => return mismatch(spec, value, Cell::Int(0)),
        }),
        ColumnKind::Bool => match value {
            Value::Bool(b) => Cell::Bool(*b),
            Value::Null => Cell::Bool(false),
            _ => return mismatch(spec, value, Cell::Bool(false)),
        },
        ColumnKind::Timestamp => Cell::Timestamp(value.as_str().and_then(parse_timestamp)),
        ColumnKind::Date => Cell::Date(
            value
                .as_str()
                .and_then(parse_timestamp)
                .map(|ts| ts.date()),
        ),
        ColumnKind::Opaque => match value {
            Value::Array(_) | Value::Object(_) => Cell::Opaque(value.to_string()),
            _ => Cell::Opaque(OPAQUE_DEFAULT.to_string()),
        },
    };

    if !value.is_null() && is_default(&cell) {
        debug!("Column {} defaulted from {}", spec.name, value);
    }
    cell
}

fn mismatch(spec: &ColumnSpec, value: &Value, default: Cell) -> Cell {
    debug!("Column {} expected {:?}, got {}", spec.name, spec.kind, value);
    default
}

fn is_default(cell: &Cell) -> bool {
    matches!(
        cell,
        Cell::Str(None) | Cell::Timestamp(None) | Cell::Date(None)
    ) || matches!(cell, Cell::Opaque(s) if s == OPAQUE_DEFAULT)
}
