//! Row and value types handed back by the relational client.

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

use crate::types::FieldType;

/// Canonical text form of date/time cursor values (`yyyy-MM-dd HH:mm:ss`).
pub const CURSOR_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single column value of a source row.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl SourceValue {
    /// Null values and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Bytes(b) => b.iter().all(u8::is_ascii_whitespace),
            _ => false,
        }
    }

    /// Text view of textual values; binary values are decoded lossily.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Integer view, parsing textual integers.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(i) => u64::try_from(*i).ok(),
            Self::UInt(u) => Some(*u),
            Self::Float(f) if *f >= 0.0 => Some(*f as u64),
            Self::Text(_) | Self::Bytes(_) => self.as_text()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// Natural string form used for cursors and document-id segments.
    ///
    /// Dates and timestamps use [`CURSOR_DATETIME_FORMAT`]; null is empty.
    pub fn to_cursor_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => u8::from(*b).to_string(),
            Self::Int(i) => i.to_string(),
            Self::UInt(u) => u.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.format(CURSOR_DATETIME_FORMAT).to_string())
                .unwrap_or_default(),
            Self::DateTime(dt) => dt.format(CURSOR_DATETIME_FORMAT).to_string(),
        }
    }

    /// Document field value.
    ///
    /// Blank values become a single space so suggest-analyzed fields are not
    /// rejected on null. Dates become epoch milliseconds to match the `long`
    /// field type inferred for time columns, or keep their text form when the
    /// field is mapped as text. Integers 0/1 become booleans when the field is
    /// mapped as boolean.
    pub fn to_field_value(&self, field_type: Option<FieldType>) -> Value {
        if self.is_blank() {
            return Value::String(" ".to_string());
        }
        match (self, field_type) {
            (Self::Int(i), Some(FieldType::Boolean)) => Value::Bool(*i != 0),
            (Self::UInt(u), Some(FieldType::Boolean)) => Value::Bool(*u != 0),
            (Self::Bool(b), _) => Value::Bool(*b),
            (Self::Int(i), _) => Value::Number((*i).into()),
            (Self::UInt(u), _) => Value::Number((*u).into()),
            (Self::Float(f), _) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string())),
            (Self::Text(s), _) => Value::String(s.clone()),
            (Self::Bytes(b), _) => Value::String(match std::str::from_utf8(b) {
                Ok(s) => s.to_string(),
                Err(_) => base64::engine::general_purpose::STANDARD.encode(b),
            }),
            (Self::Date(d), Some(FieldType::Text)) => {
                Value::String(d.format("%Y-%m-%d").to_string())
            }
            (Self::DateTime(_), Some(FieldType::Text)) => Value::String(self.to_cursor_string()),
            (Self::Date(d), _) => d
                .and_hms_opt(0, 0, 0)
                .map(|dt| Value::Number(dt.and_utc().timestamp_millis().into()))
                .unwrap_or(Value::Null),
            (Self::DateTime(dt), _) => Value::Number(dt.and_utc().timestamp_millis().into()),
            (Self::Null, _) => Value::String(" ".to_string()),
        }
    }
}

/// One result row: column names with their values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    columns: Vec<(String, SourceValue)>,
}

impl SourceRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, column: impl Into<String>, value: SourceValue) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: SourceValue) {
        self.columns.push((column.into(), value));
    }

    /// Look up a column by name; exact match first, then ASCII case-insensitive.
    pub fn get(&self, column: &str) -> Option<&SourceValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(column))
            })
            .map(|(_, value)| value)
    }

    /// First column value, used for `COUNT(*)` results.
    pub fn first(&self) -> Option<&SourceValue> {
        self.columns.first().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SourceValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, SourceValue)> for SourceRow {
    fn from_iter<I: IntoIterator<Item = (S, SourceValue)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}
