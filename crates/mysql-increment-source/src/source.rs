//! Relational row source.
//!
//! The extraction loop only issues `SELECT`, `SELECT COUNT(*)`, `DESC` and
//! `SHOW TABLES LIKE` statements, so the source interface is a single
//! "run this statement and hand back rows" call.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Pool, Row, Value};
use sync_core::{SourceRow, SourceValue};

/// MySQL collation id of the `binary` character set.
const BINARY_CHARSET: u16 = 63;

/// Trait for the relational side of a sync
///
/// Implementations must be safe to share between relation workers; the
/// MySQL implementation hands out pooled connections per call.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Execute a read-only statement and return all rows.
    async fn query(&self, sql: &str) -> Result<Vec<SourceRow>>;
}

/// `mysql_async` implementation of [`RowSource`]
#[derive(Clone)]
pub struct MySqlRowSource {
    pool: Pool,
}

impl MySqlRowSource {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Close every pooled connection.
    pub async fn disconnect(self) -> Result<()> {
        self.pool
            .disconnect()
            .await
            .context("Failed to disconnect MySQL pool")
    }
}

#[async_trait]
impl RowSource for MySqlRowSource {
    async fn query(&self, sql: &str) -> Result<Vec<SourceRow>> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .context("Failed to get MySQL connection")?;

        // Text protocol: statements carry inlined cursor literals, so
        // preparing each one would only churn the statement cache
        let rows: Vec<Row> = conn.query(sql).await?;

        Ok(rows.iter().map(convert_row).collect())
    }
}

fn convert_row(row: &Row) -> SourceRow {
    row.columns_ref()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = row.as_ref(i).cloned().unwrap_or(Value::NULL);
            let binary = column.character_set() == BINARY_CHARSET;
            (
                column.name_str().into_owned(),
                convert_value(value, column.column_type(), binary),
            )
        })
        .collect()
}

/// Convert one MySQL value using its column type.
///
/// The text protocol returns every non-null value as bytes, so numeric and
/// temporal columns are parsed back into typed values here. Anything that
/// does not parse is kept as text rather than dropped.
pub(crate) fn convert_value(value: Value, column_type: ColumnType, binary: bool) -> SourceValue {
    match value {
        Value::NULL => SourceValue::Null,
        Value::Int(i) => SourceValue::Int(i),
        Value::UInt(u) => SourceValue::UInt(u),
        Value::Float(f) => SourceValue::Float(f64::from(f)),
        Value::Double(d) => SourceValue::Float(d),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let formatted = format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
            );
            match NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day)) {
                Some(date) if column_type == ColumnType::MYSQL_TYPE_DATE => SourceValue::Date(date),
                Some(date) => date
                    .and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                    .map(SourceValue::DateTime)
                    .unwrap_or(SourceValue::Text(formatted)),
                // Zero dates ('0000-00-00') have no calendar representation
                None => SourceValue::Text(formatted),
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, _) => {
            let sign = if negative { "-" } else { "" };
            let hours = days * 24 + u32::from(hours);
            SourceValue::Text(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"))
        }
        Value::Bytes(bytes) => convert_bytes(bytes, column_type, binary),
    }
}

fn convert_bytes(bytes: Vec<u8>, column_type: ColumnType, binary: bool) -> SourceValue {
    use ColumnType::*;

    match column_type {
        MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG
        | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_YEAR => {
            let s = lossy(&bytes);
            if let Ok(i) = s.parse::<i64>() {
                SourceValue::Int(i)
            } else if let Ok(u) = s.parse::<u64>() {
                SourceValue::UInt(u)
            } else {
                SourceValue::Text(s)
            }
        }
        MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE => {
            let s = lossy(&bytes);
            s.parse::<f64>()
                .map(SourceValue::Float)
                .unwrap_or(SourceValue::Text(s))
        }
        MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE => {
            let s = lossy(&bytes);
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(SourceValue::Date)
                .unwrap_or(SourceValue::Text(s))
        }
        MYSQL_TYPE_DATETIME | MYSQL_TYPE_DATETIME2 | MYSQL_TYPE_TIMESTAMP
        | MYSQL_TYPE_TIMESTAMP2 => {
            let s = lossy(&bytes);
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                .map(SourceValue::DateTime)
                .unwrap_or(SourceValue::Text(s))
        }
        // Decimals keep their exact text; JSON is reported with the binary charset
        MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL | MYSQL_TYPE_JSON => {
            SourceValue::Text(lossy(&bytes))
        }
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_BLOB
        | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING | MYSQL_TYPE_VARCHAR | MYSQL_TYPE_BIT
        | MYSQL_TYPE_GEOMETRY
            if binary =>
        {
            SourceValue::Bytes(bytes)
        }
        _ => SourceValue::Text(lossy(&bytes)),
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    #[test]
    fn test_text_protocol_integers() {
        assert_eq!(
            convert_value(bytes("42"), ColumnType::MYSQL_TYPE_LONG, true),
            SourceValue::Int(42)
        );
        assert_eq!(
            convert_value(bytes("18446744073709551615"), ColumnType::MYSQL_TYPE_LONGLONG, true),
            SourceValue::UInt(u64::MAX)
        );
        assert_eq!(
            convert_value(bytes("1"), ColumnType::MYSQL_TYPE_TINY, true),
            SourceValue::Int(1)
        );
    }

    #[test]
    fn test_text_protocol_temporal() {
        assert_eq!(
            convert_value(
                bytes("2024-01-01 10:00:00"),
                ColumnType::MYSQL_TYPE_DATETIME,
                true
            )
            .to_cursor_string(),
            "2024-01-01 10:00:00"
        );
        assert_eq!(
            convert_value(
                bytes("2024-01-01 10:00:00.250"),
                ColumnType::MYSQL_TYPE_TIMESTAMP,
                true
            )
            .to_cursor_string(),
            "2024-01-01 10:00:00"
        );
        assert_eq!(
            convert_value(bytes("2024-01-01"), ColumnType::MYSQL_TYPE_DATE, true),
            SourceValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert_eq!(
            convert_value(bytes("0000-00-00 00:00:00"), ColumnType::MYSQL_TYPE_DATETIME, true),
            SourceValue::Text("0000-00-00 00:00:00".into())
        );
    }

    #[test]
    fn test_binary_protocol_values() {
        assert_eq!(
            convert_value(Value::Date(2024, 1, 1, 0, 0, 0, 0), ColumnType::MYSQL_TYPE_DATE, true),
            SourceValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert_eq!(
            convert_value(
                Value::Date(2024, 1, 1, 10, 0, 1, 0),
                ColumnType::MYSQL_TYPE_DATETIME,
                true
            )
            .to_cursor_string(),
            "2024-01-01 10:00:01"
        );
        assert_eq!(
            convert_value(Value::Time(false, 1, 2, 3, 4, 0), ColumnType::MYSQL_TYPE_TIME, true),
            SourceValue::Text("26:03:04".into())
        );
        assert_eq!(
            convert_value(Value::Double(1.5), ColumnType::MYSQL_TYPE_DOUBLE, true),
            SourceValue::Float(1.5)
        );
    }

    #[test]
    fn test_strings_and_blobs() {
        assert_eq!(
            convert_value(bytes("héllo"), ColumnType::MYSQL_TYPE_VAR_STRING, false),
            SourceValue::Text("héllo".into())
        );
        assert_eq!(
            convert_value(Value::Bytes(vec![0, 1, 2]), ColumnType::MYSQL_TYPE_BLOB, true),
            SourceValue::Bytes(vec![0, 1, 2])
        );
        assert_eq!(
            convert_value(bytes("12.50"), ColumnType::MYSQL_TYPE_NEWDECIMAL, true),
            SourceValue::Text("12.50".into())
        );
        assert_eq!(
            convert_value(bytes(r#"{"a":1}"#), ColumnType::MYSQL_TYPE_JSON, true),
            SourceValue::Text(r#"{"a":1}"#.into())
        );
        assert_eq!(
            convert_value(Value::NULL, ColumnType::MYSQL_TYPE_LONG, true),
            SourceValue::Null
        );
    }
}
