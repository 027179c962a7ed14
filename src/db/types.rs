//! Row value normalization.
//!
//! Everything that leaves the database layer is a JSON value of one of a
//! small set of semantic types: text, number, boolean or null. JSON columns
//! pass through as JSON. Binary columns are treated as text.
//!
//! MySQL values are decoded by the column type the server reports. SQLite is
//! dynamically typed, so its values are decoded by the storage class of each
//! individual value.

use crate::db::Row;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo, ValueRef};
use tracing::warn;

/// How a MySQL column is decoded, derived from its reported type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Signed,
    Unsigned,
    Float,
    /// Exact numerics keep their textual form
    Decimal,
    Boolean,
    Json,
    /// Everything else: strings, temporal types, binary strings
    Text,
}

impl ColumnKind {
    /// Classify a MySQL type name such as `BIGINT UNSIGNED` or `VARBINARY`.
    pub fn for_mysql(type_name: &str) -> Self {
        let upper = type_name.to_ascii_uppercase();
        let unsigned = upper.ends_with(" UNSIGNED");
        let base = upper.trim_end_matches(" UNSIGNED");

        match base {
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
                if unsigned {
                    Self::Unsigned
                } else {
                    Self::Signed
                }
            }
            "BOOLEAN" | "BOOL" => Self::Boolean,
            "FLOAT" | "DOUBLE" | "REAL" => Self::Float,
            "DECIMAL" | "NUMERIC" => Self::Decimal,
            "JSON" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Raw DECIMAL text as sent by the server, without rounding.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        matches!(ty.name(), "DECIMAL" | "NUMERIC")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary data as text: valid UTF-8 is kept, anything else is base64.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

/// Trait for converting database rows to JSON maps in column order.
pub trait RowToJson {
    fn to_json_map(&self) -> Row;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> Row {
        self.columns()
            .iter()
            .map(|col| {
                let kind = ColumnKind::for_mysql(col.type_info().name());
                let value = mysql::decode(self, col.ordinal(), kind);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> Row {
        self.columns()
            .iter()
            .map(|col| {
                let declared_bool = col.type_info().name().eq_ignore_ascii_case("BOOLEAN");
                let value = sqlite::decode(self, col.ordinal(), declared_bool);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

mod mysql {
    use super::*;

    pub fn decode(row: &MySqlRow, idx: usize, kind: ColumnKind) -> JsonValue {
        let value = match kind {
            ColumnKind::Signed => row
                .try_get::<Option<i64>, _>(idx)
                .map(|v| v.map(JsonValue::from)),
            ColumnKind::Unsigned => row
                .try_get::<Option<u64>, _>(idx)
                .map(|v| v.map(JsonValue::from)),
            ColumnKind::Float => row
                .try_get::<Option<f64>, _>(idx)
                .or_else(|_| row.try_get::<Option<f32>, _>(idx).map(|v| v.map(f64::from)))
                .map(|v| v.map(float_value)),
            ColumnKind::Decimal => row
                .try_get::<Option<RawDecimal>, _>(idx)
                .map(|v| v.map(|d| JsonValue::String(d.0))),
            ColumnKind::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .map(|v| v.map(JsonValue::Bool)),
            ColumnKind::Json => row.try_get::<Option<JsonValue>, _>(idx),
            ColumnKind::Text => return decode_text(row, idx),
        };

        match value {
            Ok(v) => v.unwrap_or(JsonValue::Null),
            Err(e) => {
                warn!(column = idx, ?kind, error = %e, "Falling back to text decode");
                decode_text(row, idx)
            }
        }
    }

    /// `SHOW`/`DESCRIBE` output and BINARY columns arrive as byte strings,
    /// temporal types only decode through chrono.
    fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v
                .map(|b| decode_binary_value(&b))
                .unwrap_or(JsonValue::Null);
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        JsonValue::Null
    }
}

mod sqlite {
    use super::*;

    pub fn decode(row: &SqliteRow, idx: usize, declared_bool: bool) -> JsonValue {
        let storage_class = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(raw) => raw.type_info().name().to_string(),
            Err(e) => {
                warn!(column = idx, error = %e, "Unreadable SQLite value");
                return JsonValue::Null;
            }
        };

        match storage_class.as_str() {
            "INTEGER" if declared_bool => row
                .try_get::<bool, _>(idx)
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            "INTEGER" => row
                .try_get::<i64, _>(idx)
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            "REAL" => row
                .try_get::<f64, _>(idx)
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|b| decode_binary_value(&b))
                .unwrap_or(JsonValue::Null),
            _ => row
                .try_get::<String, _>(idx)
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        }
    }
}

/// NaN and infinities have no JSON number form.
fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    #[test]
    fn test_mysql_column_kinds() {
        assert_eq!(ColumnKind::for_mysql("INT"), ColumnKind::Signed);
        assert_eq!(ColumnKind::for_mysql("BIGINT UNSIGNED"), ColumnKind::Unsigned);
        assert_eq!(ColumnKind::for_mysql("boolean"), ColumnKind::Boolean);
        assert_eq!(ColumnKind::for_mysql("DOUBLE"), ColumnKind::Float);
        assert_eq!(ColumnKind::for_mysql("DECIMAL"), ColumnKind::Decimal);
        assert_eq!(ColumnKind::for_mysql("JSON"), ColumnKind::Json);
        assert_eq!(ColumnKind::for_mysql("VARCHAR"), ColumnKind::Text);
        assert_eq!(ColumnKind::for_mysql("VARBINARY"), ColumnKind::Text);
        assert_eq!(ColumnKind::for_mysql("DATETIME"), ColumnKind::Text);
    }

    #[test]
    fn test_decode_binary_value() {
        assert_eq!(decode_binary_value(b"hello world"), json!("hello world"));
        let bytes: &[u8] = &[0xFF, 0xFE, 0x00, 0x01];
        assert_eq!(decode_binary_value(bytes), json!("//4AAQ=="));
    }

    #[test]
    fn test_float_value_handles_nan() {
        assert_eq!(float_value(f64::NAN), json!("NaN"));
        assert_eq!(float_value(1.5), json!(1.5));
    }

    #[tokio::test]
    async fn test_sqlite_storage_classes() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let row: SqliteRow = sqlx::query(
            "SELECT 7 AS i, 2.5 AS r, 'txt' AS t, NULL AS n, \
             X'FFFE' AS b, CAST('abc' AS BLOB) AS u, COUNT(*) AS c",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        let map = row.to_json_map();
        let columns: Vec<_> = map.keys().cloned().collect();
        assert_eq!(columns, vec!["i", "r", "t", "n", "b", "u", "c"]);
        assert_eq!(map["i"], json!(7));
        assert_eq!(map["r"], json!(2.5));
        assert_eq!(map["t"], json!("txt"));
        assert!(map["n"].is_null());
        assert_eq!(map["b"], json!("//4="));
        assert_eq!(map["u"], json!("abc"));
        assert_eq!(map["c"], json!(1));
    }
}
