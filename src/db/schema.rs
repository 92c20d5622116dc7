//! Column type inference for the schema-defining first write.
//!
//! The source supplies no schema; column names come from the CSV header and
//! types are voted on by a bounded sample of the first batch's values. The
//! type set mirrors what the original trip-record loads ended up with in
//! practice: integers are BIGINT, floats DOUBLE PRECISION, no width tiers.

use chrono::{NaiveDate, NaiveDateTime};

use crate::process::timestamps;
use crate::process::Batch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    BigInt,
    DoublePrecision,
    Date,
    Timestamp,
    Text,
}

impl SqlType {
    pub fn ddl_name(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::BigInt => "BIGINT",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Date => "DATE",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Text => "TEXT",
        }
    }

    /// Narrowest type accommodating both sides; incompatible mixes fall back
    /// to TEXT.
    pub fn common_type(self, other: SqlType) -> SqlType {
        use SqlType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (BigInt, DoublePrecision) | (DoublePrecision, BigInt) => DoublePrecision,
            (Date, Timestamp) | (Timestamp, Date) => Timestamp,
            _ => Text,
        }
    }

    /// Type of a single non-empty value, or `None` for an empty one.
    ///
    /// Literal `0`/`1` stay BIGINT rather than BOOLEAN: trip columns such as
    /// passenger counts are 0/1-heavy and integral.
    fn of_value(value: &str) -> Option<SqlType> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if ["true", "false", "t", "f"]
            .iter()
            .any(|b| value.eq_ignore_ascii_case(b))
        {
            return Some(SqlType::Boolean);
        }
        if value.parse::<i64>().is_ok() {
            return Some(SqlType::BigInt);
        }
        if value.parse::<f64>().is_ok() {
            return Some(SqlType::DoublePrecision);
        }
        if timestamps::parse_datetime(value).is_some() {
            return Some(SqlType::Timestamp);
        }
        if timestamps::parse_date(value).is_some() {
            return Some(SqlType::Date);
        }
        Some(SqlType::Text)
    }
}

/// Typed parse of a cell against its column type. Used by the loader to
/// bind native values; `None` means the value does not fit the type.
pub fn coerce_date(value: &str) -> Option<NaiveDate> {
    timestamps::parse_date(value.trim())
}

pub fn coerce_timestamp(value: &str) -> Option<NaiveDateTime> {
    timestamps::parse_mixed(value)
}

pub fn coerce_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("t") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("f") {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub sql_type: SqlType,
}

/// The column layout backing one target table, fixed by the first batch.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Infer a schema from the batch header and up to `sample_rows` rows.
    ///
    /// A column with no non-NULL sample value (including the zero-row case)
    /// is TEXT.
    pub fn infer(batch: &Batch, sample_rows: usize) -> TableSchema {
        let columns = batch
            .headers
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let mut inferred: Option<SqlType> = None;
                for row in batch.rows.iter().take(sample_rows) {
                    let value = match row.get(index) {
                        Some(Some(v)) => v,
                        _ => continue,
                    };
                    let value_type = match SqlType::of_value(value) {
                        Some(t) => t,
                        None => continue,
                    };
                    inferred = Some(match inferred {
                        None => value_type,
                        Some(current) => current.common_type(value_type),
                    });
                }
                ColumnSchema {
                    name: name.clone(),
                    sql_type: inferred.unwrap_or(SqlType::Text),
                }
            })
            .collect();
        TableSchema { columns }
    }

    /// CREATE TABLE statement with quoted identifiers. Columns are always
    /// nullable.
    pub fn create_table_ddl(&self, table: &str) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.sql_type.ddl_name()))
            .collect();
        format!("CREATE TABLE \"{}\" ({})", table, columns.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(headers: &[&str], rows: &[&[&str]]) -> Batch {
        Batch {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|v| {
                            if v.is_empty() {
                                None
                            } else {
                                Some(v.to_string())
                            }
                        })
                        .collect()
                })
                .collect(),
        }
    }

    #[test]
    fn value_types() {
        let cases = [
            ("42", Some(SqlType::BigInt)),
            ("0", Some(SqlType::BigInt)),
            ("1", Some(SqlType::BigInt)),
            ("-7", Some(SqlType::BigInt)),
            ("3.14", Some(SqlType::DoublePrecision)),
            ("true", Some(SqlType::Boolean)),
            ("F", Some(SqlType::Boolean)),
            ("2019-09-30", Some(SqlType::Date)),
            ("2019-09-30 08:15:00", Some(SqlType::Timestamp)),
            ("JFK Airport", Some(SqlType::Text)),
            ("", None),
        ];
        for (input, expected) in cases {
            assert_eq!(SqlType::of_value(input), expected, "input {:?}", input);
        }
    }

    #[test]
    fn promotion() {
        assert_eq!(
            SqlType::BigInt.common_type(SqlType::DoublePrecision),
            SqlType::DoublePrecision
        );
        assert_eq!(
            SqlType::Date.common_type(SqlType::Timestamp),
            SqlType::Timestamp
        );
        assert_eq!(SqlType::BigInt.common_type(SqlType::Text), SqlType::Text);
        assert_eq!(
            SqlType::Boolean.common_type(SqlType::BigInt),
            SqlType::Text
        );
    }

    #[test]
    fn infers_per_column_from_sample() {
        let b = batch(
            &["id", "fare", "zone", "pickup"],
            &[
                &["1", "12.5", "Astoria", "2019-01-01 00:10:00"],
                &["2", "8", "", "2019-01-01 00:20:00"],
            ],
        );
        let schema = TableSchema::infer(&b, 100);
        let types: Vec<SqlType> = schema.columns.iter().map(|c| c.sql_type).collect();
        assert_eq!(
            types,
            [
                SqlType::BigInt,
                SqlType::DoublePrecision,
                SqlType::Text,
                SqlType::Timestamp
            ]
        );
    }

    #[test]
    fn zero_rows_infer_text() {
        let b = batch(&["a", "b"], &[]);
        let schema = TableSchema::infer(&b, 100);
        assert!(schema
            .columns
            .iter()
            .all(|c| c.sql_type == SqlType::Text));
    }

    #[test]
    fn all_null_column_is_text() {
        let b = batch(&["a"], &[&[""], &[""]]);
        let schema = TableSchema::infer(&b, 100);
        assert_eq!(schema.columns[0].sql_type, SqlType::Text);
    }

    #[test]
    fn sample_bound_is_respected() {
        let mut rows: Vec<Vec<Option<String>>> = (0..10)
            .map(|i| vec![Some(i.to_string())])
            .collect();
        rows.push(vec![Some("surprise".to_string())]);
        let b = Batch {
            headers: vec!["n".to_string()],
            rows,
        };
        // The text row sits past the sample cutoff and does not widen the type.
        let schema = TableSchema::infer(&b, 10);
        assert_eq!(schema.columns[0].sql_type, SqlType::BigInt);
    }

    #[test]
    fn ddl_quotes_identifiers() {
        let b = batch(&["id", "note"], &[&["1", "hi"]]);
        let schema = TableSchema::infer(&b, 100);
        assert_eq!(
            schema.create_table_ddl("trips"),
            "CREATE TABLE \"trips\" (\"id\" BIGINT, \"note\" TEXT)"
        );
    }
}
