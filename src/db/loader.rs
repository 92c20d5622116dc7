//! Chunk loading: first-batch table replacement, append-only inserts.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::database::HasArguments;
use sqlx::query::Query;
use sqlx::{Database, Encode, Type};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{MAX_BIND_PARAMS, SCHEMA_SAMPLE_ROWS};
use crate::db::schema::{self, SqlType, TableSchema};
use crate::db::Db;
use crate::process::Batch;

/// Writes the batches of one dataset into one table.
///
/// The first batch fixes the column layout and replaces any existing table
/// of that name (dropping its data); every batch, the first included,
/// appends. A batch that no longer coerces to the first batch's types is an
/// error; sub-batches committed before the failure stay committed, there is
/// no transaction around the dataset.
pub struct TableLoader {
    table: String,
    schema: Option<TableSchema>,
    chunks_written: u64,
    rows_written: u64,
}

impl TableLoader {
    pub fn new(table: impl Into<String>) -> Self {
        TableLoader {
            table: table.into(),
            schema: None,
            chunks_written: 0,
            rows_written: 0,
        }
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Load one batch, creating the table on the first call.
    ///
    /// Emits a per-chunk timing observation. Returns the number of rows
    /// appended.
    pub async fn load_chunk(&mut self, db: &Db, batch: &Batch) -> Result<u64> {
        let started_at = Utc::now();
        let start = Instant::now();

        if self.schema.is_none() {
            self.schema = Some(self.replace_table(db, batch).await?);
        }
        let table_schema = self
            .schema
            .as_ref()
            .context("table schema missing after first-chunk creation")?;

        let columns = table_schema.columns.len();
        if columns == 0 {
            bail!("table \"{}\" has no columns to load", self.table);
        }
        let rows_per_statement = (MAX_BIND_PARAMS / columns).max(1);
        for rows in batch.rows.chunks(rows_per_statement) {
            insert_rows(db, &self.table, table_schema, rows).await?;
        }

        self.chunks_written += 1;
        self.rows_written += batch.len() as u64;
        info!(
            table = %self.table,
            chunk = self.chunks_written,
            rows = batch.len(),
            started_at = %started_at.to_rfc3339(),
            finished_at = %Utc::now().to_rfc3339(),
            elapsed_s = %format!("{:.3}", start.elapsed().as_secs_f64()),
            "inserted chunk"
        );
        Ok(batch.len() as u64)
    }

    /// Schema-defining write: drop whatever table is in the way and create a
    /// fresh one from the batch's header and inferred types.
    async fn replace_table(&self, db: &Db, batch: &Batch) -> Result<TableSchema> {
        let table_schema = TableSchema::infer(batch, SCHEMA_SAMPLE_ROWS);
        db.execute(&format!("DROP TABLE IF EXISTS \"{}\"", self.table))
            .await
            .with_context(|| format!("dropping previous table \"{}\"", self.table))?;
        db.execute(&table_schema.create_table_ddl(&self.table))
            .await
            .with_context(|| format!("creating table \"{}\"", self.table))?;
        debug!(
            table = %self.table,
            columns = table_schema.columns.len(),
            "created table"
        );
        Ok(table_schema)
    }
}

async fn insert_rows(
    db: &Db,
    table: &str,
    table_schema: &TableSchema,
    rows: &[Vec<Option<String>>],
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = insert_sql(db, table, table_schema, rows.len());
    match db {
        Db::Postgres(pool) => {
            let mut query = sqlx::query(&sql);
            for row in rows {
                query = bind_row(query, table_schema, row)?;
            }
            query
                .execute(pool)
                .await
                .with_context(|| format!("inserting {} rows into \"{}\"", rows.len(), table))?;
        }
        #[cfg(test)]
        Db::Sqlite(pool) => {
            let mut query = sqlx::query(&sql);
            for row in rows {
                query = bind_row(query, table_schema, row)?;
            }
            query
                .execute(pool)
                .await
                .with_context(|| format!("inserting {} rows into \"{}\"", rows.len(), table))?;
        }
    }
    Ok(())
}

fn insert_sql(db: &Db, table: &str, table_schema: &TableSchema, row_count: usize) -> String {
    let column_list = table_schema
        .columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut groups = Vec::with_capacity(row_count);
    let mut index = 1;
    for _ in 0..row_count {
        let placeholders: Vec<String> = (0..table_schema.columns.len())
            .map(|_| {
                let placeholder = db.placeholder(index);
                index += 1;
                placeholder
            })
            .collect();
        groups.push(format!("({})", placeholders.join(", ")));
    }

    format!(
        "INSERT INTO \"{}\" ({}) VALUES {}",
        table,
        column_list,
        groups.join(", ")
    )
}

/// Bind one row's cells with native types matching the column layout.
fn bind_row<'q, DB>(
    mut query: Query<'q, DB, <DB as HasArguments<'q>>::Arguments>,
    table_schema: &TableSchema,
    row: &[Option<String>],
) -> Result<Query<'q, DB, <DB as HasArguments<'q>>::Arguments>>
where
    DB: Database,
    i64: Type<DB> + Encode<'q, DB>,
    f64: Type<DB> + Encode<'q, DB>,
    bool: Type<DB> + Encode<'q, DB>,
    String: Type<DB> + Encode<'q, DB>,
    NaiveDate: Type<DB> + Encode<'q, DB>,
    NaiveDateTime: Type<DB> + Encode<'q, DB>,
    Option<i64>: Type<DB> + Encode<'q, DB>,
    Option<f64>: Type<DB> + Encode<'q, DB>,
    Option<bool>: Type<DB> + Encode<'q, DB>,
    Option<String>: Type<DB> + Encode<'q, DB>,
    Option<NaiveDate>: Type<DB> + Encode<'q, DB>,
    Option<NaiveDateTime>: Type<DB> + Encode<'q, DB>,
{
    if row.len() != table_schema.columns.len() {
        bail!(
            "row has {} fields but the table has {} columns",
            row.len(),
            table_schema.columns.len()
        );
    }

    for (column, cell) in table_schema.columns.iter().zip(row) {
        query = match (column.sql_type, cell.as_deref()) {
            (SqlType::BigInt, None) => query.bind(None::<i64>),
            (SqlType::BigInt, Some(value)) => query.bind(
                value.trim().parse::<i64>().with_context(|| {
                    format!("value {:?} does not fit BIGINT column \"{}\"", value, column.name)
                })?,
            ),
            (SqlType::DoublePrecision, None) => query.bind(None::<f64>),
            (SqlType::DoublePrecision, Some(value)) => query.bind(
                value.trim().parse::<f64>().with_context(|| {
                    format!(
                        "value {:?} does not fit DOUBLE PRECISION column \"{}\"",
                        value, column.name
                    )
                })?,
            ),
            (SqlType::Boolean, None) => query.bind(None::<bool>),
            (SqlType::Boolean, Some(value)) => {
                query.bind(schema::coerce_bool(value).with_context(|| {
                    format!("value {:?} does not fit BOOLEAN column \"{}\"", value, column.name)
                })?)
            }
            (SqlType::Date, None) => query.bind(None::<NaiveDate>),
            (SqlType::Date, Some(value)) => {
                query.bind(schema::coerce_date(value).with_context(|| {
                    format!("value {:?} does not fit DATE column \"{}\"", value, column.name)
                })?)
            }
            (SqlType::Timestamp, None) => query.bind(None::<NaiveDateTime>),
            (SqlType::Timestamp, Some(value)) => {
                query.bind(schema::coerce_timestamp(value).with_context(|| {
                    format!(
                        "value {:?} does not fit TIMESTAMP column \"{}\"",
                        value, column.name
                    )
                })?)
            }
            (SqlType::Text, None) => query.bind(None::<String>),
            (SqlType::Text, Some(value)) => query.bind(value.to_string()),
        };
    }
    Ok(query)
}
