//! SQLite implementation of IRowStore
//!
//! Rows arrive as JSON column maps. SQL is built only from the column list
//! of the target [`Table`]; keys outside it are ignored, and a requested
//! column outside it is an error.
//!
//! ## Type Mapping
//!
//! | JSON value       | SQL type | Strategy                         |
//! |------------------|----------|----------------------------------|
//! | null             | NULL     | bound as `Option::<String>::None` |
//! | bool             | INTEGER  | 0 / 1                            |
//! | integer number   | INTEGER  | `i64`                            |
//! | other number     | REAL     | `f64`                            |
//! | string           | TEXT     | as-is                            |
//! | object / array   | TEXT     | serialized JSON                  |
//!
//! On the way back, `data` and `meta` columns are parsed as JSON.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};

use salesync_core::domain::{EntityKind, RowData, Table};
use salesync_core::ports::IRowStore;

use crate::StoreError;

/// Columns holding serialized JSON documents
const JSON_COLUMNS: &[&str] = &["data", "meta"];

/// Upper bound on bound parameters per `IN (...)` query
const SELECT_CHUNK: usize = 500;

/// Row store over the relational entity tables
#[derive(Clone)]
pub struct SqliteRowStore {
    pool: SqlitePool,
}

impl SqliteRowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of rows in `table`
    pub async fn count(&self, table: Table) -> anyhow::Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(table.as_str()));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

// ============================================================================
// SQL construction helpers
// ============================================================================

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn check_column(table: Table, column: &str) -> Result<(), StoreError> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(StoreError::UnknownColumn {
            table: table.as_str(),
            column: column.to_string(),
        })
    }
}

/// Known columns present in `row`, in schema order
fn present_columns(table: Table, row: &RowData) -> Vec<&'static str> {
    table
        .columns()
        .iter()
        .copied()
        .filter(|column| row.contains_key(*column))
        .collect()
}

fn insert_sql(table: Table, columns: &[&str]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(table.as_str()),
        names.join(", "),
        placeholders
    )
}

fn upsert_sql(table: Table, columns: &[&str], conflict_key: &str) -> String {
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != conflict_key)
        .map(|c| format!("{0} = excluded.{0}", quote(c)))
        .collect();
    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    format!(
        "{} ON CONFLICT({}) {}",
        insert_sql(table, columns),
        quote(conflict_key),
        action
    )
}

fn bind_json<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn row_to_json(row: &SqliteRow) -> Result<RowData, StoreError> {
    let mut data = Map::new();
    for column in row.columns() {
        let name = column.name();
        let raw = row
            .try_get_raw(column.ordinal())
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            let decode_err = |e: sqlx::Error| StoreError::SerializationError(format!("{name}: {e}"));
            match type_name.as_str() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(column.ordinal()).map_err(decode_err)?),
                "REAL" => Value::from(row.try_get::<f64, _>(column.ordinal()).map_err(decode_err)?),
                _ => {
                    let text: String = row.try_get(column.ordinal()).map_err(decode_err)?;
                    if JSON_COLUMNS.contains(&name) {
                        serde_json::from_str(&text).unwrap_or(Value::String(text))
                    } else {
                        Value::String(text)
                    }
                }
            }
        };
        data.insert(name.to_string(), value);
    }
    Ok(data)
}

// ============================================================================
// IRowStore implementation
// ============================================================================

#[async_trait]
impl IRowStore for SqliteRowStore {
    async fn upsert(
        &self,
        table: Table,
        rows: &[RowData],
        conflict_key: &str,
    ) -> anyhow::Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        check_column(table, conflict_key)?;

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;

        for row in rows {
            let columns = present_columns(table, row);
            if !columns.contains(&conflict_key) {
                return Err(StoreError::QueryFailed(format!(
                    "row for {table} has no value for conflict key '{conflict_key}'"
                ))
                .into());
            }

            let sql = upsert_sql(table, &columns, conflict_key);
            let mut query = sqlx::query(&sql);
            for column in &columns {
                query = bind_json(query, &row[*column]);
            }
            let result = query
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("upsert into {table}: {e}")))?;
            affected += result.rows_affected();
        }

        tx.commit().await?;
        tracing::debug!(table = %table, rows = rows.len(), affected, "Upserted rows");
        Ok(affected)
    }

    async fn insert(&self, table: Table, rows: &[RowData]) -> anyhow::Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;

        for row in rows {
            let columns = present_columns(table, row);
            let sql = insert_sql(table, &columns);
            let mut query = sqlx::query(&sql);
            for column in &columns {
                query = bind_json(query, &row[*column]);
            }
            let result = query
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("insert into {table}: {e}")))?;
            affected += result.rows_affected();
        }

        tx.commit().await?;
        Ok(affected)
    }

    async fn select_by(
        &self,
        table: Table,
        column: &str,
        values: &[String],
    ) -> anyhow::Result<Vec<RowData>> {
        check_column(table, column)?;
        let mut out = Vec::new();

        for chunk in values.chunks(SELECT_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT * FROM {} WHERE {} IN ({})",
                quote(table.as_str()),
                quote(column),
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for value in chunk {
                query = query.bind(value.as_str());
            }
            let rows = query
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("select from {table}: {e}")))?;
            for row in &rows {
                out.push(row_to_json(row)?);
            }
        }

        Ok(out)
    }

    async fn max_version(
        &self,
        entity: EntityKind,
        entity_id: &str,
    ) -> anyhow::Result<Option<i64>> {
        let row = sqlx::query(
            "SELECT MAX(version) AS version FROM entity_versions
             WHERE entity_type = ? AND entity_id = ?",
        )
        .bind(entity.as_str())
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("max version: {e}")))?;

        Ok(row.try_get::<Option<i64>, _>("version")?)
    }
}
