// SQLite adapter. The connection lives behind an async mutex; statements
// on it are short and never held across an await point.
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::error::FederationError;
use crate::models::{
    ColumnInfo, ConnectionKind, FieldSchema, ForeignKeyInfo, QueryResult, TableInfo, TableKind,
    TestOutcome,
};
use crate::services::database::{quote_identifier, DialectAdapter};
use crate::services::type_names::{self, RawTypeCode};

pub struct SqliteAdapter {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAdapter {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn map_error(e: rusqlite::Error) -> FederationError {
        FederationError::Execution(format!("query failed: {}", e))
    }

    fn bind_params(params: &[Value]) -> Vec<rusqlite::types::Value> {
        params
            .iter()
            .map(|value| match value {
                Value::Null => rusqlite::types::Value::Null,
                Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        rusqlite::types::Value::Integer(i)
                    } else {
                        rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0))
                    }
                }
                Value::String(s) => rusqlite::types::Value::Text(s.clone()),
                other => rusqlite::types::Value::Text(other.to_string()),
            })
            .collect()
    }

    fn cell_to_json(cell: ValueRef<'_>) -> Value {
        match cell {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => json!(i),
            ValueRef::Real(f) => json!(f),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => json!(s),
                Err(_) => Value::Null,
            },
            // No canonical JSON representation for raw bytes.
            ValueRef::Blob(_) => json!("<bytea>"),
        }
    }

    /// SQLite reports no result-set types without a table reference, so
    /// field types come from the first row's storage classes.
    fn cell_type_name(cell: ValueRef<'_>) -> &'static str {
        match cell {
            ValueRef::Null => "unknown",
            ValueRef::Integer(_) => "int8",
            ValueRef::Real(_) => "float8",
            ValueRef::Text(_) => "text",
            ValueRef::Blob(_) => "bytea",
        }
    }
}

#[async_trait::async_trait]
impl DialectAdapter for SqliteAdapter {
    fn engine(&self) -> ConnectionKind {
        ConnectionKind::Sqlite
    }

    async fn test_connection(&self) -> TestOutcome {
        let conn = self.conn.lock().await;
        match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
            Ok(_) => TestOutcome::ok("connection ok"),
            Err(e) => TestOutcome::failed(format!("connection test failed: {}", e)),
        }
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, FederationError> {
        let conn = self.conn.lock().await;
        let start = Instant::now();

        let mut stmt = conn.prepare(sql).map_err(Self::map_error)?;
        let column_names: Vec<String> = (0..stmt.column_count())
            .map(|i| {
                stmt.column_name(i)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|_| format!("column_{}", i))
            })
            .collect();

        let bound = Self::bind_params(params);
        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound))
            .map_err(Self::map_error)?;

        // Statement metadata keeps the column list for zero-row results;
        // the first row's storage classes refine the types.
        let mut fields: Vec<FieldSchema> = column_names
            .iter()
            .map(|name| FieldSchema::new(name.clone(), "unknown"))
            .collect();
        let mut json_rows: Vec<Value> = Vec::new();

        while let Some(row) = rows.next().map_err(Self::map_error)? {
            let mut obj = serde_json::Map::new();
            for (idx, name) in column_names.iter().enumerate() {
                let cell = row.get_ref(idx).map_err(Self::map_error)?;
                if json_rows.is_empty() {
                    fields[idx].type_name = Self::cell_type_name(cell).to_string();
                }
                obj.insert(name.clone(), Self::cell_to_json(cell));
            }
            json_rows.push(Value::Object(obj));
        }

        Ok(QueryResult::new(
            json_rows,
            fields,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, FederationError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT name, type FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )
            .map_err(Self::map_error)?;

        let tables = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let kind: String = row.get(1)?;
                Ok(TableInfo {
                    schema: None,
                    name,
                    kind: if kind == "view" {
                        TableKind::View
                    } else {
                        TableKind::Table
                    },
                })
            })
            .map_err(Self::map_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(Self::map_error)?;

        Ok(tables)
    }

    async fn get_columns(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>, FederationError> {
        let conn = self.conn.lock().await;
        let pragma = format!(
            "PRAGMA table_info({})",
            quote_identifier(ConnectionKind::Sqlite, table)
        );
        let mut stmt = conn.prepare(&pragma).map_err(Self::map_error)?;

        // An unknown table yields zero pragma rows, not an error.
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let declared: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
                let not_null: i64 = row.get(3)?;
                let default_value: Option<String> = row.get(4)?;
                let is_pk: i64 = row.get::<_, i64>(5).unwrap_or(0);
                Ok(ColumnInfo {
                    name,
                    data_type: type_names::resolve(
                        ConnectionKind::Sqlite,
                        RawTypeCode::Name(&declared),
                    )
                    .to_string(),
                    is_nullable: not_null == 0,
                    default_value,
                    max_length: None,
                    is_primary_key: is_pk > 0,
                })
            })
            .map_err(Self::map_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(Self::map_error)?;

        Ok(columns)
    }

    async fn get_foreign_keys(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>, FederationError> {
        let conn = self.conn.lock().await;
        let pragma = format!(
            "PRAGMA foreign_key_list({})",
            quote_identifier(ConnectionKind::Sqlite, table)
        );
        let mut stmt = conn.prepare(&pragma).map_err(Self::map_error)?;

        let keys = stmt
            .query_map([], |row| {
                let column: String = row.get(3)?;
                // "to" is NULL when the reference targets the parent
                // table's primary key implicitly.
                let referenced_column: Option<String> = row.get(4)?;
                Ok(ForeignKeyInfo {
                    referenced_table: row.get(2)?,
                    referenced_column: referenced_column.unwrap_or_else(|| column.clone()),
                    column,
                })
            })
            .map_err(Self::map_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(Self::map_error)?;

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_adapter() -> SqliteAdapter {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE customers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );
            CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                status TEXT NOT NULL,
                total REAL NOT NULL DEFAULT 0
            );
            CREATE VIEW open_orders AS SELECT * FROM orders WHERE status = 'open';
            INSERT INTO customers (id, name) VALUES (1, 'Ada'), (2, 'Grace');
            INSERT INTO orders (id, customer_id, status, total) VALUES
                (1, 1, 'open', 10.5),
                (2, 1, 'shipped', 20.0),
                (3, 2, 'open', 7.25),
                (4, 2, 'shipped', 12.0),
                (5, 2, 'cancelled', 0);
            "#,
        )
        .unwrap();
        SqliteAdapter::new(Arc::new(Mutex::new(conn)))
    }

    #[tokio::test]
    async fn test_select_one() {
        let adapter = seeded_adapter();
        let result = adapter.execute("SELECT 1 AS one", &[]).await.unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.fields.len(), 1);
        assert_eq!(result.fields[0].name, "one");
        assert_eq!(result.fields[0].type_name, "int8");
    }

    #[tokio::test]
    async fn test_execute_returns_seeded_rows() {
        let adapter = seeded_adapter();
        let result = adapter
            .execute("SELECT * FROM \"orders\"", &[])
            .await
            .unwrap();
        assert_eq!(result.row_count, 5);
        assert_eq!(result.rows.len(), 5);
        assert_eq!(result.fields[0].name, "id");
        assert_eq!(result.rows[0]["status"], "open");
    }

    #[tokio::test]
    async fn test_zero_row_result_keeps_fields() {
        let adapter = seeded_adapter();
        let result = adapter
            .execute("SELECT * FROM orders WHERE 1 = 0", &[])
            .await
            .unwrap();
        assert_eq!(result.row_count, 0);
        assert_eq!(result.fields.len(), 4);
        assert_eq!(result.fields[0].name, "id");
        assert!(result.fields.iter().all(|f| f.type_name == "unknown"));
    }

    #[tokio::test]
    async fn test_execute_with_params() {
        let adapter = seeded_adapter();
        let result = adapter
            .execute(
                "SELECT id FROM orders WHERE status = ? ORDER BY id",
                &[json!("shipped")],
            )
            .await
            .unwrap();
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[0]["id"], 2);
    }

    #[tokio::test]
    async fn test_list_tables_includes_views() {
        let adapter = seeded_adapter();
        let tables = adapter.list_tables().await.unwrap();
        let names: Vec<(&str, TableKind)> = tables
            .iter()
            .map(|t| (t.name.as_str(), t.kind))
            .collect();
        assert!(names.contains(&("orders", TableKind::Table)));
        assert!(names.contains(&("open_orders", TableKind::View)));
    }

    #[tokio::test]
    async fn test_get_columns_resolves_types() {
        let adapter = seeded_adapter();
        let columns = adapter.get_columns("orders", None).await.unwrap();
        assert_eq!(columns.len(), 4);

        let id = &columns[0];
        assert_eq!(id.name, "id");
        assert_eq!(id.data_type, "int8");
        assert!(id.is_primary_key);

        let total = columns.iter().find(|c| c.name == "total").unwrap();
        assert_eq!(total.data_type, "float8");
        assert!(!total.is_primary_key);
    }

    #[tokio::test]
    async fn test_get_columns_unknown_table_is_empty() {
        let adapter = seeded_adapter();
        let columns = adapter.get_columns("missing", None).await.unwrap();
        assert!(columns.is_empty());
    }

    #[tokio::test]
    async fn test_get_foreign_keys() {
        let adapter = seeded_adapter();
        let keys = adapter.get_foreign_keys("orders", None).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].column, "customer_id");
        assert_eq!(keys[0].referenced_table, "customers");
        assert_eq!(keys[0].referenced_column, "id");
    }

    #[tokio::test]
    async fn test_test_connection() {
        let adapter = seeded_adapter();
        let outcome = adapter.test_connection().await;
        assert!(outcome.ok);
    }
}
