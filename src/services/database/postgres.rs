// PostgreSQL adapter backed by a deadpool connection pool.
use deadpool_postgres::Pool;
use serde_json::{json, Value};
use std::time::Instant;
use tokio_postgres::types::{ToSql, Type};

use crate::error::FederationError;
use crate::models::{
    ColumnInfo, ConnectionKind, FieldSchema, ForeignKeyInfo, QueryResult, TableInfo, TableKind,
    TestOutcome,
};
use crate::services::database::DialectAdapter;
use crate::services::type_names::{self, RawTypeCode};

pub struct PostgresAdapter {
    pool: Pool,
}

impl PostgresAdapter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, FederationError> {
        self.pool.get().await.map_err(|e| {
            FederationError::Connectivity(format!("failed to get connection from pool: {}", e))
        })
    }

    fn map_query_error(e: tokio_postgres::Error) -> FederationError {
        let details = if let Some(db_error) = e.as_db_error() {
            format!("{} ({})", db_error.message(), db_error.code().code())
        } else {
            e.to_string()
        };

        if e.is_closed() {
            FederationError::Connectivity(format!("connection lost: {}", details))
        } else {
            FederationError::Execution(format!("query failed: {}", details))
        }
    }

    fn field_schema(columns: &[tokio_postgres::Column]) -> Vec<FieldSchema> {
        columns
            .iter()
            .map(|col| {
                FieldSchema::new(
                    col.name(),
                    type_names::resolve(
                        ConnectionKind::Postgres,
                        RawTypeCode::Code(col.type_().oid()),
                    ),
                )
            })
            .collect()
    }

    fn row_to_json(row: &tokio_postgres::Row) -> Value {
        let mut obj = serde_json::Map::new();
        for (idx, column) in row.columns().iter().enumerate() {
            let value: Value = match *column.type_() {
                Type::BOOL => row
                    .try_get::<_, Option<bool>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::INT2 => row
                    .try_get::<_, Option<i16>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::INT4 => row
                    .try_get::<_, Option<i32>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::INT8 => row
                    .try_get::<_, Option<i64>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::FLOAT4 => row
                    .try_get::<_, Option<f32>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::FLOAT8 => row
                    .try_get::<_, Option<f64>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::DATE => row
                    .try_get::<_, Option<chrono::NaiveDate>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v.to_string()))
                    .unwrap_or(Value::Null),
                Type::TIME => row
                    .try_get::<_, Option<chrono::NaiveTime>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v.to_string()))
                    .unwrap_or(Value::Null),
                Type::TIMESTAMP => row
                    .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v.to_string()))
                    .unwrap_or(Value::Null),
                Type::TIMESTAMPTZ => row
                    .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v.to_rfc3339()))
                    .unwrap_or(Value::Null),
                _ => match row.try_get::<_, Option<String>>(idx) {
                    Ok(Some(v)) => json!(v),
                    Ok(None) => Value::Null,
                    // No textual representation available for this type.
                    Err(_) => json!(format!("<{}>", column.type_().name())),
                },
            };
            obj.insert(column.name().to_string(), value);
        }
        Value::Object(obj)
    }
}

/// Rewrite neutral `?` placeholders to PostgreSQL's `$1..$n`, leaving
/// quoted literals and quoted identifiers untouched.
pub(crate) fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0usize;
    let mut in_single = false;
    let mut in_double = false;

    for ch in sql.chars() {
        match ch {
            '\'' if !in_double => {
                in_single = !in_single;
                out.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                out.push(ch);
            }
            '?' if !in_single && !in_double => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            _ => out.push(ch),
        }
    }
    out
}

fn bind_params(params: &[Value]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|value| -> Box<dyn ToSql + Sync + Send> {
            match value {
                Value::Null => Box::new(Option::<String>::None),
                Value::Bool(b) => Box::new(*b),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Box::new(i)
                    } else {
                        Box::new(n.as_f64().unwrap_or(0.0))
                    }
                }
                Value::String(s) => Box::new(s.clone()),
                other => Box::new(other.to_string()),
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl DialectAdapter for PostgresAdapter {
    fn engine(&self) -> ConnectionKind {
        ConnectionKind::Postgres
    }

    async fn test_connection(&self) -> TestOutcome {
        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => return TestOutcome::failed(e.to_string()),
        };

        match client.query_one("SELECT 1", &[]).await {
            Ok(_) => TestOutcome::ok("connection ok"),
            Err(e) => TestOutcome::failed(Self::map_query_error(e).to_string()),
        }
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, FederationError> {
        let client = self.client().await?;
        let start = Instant::now();

        // Preparing first keeps column metadata for zero-row results.
        let (stmt, rows) = if params.is_empty() {
            let stmt = client.prepare(sql).await.map_err(Self::map_query_error)?;
            let rows = client
                .query(&stmt, &[])
                .await
                .map_err(Self::map_query_error)?;
            (stmt, rows)
        } else {
            let rewritten = rewrite_placeholders(sql);
            let stmt = client
                .prepare(&rewritten)
                .await
                .map_err(Self::map_query_error)?;
            let bound = bind_params(params);
            let refs: Vec<&(dyn ToSql + Sync)> =
                bound.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();
            let rows = client
                .query(&stmt, &refs)
                .await
                .map_err(Self::map_query_error)?;
            (stmt, rows)
        };

        let fields = Self::field_schema(stmt.columns());
        let json_rows: Vec<Value> = rows.iter().map(Self::row_to_json).collect();

        Ok(QueryResult::new(
            json_rows,
            fields,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, FederationError> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT table_schema, table_name, table_type
                FROM information_schema.tables
                WHERE table_schema NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
                ORDER BY table_schema, table_name
                "#,
                &[],
            )
            .await
            .map_err(Self::map_query_error)?;

        Ok(rows
            .iter()
            .map(|row| {
                let table_type: String = row.get(2);
                TableInfo {
                    schema: Some(row.get(0)),
                    name: row.get(1),
                    kind: if table_type == "VIEW" {
                        TableKind::View
                    } else {
                        TableKind::Table
                    },
                }
            })
            .collect())
    }

    async fn get_columns(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>, FederationError> {
        let schema = schema.unwrap_or("public");
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT
                    c.column_name,
                    c.data_type,
                    c.is_nullable,
                    c.column_default,
                    c.character_maximum_length,
                    CASE WHEN pk.column_name IS NOT NULL THEN true ELSE false END AS is_primary_key
                FROM information_schema.columns c
                LEFT JOIN (
                    SELECT ku.column_name
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage ku
                        ON tc.constraint_name = ku.constraint_name
                        AND tc.table_schema = ku.table_schema
                    WHERE tc.constraint_type = 'PRIMARY KEY'
                        AND tc.table_schema = $1
                        AND tc.table_name = $2
                ) pk ON c.column_name = pk.column_name
                WHERE c.table_schema = $1 AND c.table_name = $2
                ORDER BY c.ordinal_position
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(Self::map_query_error)?;

        Ok(rows
            .iter()
            .map(|row| {
                let raw_type: String = row.get(1);
                ColumnInfo {
                    name: row.get(0),
                    data_type: type_names::resolve(
                        ConnectionKind::Postgres,
                        RawTypeCode::Name(&raw_type),
                    )
                    .to_string(),
                    is_nullable: row.get::<_, String>(2) == "YES",
                    default_value: row.get::<_, Option<String>>(3),
                    max_length: row.get::<_, Option<i32>>(4).map(i64::from),
                    // A failed key lookup degrades, it does not fail the
                    // whole listing.
                    is_primary_key: row.try_get(5).unwrap_or(false),
                }
            })
            .collect())
    }

    async fn get_foreign_keys(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>, FederationError> {
        let schema = schema.unwrap_or("public");
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT
                    kcu.column_name,
                    ccu.table_name AS referenced_table,
                    ccu.column_name AS referenced_column
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                JOIN information_schema.constraint_column_usage ccu
                    ON tc.constraint_name = ccu.constraint_name
                    AND tc.table_schema = ccu.table_schema
                WHERE tc.constraint_type = 'FOREIGN KEY'
                    AND tc.table_schema = $1
                    AND tc.table_name = $2
                ORDER BY kcu.ordinal_position
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(Self::map_query_error)?;

        Ok(rows
            .iter()
            .map(|row| ForeignKeyInfo {
                column: row.get(0),
                referenced_table: row.get(1),
                referenced_column: row.get(2),
            })
            .collect())
    }
}
