// MySQL adapter on top of mysql_async's built-in pooling.
use mysql_async::prelude::*;
use mysql_async::{Column, Conn, Params, Pool, QueryResult as MysqlQueryResult, Row, Value as MySqlValue};
use serde_json::{json, Value};
use std::time::Instant;

use crate::error::FederationError;
use crate::models::{
    ColumnInfo, ConnectionKind, FieldSchema, ForeignKeyInfo, QueryResult, TableInfo, TableKind,
    TestOutcome,
};
use crate::services::database::DialectAdapter;
use crate::services::type_names::{self, RawTypeCode};

pub struct MysqlAdapter {
    pool: Pool,
}

impl MysqlAdapter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<Conn, FederationError> {
        self.pool.get_conn().await.map_err(|e| {
            FederationError::Connectivity(format!("failed to get mysql connection from pool: {}", e))
        })
    }

    fn map_query_error(e: mysql_async::Error) -> FederationError {
        match e {
            mysql_async::Error::Io(_) => {
                FederationError::Connectivity(format!("connection lost: {}", e))
            }
            other => FederationError::Execution(format!("query failed: {}", other)),
        }
    }

    fn field_schema(columns: &[Column]) -> Vec<FieldSchema> {
        columns
            .iter()
            .map(|col| {
                FieldSchema::new(
                    col.name_str().to_string(),
                    type_names::resolve(
                        ConnectionKind::Mysql,
                        RawTypeCode::Code(col.column_type() as u32),
                    ),
                )
            })
            .collect()
    }

    /// Read the result set's column metadata before draining the rows,
    /// so a zero-row result still carries its fields.
    async fn drain_result<P>(
        mut result: MysqlQueryResult<'_, '_, P>,
    ) -> Result<(Vec<FieldSchema>, Vec<Row>), FederationError>
    where
        P: Protocol,
    {
        let fields = result
            .columns()
            .map(|columns| Self::field_schema(&columns))
            .unwrap_or_default();
        let rows: Vec<Row> = result.collect().await.map_err(Self::map_query_error)?;
        Ok((fields, rows))
    }

    fn row_to_json(row: &Row) -> Value {
        let mut obj = serde_json::Map::new();
        for (idx, column) in row.columns_ref().iter().enumerate() {
            let value = match row.get_opt::<MySqlValue, usize>(idx) {
                Some(Ok(raw)) => Self::mysql_value_to_json(raw),
                _ => Value::Null,
            };
            obj.insert(column.name_str().to_string(), value);
        }
        Value::Object(obj)
    }

    fn mysql_value_to_json(raw: MySqlValue) -> Value {
        match raw {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(s) => json!(s),
                Err(_) => Value::Null,
            },
            MySqlValue::Int(i) => json!(i),
            MySqlValue::UInt(u) => json!(u),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => {
                json!(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    y, m, d, h, min, s
                ))
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }

    fn bind_params(params: &[Value]) -> Params {
        let values: Vec<MySqlValue> = params
            .iter()
            .map(|value| match value {
                Value::Null => MySqlValue::NULL,
                Value::Bool(b) => MySqlValue::Int(i64::from(*b)),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        MySqlValue::Int(i)
                    } else {
                        MySqlValue::Double(n.as_f64().unwrap_or(0.0))
                    }
                }
                Value::String(s) => MySqlValue::Bytes(s.clone().into_bytes()),
                other => MySqlValue::Bytes(other.to_string().into_bytes()),
            })
            .collect();
        Params::Positional(values)
    }
}

#[async_trait::async_trait]
impl DialectAdapter for MysqlAdapter {
    fn engine(&self) -> ConnectionKind {
        ConnectionKind::Mysql
    }

    async fn test_connection(&self) -> TestOutcome {
        let mut conn = match self.get_conn().await {
            Ok(conn) => conn,
            Err(e) => return TestOutcome::failed(e.to_string()),
        };

        match conn.query_drop("SELECT 1").await {
            Ok(()) => TestOutcome::ok("connection ok"),
            Err(e) => TestOutcome::failed(Self::map_query_error(e).to_string()),
        }
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, FederationError> {
        let mut conn = self.get_conn().await?;
        let start = Instant::now();

        let (fields, rows) = if params.is_empty() {
            let result = conn.query_iter(sql).await.map_err(Self::map_query_error)?;
            Self::drain_result(result).await?
        } else {
            let result = conn
                .exec_iter(sql, Self::bind_params(params))
                .await
                .map_err(Self::map_query_error)?;
            Self::drain_result(result).await?
        };

        let json_rows: Vec<Value> = rows.iter().map(Self::row_to_json).collect();

        Ok(QueryResult::new(
            json_rows,
            fields,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, FederationError> {
        let mut conn = self.get_conn().await?;
        let rows: Vec<(String, String, String)> = conn
            .query(
                r#"
                SELECT TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE
                FROM information_schema.TABLES
                WHERE TABLE_SCHEMA NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
                ORDER BY TABLE_SCHEMA, TABLE_NAME
                "#,
            )
            .await
            .map_err(Self::map_query_error)?;

        Ok(rows
            .into_iter()
            .map(|(schema, name, table_type)| TableInfo {
                schema: Some(schema),
                name,
                kind: if table_type == "VIEW" {
                    TableKind::View
                } else {
                    TableKind::Table
                },
            })
            .collect())
    }

    async fn get_columns(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>, FederationError> {
        let mut conn = self.get_conn().await?;
        let query = r#"
            SELECT
                c.COLUMN_NAME,
                c.DATA_TYPE,
                c.IS_NULLABLE,
                c.COLUMN_DEFAULT,
                c.CHARACTER_MAXIMUM_LENGTH,
                CASE WHEN c.COLUMN_KEY = 'PRI' THEN 1 ELSE 0 END AS is_primary_key
            FROM information_schema.COLUMNS c
            WHERE c.TABLE_SCHEMA = COALESCE(?, DATABASE()) AND c.TABLE_NAME = ?
            ORDER BY c.ORDINAL_POSITION
        "#;

        let rows: Vec<(String, String, String, Option<String>, Option<u64>, u8)> = conn
            .exec(query, (schema, table))
            .await
            .map_err(Self::map_query_error)?;

        Ok(rows
            .into_iter()
            .map(
                |(name, data_type, is_nullable, default_value, max_length, is_pk)| ColumnInfo {
                    name,
                    data_type: type_names::resolve(
                        ConnectionKind::Mysql,
                        RawTypeCode::Name(&data_type),
                    )
                    .to_string(),
                    is_nullable: is_nullable == "YES",
                    default_value,
                    max_length: max_length.map(|v| v as i64),
                    is_primary_key: is_pk == 1,
                },
            )
            .collect())
    }

    async fn get_foreign_keys(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>, FederationError> {
        let mut conn = self.get_conn().await?;
        let query = r#"
            SELECT COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
              AND TABLE_NAME = ?
              AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<(String, String, String)> = conn
            .exec(query, (schema, table))
            .await
            .map_err(Self::map_query_error)?;

        Ok(rows
            .into_iter()
            .map(|(column, referenced_table, referenced_column)| ForeignKeyInfo {
                column,
                referenced_table,
                referenced_column,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_value_to_json_scalars() {
        assert_eq!(MysqlAdapter::mysql_value_to_json(MySqlValue::NULL), Value::Null);
        assert_eq!(MysqlAdapter::mysql_value_to_json(MySqlValue::Int(-5)), json!(-5));
        assert_eq!(
            MysqlAdapter::mysql_value_to_json(MySqlValue::Bytes(b"abc".to_vec())),
            json!("abc")
        );
    }

    #[test]
    fn test_mysql_value_to_json_datetime() {
        let value = MysqlAdapter::mysql_value_to_json(MySqlValue::Date(2024, 3, 9, 12, 30, 5, 0));
        assert_eq!(value, json!("2024-03-09 12:30:05"));
    }

    #[test]
    fn test_bind_params_conversion() {
        let params = MysqlAdapter::bind_params(&[json!(null), json!(true), json!(7), json!("x")]);
        match params {
            Params::Positional(values) => {
                assert_eq!(values.len(), 4);
                assert_eq!(values[0], MySqlValue::NULL);
                assert_eq!(values[1], MySqlValue::Int(1));
            }
            _ => panic!("expected positional params"),
        }
    }
}
