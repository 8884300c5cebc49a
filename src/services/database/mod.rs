// Dialect abstraction for SQL engines.
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MysqlAdapter;
pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

use serde_json::Value;

use crate::error::FederationError;
use crate::models::{ColumnInfo, ConnectionKind, ForeignKeyInfo, QueryResult, TableInfo, TestOutcome};
use crate::services::pool_registry::PooledClient;

/// One implementation per SQL engine. Adapters borrow a pooled client for
/// the duration of one call and never cache it themselves.
///
/// `execute` accepts neutral `?` placeholders; translating them to the
/// engine's native syntax is the adapter's job, never the caller's.
/// Introspection never errors for an unknown table: it returns empty
/// collections instead.
#[async_trait::async_trait]
pub trait DialectAdapter: Send + Sync {
    fn engine(&self) -> ConnectionKind;

    /// Run a trivial probe query and report the outcome without erroring.
    async fn test_connection(&self) -> TestOutcome;

    /// Execute a parameterized statement and normalize the response.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, FederationError>;

    /// Tables and views, excluding system/catalog schemas.
    async fn list_tables(&self) -> Result<Vec<TableInfo>, FederationError>;

    /// Column schema for one table; empty for an unknown table. A failed
    /// primary-key lookup degrades to `is_primary_key: false`.
    async fn get_columns(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>, FederationError>;

    async fn get_foreign_keys(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>, FederationError>;
}

/// Statically registered adapter dispatch: the pooled client's engine
/// picks the implementation.
pub fn create_adapter(client: PooledClient) -> Box<dyn DialectAdapter> {
    match client {
        PooledClient::Postgres(pool) => Box::new(PostgresAdapter::new(pool)),
        PooledClient::Mysql(pool) => Box::new(MysqlAdapter::new(pool)),
        PooledClient::Sqlite(conn) => Box::new(SqliteAdapter::new(conn)),
    }
}

/// Engine-correct identifier quoting for generated SQL.
pub fn quote_identifier(engine: ConnectionKind, ident: &str) -> String {
    match engine {
        ConnectionKind::Mysql => format!("`{}`", ident.replace('`', "``")),
        _ => format!("\"{}\"", ident.replace('"', "\"\"")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_per_engine() {
        assert_eq!(quote_identifier(ConnectionKind::Postgres, "orders"), "\"orders\"");
        assert_eq!(quote_identifier(ConnectionKind::Sqlite, "orders"), "\"orders\"");
        assert_eq!(quote_identifier(ConnectionKind::Mysql, "orders"), "`orders`");
    }

    #[test]
    fn test_quote_identifier_escapes_embedded_quotes() {
        assert_eq!(
            quote_identifier(ConnectionKind::Postgres, "odd\"name"),
            "\"odd\"\"name\""
        );
        assert_eq!(quote_identifier(ConnectionKind::Mysql, "odd`name"), "`odd``name`");
    }
}
