use deadpool_postgres::{Config as PgPoolConfig, ManagerConfig, RecyclingMethod};
use mysql_async::{OptsBuilder, PoolConstraints, PoolOpts};
use rusqlite::Connection as SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_postgres::NoTls;

use crate::config::PoolSettings;
use crate::error::FederationError;
use crate::models::{Connection, ConnectionConfig, ConnectionKind, SqlConnectionConfig};

/// A reusable, engine-specific pool handle cached per connection identity.
/// Handles are cheap to clone; the registry remains the sole owner of the
/// underlying resources.
#[derive(Clone)]
pub enum PooledClient {
    Postgres(deadpool_postgres::Pool),
    Mysql(mysql_async::Pool),
    Sqlite(Arc<Mutex<SqliteConnection>>),
}

impl std::fmt::Debug for PooledClient {
    // Pool internals carry connection parameters and stay out of debug
    // output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PooledClient({})", self.engine())
    }
}

impl PooledClient {
    pub fn engine(&self) -> ConnectionKind {
        match self {
            PooledClient::Postgres(_) => ConnectionKind::Postgres,
            PooledClient::Mysql(_) => ConnectionKind::Mysql,
            PooledClient::Sqlite(_) => ConnectionKind::Sqlite,
        }
    }
}

/// Owns one pooled client per SQL connection identity.
///
/// Clients are created lazily on first use and evicted through
/// `invalidate`, which is called whenever a connection's parameters change,
/// the connection is deleted, or a query fails with a connectivity-class
/// error. API and spreadsheet connections are stateless per call and never
/// enter the registry.
pub struct PoolRegistry {
    pools: Arc<RwLock<HashMap<String, PooledClient>>>,
    settings: PoolSettings,
}

impl PoolRegistry {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            settings,
        }
    }

    /// Get or create the pooled client for a connection.
    /// Safe to call concurrently; concurrent first-use for the same
    /// connection id constructs exactly one pool.
    pub async fn acquire(&self, connection: &Connection) -> Result<PooledClient, FederationError> {
        if !connection.kind().is_sql() {
            return Err(FederationError::UnsupportedSource(format!(
                "connection kind '{}' is not pooled",
                connection.kind()
            )));
        }

        // Fast path: cached client under the read lock.
        {
            let pools = self.pools.read().await;
            if let Some(client) = pools.get(&connection.id) {
                tracing::debug!(connection_id = %connection.id, "using cached pooled client");
                return Ok(client.clone());
            }
        }

        // Slow path: create under the write lock.
        let mut pools = self.pools.write().await;

        // Double-check in case another task created the pool while we were
        // waiting on the write lock.
        if let Some(client) = pools.get(&connection.id) {
            tracing::debug!(connection_id = %connection.id, "pool created by another task");
            return Ok(client.clone());
        }

        let client = self.create_client(connection)?;
        pools.insert(connection.id.clone(), client.clone());

        tracing::info!(
            connection_id = %connection.id,
            kind = %connection.kind(),
            max_size = self.settings.max_size,
            "created pooled client"
        );

        Ok(client)
    }

    fn create_client(&self, connection: &Connection) -> Result<PooledClient, FederationError> {
        match &connection.config {
            ConnectionConfig::Postgres(cfg) => self.create_postgres_pool(cfg),
            ConnectionConfig::Mysql(cfg) => Ok(self.create_mysql_pool(cfg)),
            ConnectionConfig::Sqlite(cfg) => {
                let conn = SqliteConnection::open(&cfg.path).map_err(|e| {
                    FederationError::Connectivity(format!(
                        "failed to open sqlite database '{}': {}",
                        cfg.path, e
                    ))
                })?;
                Ok(PooledClient::Sqlite(Arc::new(Mutex::new(conn))))
            }
            _ => Err(FederationError::UnsupportedSource(format!(
                "connection kind '{}' is not pooled",
                connection.kind()
            ))),
        }
    }

    fn create_postgres_pool(
        &self,
        cfg: &SqlConnectionConfig,
    ) -> Result<PooledClient, FederationError> {
        let mut pool_cfg = PgPoolConfig::new();
        pool_cfg.host = Some(cfg.host.clone());
        pool_cfg.port = Some(cfg.port);
        pool_cfg.dbname = Some(cfg.database.clone());
        pool_cfg.user = Some(cfg.username.clone());
        pool_cfg.password = Some(cfg.password.clone());
        pool_cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        // deadpool has no idle reaper, so only waiting and creation are
        // bounded here; `idle_timeout_secs` applies to the mysql pool.
        let mut sizing = deadpool_postgres::PoolConfig::new(self.settings.max_size);
        sizing.timeouts.wait = Some(Duration::from_secs(self.settings.acquire_timeout_secs));
        sizing.timeouts.create = Some(Duration::from_secs(self.settings.acquire_timeout_secs));
        pool_cfg.pool = Some(sizing);

        let pool = pool_cfg
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
            .map_err(|e| {
                tracing::error!(target = %cfg.display_target(), "failed to create postgres pool: {}", e);
                FederationError::Connectivity(format!(
                    "failed to create connection pool for {}: {}",
                    cfg.display_target(),
                    e
                ))
            })?;

        Ok(PooledClient::Postgres(pool))
    }

    fn create_mysql_pool(&self, cfg: &SqlConnectionConfig) -> PooledClient {
        let constraints = PoolConstraints::new(0, self.settings.max_size).unwrap_or_default();
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_inactive_connection_ttl(Duration::from_secs(self.settings.idle_timeout_secs));

        let opts = OptsBuilder::default()
            .ip_or_hostname(cfg.host.clone())
            .tcp_port(cfg.port)
            .db_name(Some(cfg.database.clone()))
            .user(Some(cfg.username.clone()))
            .pass(Some(cfg.password.clone()))
            .pool_opts(pool_opts);

        PooledClient::Mysql(mysql_async::Pool::new(opts))
    }

    /// Close and evict the cached client for a connection id. Returns
    /// whether a client was evicted. Close failures are logged, never
    /// surfaced.
    pub async fn invalidate(&self, connection_id: &str) -> bool {
        let removed = {
            let mut pools = self.pools.write().await;
            pools.remove(connection_id)
        };

        match removed {
            Some(client) => {
                tracing::info!(connection_id = %connection_id, "evicted pooled client");
                match client {
                    PooledClient::Postgres(pool) => pool.close(),
                    PooledClient::Mysql(pool) => {
                        if let Err(e) = pool.disconnect().await {
                            tracing::warn!(
                                connection_id = %connection_id,
                                "failed to close mysql pool: {}",
                                e
                            );
                        }
                    }
                    // Dropping the last handle closes the file.
                    PooledClient::Sqlite(_) => {}
                }
                true
            }
            None => false,
        }
    }

    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SqliteConnectionConfig;

    fn settings() -> PoolSettings {
        PoolSettings {
            max_size: 4,
            acquire_timeout_secs: 1,
            idle_timeout_secs: 60,
        }
    }

    fn sqlite_connection(path: &str) -> Connection {
        Connection::new(
            Some("fixture".to_string()),
            ConnectionConfig::Sqlite(SqliteConnectionConfig {
                path: path.to_string(),
            }),
        )
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = PoolRegistry::new(settings());
        assert_eq!(tokio_test::block_on(registry.pool_count()), 0);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_creates_one_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        let connection = sqlite_connection(path.to_str().unwrap());

        let registry = PoolRegistry::new(settings());

        let (a, b) = tokio::join!(registry.acquire(&connection), registry.acquire(&connection));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(registry.pool_count().await, 1);
        match (a, b) {
            (PooledClient::Sqlite(left), PooledClient::Sqlite(right)) => {
                assert!(Arc::ptr_eq(&left, &right));
            }
            _ => panic!("expected sqlite clients"),
        }
    }

    #[tokio::test]
    async fn test_invalidate_evicts_client() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evict.db");
        let connection = sqlite_connection(path.to_str().unwrap());

        let registry = PoolRegistry::new(settings());

        registry.acquire(&connection).await.unwrap();
        assert_eq!(registry.pool_count().await, 1);

        assert!(registry.invalidate(&connection.id).await);
        assert_eq!(registry.pool_count().await, 0);
        // A second invalidate finds nothing.
        assert!(!registry.invalidate(&connection.id).await);
    }

    #[tokio::test]
    async fn test_pooled_client_debug_is_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.db");
        let connection = sqlite_connection(path.to_str().unwrap());

        let registry = PoolRegistry::new(settings());
        let client = registry.acquire(&connection).await.unwrap();
        assert_eq!(format!("{:?}", client), "PooledClient(sqlite)");
    }

    #[tokio::test]
    async fn test_non_sql_kinds_are_rejected() {
        let connection = Connection::new(
            None,
            ConnectionConfig::HttpApi(crate::models::ApiConnectionConfig {
                url: "https://api.example.com".to_string(),
                method: "GET".to_string(),
                headers: Default::default(),
                body: None,
                auth: Default::default(),
                data_path: None,
            }),
        );

        let registry = PoolRegistry::new(settings());
        let err = registry.acquire(&connection).await.unwrap_err();
        assert!(matches!(err, FederationError::UnsupportedSource(_)));
    }
}
