// Turns a dataset definition into a query result, whatever the source.
use std::sync::Arc;

use crate::error::FederationError;
use crate::models::{
    Connection, ConnectionConfig, ConnectionKind, Dataset, DatasetType, FilterContext,
    QueryResult, SourceType,
};
use crate::services::database::{self, quote_identifier};
use crate::services::external::{ApiSourceAdapter, SpreadsheetSourceAdapter};
use crate::services::pool_registry::PoolRegistry;
use crate::services::templating::FilterTemplateEngine;

/// Connection lookup is owned by the caller (persistence lives outside
/// this core); the resolver only consumes it.
#[async_trait::async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, FederationError>;
}

pub struct DatasetResolver {
    store: Arc<dyn ConnectionStore>,
    pools: Arc<PoolRegistry>,
    templates: FilterTemplateEngine,
    api: ApiSourceAdapter,
    spreadsheets: SpreadsheetSourceAdapter,
}

impl DatasetResolver {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        pools: Arc<PoolRegistry>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            store,
            pools,
            templates: FilterTemplateEngine::new(),
            api: ApiSourceAdapter::new(http_client.clone()),
            spreadsheets: SpreadsheetSourceAdapter::new(http_client),
        }
    }

    /// Resolve a dataset to rows. Filter context applies to templated SQL
    /// only; API and spreadsheet sources have no templating and ignore it.
    ///
    /// The caller may persist the returned `fields` as the dataset's
    /// cached `columns` (`Dataset::cache_columns`); this core never does.
    pub async fn resolve(
        &self,
        dataset: &Dataset,
        filters: Option<&FilterContext>,
    ) -> Result<QueryResult, FederationError> {
        let connection = self
            .store
            .get_connection(&dataset.connection_id)
            .await?
            .ok_or_else(|| {
                FederationError::Configuration(format!(
                    "connection '{}' not found for dataset '{}'",
                    dataset.connection_id, dataset.id
                ))
            })?;

        match dataset.source_type {
            SourceType::Sql => self.resolve_sql(dataset, &connection, filters).await,
            SourceType::Api => match &connection.config {
                ConnectionConfig::HttpApi(config) => self.api.fetch(config).await,
                _ => Err(kind_mismatch(dataset, &connection)),
            },
            SourceType::Spreadsheet => match &connection.config {
                ConnectionConfig::Spreadsheet(config) => self.spreadsheets.fetch(config).await,
                _ => Err(kind_mismatch(dataset, &connection)),
            },
        }
    }

    async fn resolve_sql(
        &self,
        dataset: &Dataset,
        connection: &Connection,
        filters: Option<&FilterContext>,
    ) -> Result<QueryResult, FederationError> {
        if !connection.kind().is_sql() {
            return Err(kind_mismatch(dataset, connection));
        }

        let sql = self.build_sql(dataset, connection.kind(), filters)?;

        let client = self.pools.acquire(connection).await?;
        let adapter = database::create_adapter(client);

        match adapter.execute(&sql, &[]).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_connectivity() => {
                // Evict the cached pool so the next attempt reconnects.
                tracing::warn!(
                    connection_id = %connection.id,
                    dataset_id = %dataset.id,
                    "connectivity failure, invalidating pooled client: {}",
                    e
                );
                self.pools.invalidate(&connection.id).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn build_sql(
        &self,
        dataset: &Dataset,
        engine: ConnectionKind,
        filters: Option<&FilterContext>,
    ) -> Result<String, FederationError> {
        match dataset.dataset_type {
            DatasetType::Physical => {
                let table = dataset.table_name.as_deref().ok_or_else(|| {
                    FederationError::Configuration(format!(
                        "physical dataset '{}' has no table name",
                        dataset.id
                    ))
                })?;
                Ok(build_select_all(engine, table, dataset.schema_name.as_deref()))
            }
            DatasetType::Virtual => {
                let sql = dataset.sql.as_deref().ok_or_else(|| {
                    FederationError::Configuration(format!(
                        "virtual dataset '{}' has no SQL text",
                        dataset.id
                    ))
                })?;

                if FilterTemplateEngine::has_template_variables(sql) {
                    let empty = FilterContext::new();
                    self.templates.render(sql, filters.unwrap_or(&empty))
                } else {
                    Ok(sql.to_string())
                }
            }
        }
    }
}

fn kind_mismatch(dataset: &Dataset, connection: &Connection) -> FederationError {
    FederationError::UnsupportedSource(format!(
        "dataset '{}' source type {:?} does not match connection kind '{}'",
        dataset.id,
        dataset.source_type,
        connection.kind()
    ))
}

/// `SELECT * FROM <quoted schema>.<quoted table>`, schema omitted when
/// absent.
pub fn build_select_all(engine: ConnectionKind, table: &str, schema: Option<&str>) -> String {
    match schema {
        Some(schema) => format!(
            "SELECT * FROM {}.{}",
            quote_identifier(engine, schema),
            quote_identifier(engine, table)
        ),
        None => format!("SELECT * FROM {}", quote_identifier(engine, table)),
    }
}
