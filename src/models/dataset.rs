use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::result::FieldSchema;

/// Filter values supplied by the caller at fetch time, keyed by filter name.
/// Values are scalars or lists; never persisted by this core.
pub type FilterContext = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Sql,
    Api,
    Spreadsheet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    /// Reads an entire source table or view directly.
    Physical,
    /// Defined by arbitrary, possibly templated, query text.
    Virtual,
}

/// A logical dataset over exactly one connection.
///
/// Physical datasets carry a table reference; virtual datasets carry SQL
/// text that may use `{{ filters.* }}` template variables. The cached
/// `columns` list is cleared whenever either changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: Option<String>,
    pub connection_id: String,
    pub source_type: SourceType,
    pub dataset_type: DatasetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Cached column schema from the last successful resolve; computed by
    /// this core, persisted by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<FieldSchema>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    pub fn physical(
        connection_id: impl Into<String>,
        table_name: impl Into<String>,
        schema_name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: None,
            connection_id: connection_id.into(),
            source_type: SourceType::Sql,
            dataset_type: DatasetType::Physical,
            table_name: Some(table_name.into()),
            schema_name,
            sql: None,
            columns: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn virtual_sql(connection_id: impl Into<String>, sql: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: None,
            connection_id: connection_id.into(),
            source_type: SourceType::Sql,
            dataset_type: DatasetType::Virtual,
            table_name: None,
            schema_name: None,
            sql: Some(sql.into()),
            columns: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn external(connection_id: impl Into<String>, source_type: SourceType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: None,
            connection_id: connection_id.into(),
            source_type,
            dataset_type: DatasetType::Physical,
            table_name: None,
            schema_name: None,
            sql: None,
            columns: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Compatibility shim for legacy chart fields that reference a
    /// connection and SQL text directly, without a stored dataset.
    pub fn from_legacy(connection_id: impl Into<String>, sql: impl Into<String>) -> Self {
        let mut dataset = Self::virtual_sql(connection_id, sql);
        dataset.name = Some("legacy".to_string());
        dataset
    }

    /// Changing the table reference invalidates the cached columns.
    pub fn set_table(&mut self, table_name: impl Into<String>, schema_name: Option<String>) {
        self.table_name = Some(table_name.into());
        self.schema_name = schema_name;
        self.columns = None;
        self.updated_at = Utc::now();
    }

    /// Changing the SQL text invalidates the cached columns.
    pub fn set_sql(&mut self, sql: impl Into<String>) {
        self.sql = Some(sql.into());
        self.columns = None;
        self.updated_at = Utc::now();
    }

    /// Called by the owning service after a successful resolve to persist
    /// the freshly computed schema.
    pub fn cache_columns(&mut self, fields: Vec<FieldSchema>) {
        self.columns = Some(fields);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_sql_clears_cached_columns() {
        let mut dataset = Dataset::virtual_sql("conn-1", "SELECT * FROM orders");
        dataset.cache_columns(vec![FieldSchema::new("id", "int4")]);
        assert!(dataset.columns.is_some());

        dataset.set_sql("SELECT * FROM customers");
        assert!(dataset.columns.is_none());
    }

    #[test]
    fn test_set_table_clears_cached_columns() {
        let mut dataset = Dataset::physical("conn-1", "orders", Some("public".to_string()));
        dataset.cache_columns(vec![FieldSchema::new("id", "int4")]);

        dataset.set_table("customers", None);
        assert!(dataset.columns.is_none());
        assert!(dataset.schema_name.is_none());
    }

    #[test]
    fn test_legacy_shim_is_virtual() {
        let dataset = Dataset::from_legacy("conn-1", "SELECT 1");
        assert_eq!(dataset.source_type, SourceType::Sql);
        assert_eq!(dataset.dataset_type, DatasetType::Virtual);
        assert_eq!(dataset.sql.as_deref(), Some("SELECT 1"));
    }
}
