use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// A registered data source. The connectivity parameters are decoded into
/// the per-kind variant once at the boundary and never passed around as
/// opaque JSON text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub name: Option<String>,
    pub config: ConnectionConfig,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(name: Option<String>, config: ConnectionConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            config,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        self.config.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Postgres,
    Mysql,
    Sqlite,
    HttpApi,
    Spreadsheet,
}

impl ConnectionKind {
    /// SQL kinds are pooled; API and spreadsheet sources are stateless per
    /// call and bypass the pool registry.
    pub fn is_sql(&self) -> bool {
        matches!(
            self,
            ConnectionKind::Postgres | ConnectionKind::Mysql | ConnectionKind::Sqlite
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Postgres => "postgres",
            ConnectionKind::Mysql => "mysql",
            ConnectionKind::Sqlite => "sqlite",
            ConnectionKind::HttpApi => "http_api",
            ConnectionKind::Spreadsheet => "spreadsheet",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connectivity parameters, tagged by source kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionConfig {
    Postgres(SqlConnectionConfig),
    Mysql(SqlConnectionConfig),
    Sqlite(SqliteConnectionConfig),
    HttpApi(ApiConnectionConfig),
    Spreadsheet(SpreadsheetConnectionConfig),
}

impl ConnectionConfig {
    pub fn kind(&self) -> ConnectionKind {
        match self {
            ConnectionConfig::Postgres(_) => ConnectionKind::Postgres,
            ConnectionConfig::Mysql(_) => ConnectionKind::Mysql,
            ConnectionConfig::Sqlite(_) => ConnectionKind::Sqlite,
            ConnectionConfig::HttpApi(_) => ConnectionKind::HttpApi,
            ConnectionConfig::Spreadsheet(_) => ConnectionKind::Spreadsheet,
        }
    }
}

/// Host/port/credential parameters for server-based SQL engines.
///
/// `Debug` masks the password so connection records can appear in log
/// context without leaking credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct SqlConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
}

impl fmt::Debug for SqlConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("ssl", &self.ssl)
            .finish()
    }
}

impl SqlConnectionConfig {
    /// Host and database only, safe for log lines.
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConnectionConfig {
    /// Filesystem path to the database file.
    pub path: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConnectionConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub auth: ApiAuth,
    /// Dot-path to the row array inside a JSON response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl fmt::Debug for ApiConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConnectionConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &format!("<{} headers>", self.headers.len()))
            .field("auth", &self.auth)
            .field("data_path", &self.data_path)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiAuth {
    #[default]
    None,
    ApiKeyHeader {
        #[serde(default = "default_api_key_header")]
        header: String,
        key: String,
    },
    ApiKeyQuery {
        #[serde(default = "default_api_key_param")]
        param: String,
        key: String,
    },
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_api_key_param() -> String {
    "api_key".to_string()
}

impl fmt::Debug for ApiAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApiAuth::None => "none",
            ApiAuth::ApiKeyHeader { .. } => "api_key_header",
            ApiAuth::ApiKeyQuery { .. } => "api_key_query",
            ApiAuth::Bearer { .. } => "bearer",
            ApiAuth::Basic { .. } => "basic",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SpreadsheetConnectionConfig {
    pub spreadsheet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    /// Numeric tab id used by the CSV export endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl fmt::Debug for SpreadsheetConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpreadsheetConnectionConfig")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sheet_name", &self.sheet_name)
            .field("gid", &self.gid)
            .field("range", &self.range)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_masks_password() {
        let config = SqlConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "analytics".to_string(),
            username: "reader".to_string(),
            password: "s3cret".to_string(),
            ssl: false,
        };
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_config_kind_tagging() {
        let json = r#"{"kind":"http_api","url":"https://api.example.com/orders"}"#;
        let config: ConnectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind(), ConnectionKind::HttpApi);
        assert!(!config.kind().is_sql());
    }

    #[test]
    fn test_auth_debug_hides_secrets() {
        let auth = ApiAuth::Bearer {
            token: "tok-123".to_string(),
        };
        assert_eq!(format!("{:?}", auth), "bearer");
    }
}
