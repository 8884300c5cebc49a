pub mod connection;
pub mod dataset;
pub mod metadata;
pub mod result;

pub use connection::{
    ApiAuth, ApiConnectionConfig, Connection, ConnectionConfig, ConnectionKind,
    SpreadsheetConnectionConfig, SqlConnectionConfig, SqliteConnectionConfig,
};
pub use dataset::{Dataset, DatasetType, FilterContext, SourceType};
pub use metadata::{ColumnInfo, ForeignKeyInfo, TableInfo, TableKind, TestOutcome};
pub use result::{FieldSchema, QueryResult};
