//! Query federation core for charts and dashboards.
//!
//! Resolves dataset definitions against heterogeneous sources (PostgreSQL,
//! MySQL, SQLite, HTTP APIs, spreadsheets) into one tabular result shape.
//! Connection pooling, SQL dialect differences, filter templating and
//! concurrent dashboard fan-out live here; persistence, routing and
//! process bootstrap belong to the embedding application.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::{init_tracing, Config};
pub use error::FederationError;
pub use models::{Connection, ConnectionConfig, Dataset, FilterContext, QueryResult};
pub use services::{DatasetResolver, FanoutAggregator, FilterTemplateEngine, PoolRegistry};
