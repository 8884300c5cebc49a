pub mod database;
pub mod external;
pub mod fanout;
pub mod pool_registry;
pub mod resolver;
pub mod templating;
pub mod type_names;

pub use database::{create_adapter, DialectAdapter};
pub use external::{ApiSourceAdapter, SpreadsheetSourceAdapter};
pub use fanout::{FanoutAggregator, FanoutItem, FanoutOutcome};
pub use pool_registry::{PoolRegistry, PooledClient};
pub use resolver::{ConnectionStore, DatasetResolver};
pub use templating::{FilterTemplateEngine, TemplateValidation};
