// Concurrent multi-dataset fetch for dashboard loads. One panel's
// failure degrades that panel only.
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use crate::error::FederationError;
use crate::models::{Dataset, FilterContext, QueryResult};
use crate::services::resolver::DatasetResolver;

/// One dashboard panel's fetch request. The key ties the outcome back to
/// a UI position regardless of completion order.
#[derive(Debug, Clone)]
pub struct FanoutItem {
    pub key: String,
    pub dataset: Dataset,
    pub filters: Option<FilterContext>,
}

/// Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct FanoutOutcome {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FanoutOutcome {
    fn success(key: String, result: QueryResult) -> Self {
        Self {
            key,
            result: Some(result),
            error: None,
        }
    }

    fn failure(key: String, error: &FederationError) -> Self {
        Self {
            key,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

pub struct FanoutAggregator {
    resolver: Arc<DatasetResolver>,
}

impl FanoutAggregator {
    pub fn new(resolver: Arc<DatasetResolver>) -> Self {
        Self { resolver }
    }

    /// Resolve every item concurrently. Outcomes come back in input
    /// order, each carrying either rows or that item's own error.
    pub async fn fetch_all(&self, items: Vec<FanoutItem>) -> Vec<FanoutOutcome> {
        let fetches = items.into_iter().map(|item| {
            let resolver = Arc::clone(&self.resolver);
            async move {
                match resolver.resolve(&item.dataset, item.filters.as_ref()).await {
                    Ok(result) => FanoutOutcome::success(item.key, result),
                    Err(e) => {
                        tracing::warn!(
                            key = %item.key,
                            dataset_id = %item.dataset.id,
                            "fanout item failed: {}",
                            e
                        );
                        FanoutOutcome::failure(item.key, &e)
                    }
                }
            }
        });

        join_all(fetches).await
    }
}
