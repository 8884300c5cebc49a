// Non-SQL sources: HTTP APIs and spreadsheets. Stateless per call, no
// pooling; they share one reqwest client.
pub mod http_api;
pub mod spreadsheet;
pub mod tabular;

pub use http_api::ApiSourceAdapter;
pub use spreadsheet::SpreadsheetSourceAdapter;

use std::time::Duration;

use crate::config::HttpSettings;
use crate::error::FederationError;

/// One client shared by both external adapters; reqwest clients are
/// internally pooled and cheap to clone.
pub fn build_http_client(settings: &HttpSettings) -> Result<reqwest::Client, FederationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()
        .map_err(|e| FederationError::Internal(format!("failed to build http client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let settings = HttpSettings {
            request_timeout_secs: 5,
        };
        assert!(build_http_client(&settings).is_ok());
    }
}
