use thiserror::Error;

/// Error taxonomy for the federation core.
///
/// `Configuration` errors are caller mistakes and are surfaced verbatim.
/// `Connectivity` errors trigger pool invalidation for SQL sources so the
/// next attempt reconnects cleanly. Neither class is retried here.
#[derive(Debug, Error)]
pub enum FederationError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FederationError {
    /// Connectivity-class failures force a clean reconnect on next use.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, FederationError::Connectivity(_))
    }
}

impl From<anyhow::Error> for FederationError {
    fn from(err: anyhow::Error) -> Self {
        FederationError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FederationError::Configuration("virtual dataset has no SQL text".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: virtual dataset has no SQL text"
        );
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(FederationError::Connectivity("refused".into()).is_connectivity());
        assert!(!FederationError::Execution("syntax error".into()).is_connectivity());
    }
}
