//! Error types for the panhub-search crate.
//!
//! Plugin failures and timeouts are absorbed by the orchestrator and never
//! reach the caller; only configuration, request and internal errors are
//! returned from [`crate::SearchService::search`].

/// Errors that can occur during search operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A source plugin failed to produce results.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// A source plugin did not respond in time.
    #[error("search timed out: {0}")]
    Timeout(String),

    /// An HTTP request to an upstream source failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to parse an upstream response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid search or cache configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The request reached the core in a state it cannot serve.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Orchestration itself broke; always surfaced to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for panhub-search results.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_plugin() {
        let err = SearchError::Plugin("upstream returned 502".into());
        assert_eq!(err.to_string(), "plugin error: upstream returned 502");
    }

    #[test]
    fn display_timeout() {
        let err = SearchError::Timeout("exceeded 50ms limit".into());
        assert_eq!(err.to_string(), "search timed out: exceeded 50ms limit");
    }

    #[test]
    fn display_http() {
        let err = SearchError::Http("connection refused".into());
        assert_eq!(err.to_string(), "HTTP error: connection refused");
    }

    #[test]
    fn display_parse() {
        let err = SearchError::Parse("unexpected HTML structure".into());
        assert_eq!(err.to_string(), "parse error: unexpected HTML structure");
    }

    #[test]
    fn display_config() {
        let err = SearchError::Config("max_items must be > 0".into());
        assert_eq!(err.to_string(), "config error: max_items must be > 0");
    }

    #[test]
    fn display_invalid_request() {
        let err = SearchError::InvalidRequest("keyword is empty".into());
        assert_eq!(err.to_string(), "invalid request: keyword is empty");
    }

    #[test]
    fn display_internal() {
        let err = SearchError::Internal("limiter closed".into());
        assert_eq!(err.to_string(), "internal error: limiter closed");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
    }
}
