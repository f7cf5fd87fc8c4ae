//! Trait definition for pluggable search sources.
//!
//! Every data source, whether a scraper plugin or a message channel,
//! implements [`SearchPlugin`] and is registered with the
//! [`crate::PluginRegistry`]. The orchestrator only ever talks to sources
//! through this trait.

use async_trait::async_trait;

use crate::error::SearchError;
use crate::types::{Ext, SearchResult, SourceKind};

/// Per-invocation context handed to a source.
///
/// Sources that keep their own nested caches derive their keys from the
/// orchestrator's cache key and the keyword being searched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginContext {
    /// Cache key of the search this invocation belongs to.
    pub cache_key: String,
    /// Keyword being searched.
    pub keyword: String,
}

/// A pluggable search source.
///
/// Implementors handle their own:
///
/// - request construction and keyword encoding
/// - HTTP transport and upstream error mapping
/// - parsing into [`SearchResult`] values with classified links
///
/// Errors are reported through `Result`; the orchestrator converts any
/// failure, timeout or panic into an empty contribution, so sources do not
/// need to swallow their own errors.
///
/// All implementations must be `Send + Sync` for concurrent fan-out.
#[async_trait]
pub trait SearchPlugin: Send + Sync {
    /// Stable unique name, used for selection and in link provenance.
    fn name(&self) -> &str;

    /// Ordering priority. Lower numbers run and merge first.
    fn priority(&self) -> u32;

    /// Whether this source is a channel or a plugin scraper.
    fn kind(&self) -> SourceKind {
        SourceKind::Plugin
    }

    /// Whether this source's results bypass the keyword post-filter.
    ///
    /// Sources that already filter upstream (or whose results legitimately
    /// omit the keyword) return `true`.
    fn skip_service_filter(&self) -> bool {
        false
    }

    /// Search for `keyword`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the upstream request fails or its response
    /// cannot be parsed.
    async fn search(
        &self,
        keyword: &str,
        ext: &Ext,
        context: &PluginContext,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CloudType, Link};

    /// A mock source for testing trait bounds and async execution.
    struct MockPlugin {
        results: Vec<SearchResult>,
    }

    #[async_trait]
    impl SearchPlugin for MockPlugin {
        fn name(&self) -> &str {
            "mock"
        }

        fn priority(&self) -> u32 {
            2
        }

        async fn search(
            &self,
            _keyword: &str,
            _ext: &Ext,
            context: &PluginContext,
        ) -> Result<Vec<SearchResult>, SearchError> {
            if self.results.is_empty() {
                return Err(SearchError::Plugin(format!(
                    "mock failure for {}",
                    context.keyword
                )));
            }
            Ok(self.results.clone())
        }
    }

    fn result() -> SearchResult {
        SearchResult {
            unique_id: "mock-1".into(),
            channel: "mock".into(),
            datetime: "2024-01-01T00:00:00Z".into(),
            title: "Test".into(),
            content: String::new(),
            links: vec![Link::new(CloudType::Baidu, "https://pan.baidu.com/s/1")],
        }
    }

    #[test]
    fn mock_plugin_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MockPlugin>();
    }

    #[test]
    fn trait_defaults() {
        let plugin = MockPlugin { results: vec![] };
        assert_eq!(plugin.kind(), SourceKind::Plugin);
        assert!(!plugin.skip_service_filter());
    }

    #[tokio::test]
    async fn mock_plugin_returns_results() {
        let plugin = MockPlugin {
            results: vec![result()],
        };
        let results = plugin
            .search("test", &Ext::new(), &PluginContext::default())
            .await
            .expect("should succeed");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Test");
    }

    #[tokio::test]
    async fn mock_plugin_sees_context() {
        let plugin = MockPlugin { results: vec![] };
        let context = PluginContext {
            cache_key: "k".into(),
            keyword: "needle".into(),
        };
        let err = plugin
            .search("needle", &Ext::new(), &context)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("needle"));
    }

    #[tokio::test]
    async fn usable_as_trait_object() {
        let plugin: std::sync::Arc<dyn SearchPlugin> = std::sync::Arc::new(MockPlugin {
            results: vec![result()],
        });
        assert_eq!(plugin.name(), "mock");
        assert_eq!(plugin.priority(), 2);
        let results = plugin
            .search("x", &Ext::new(), &PluginContext::default())
            .await
            .expect("should succeed");
        assert_eq!(results.len(), 1);
    }
}
