//! Search orchestrator: source selection, cache, bounded fan-out, assembly.
//!
//! A [`SearchService`] turns one [`SearchRequest`] into a [`SearchResponse`]:
//!
//! 1. Select the registered sources the request targets (priority order)
//! 2. Consult the result cache unless `force_refresh` is set
//! 3. Fan out in priority-ordered batches, with one shared limiter capping
//!    in-flight calls at the effective concurrency
//! 4. Race each call against the plugin timeout; failures, timeouts and
//!    panics contribute zero results
//! 5. Concatenate raw results and fold per-source link groupings in
//!    priority order
//! 6. Cache the unfiltered assembly, then shape and filter the response
//!
//! The cache key excludes the cloud-type filter, which is applied at read
//! time, so differently filtered requests share one entry. An assembly that
//! is missing a source because it timed out or was skipped is returned but
//! never cached.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::{BoundedCache, CacheStats};
use crate::circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::config::{CacheConfig, SearchConfig, PLUGIN_TIMEOUT_EXT_KEY};
use crate::error::{Result, SearchError};
use crate::merge::{filter_by_cloud_types, group_links_by_type, merge_merged_by_type};
use crate::observer::{NoopObserver, PluginExecution, PluginOutcome, SearchObserver};
use crate::plugin::{PluginContext, SearchPlugin};
use crate::registry::PluginRegistry;
use crate::types::{Ext, MergedLinks, SearchRequest, SearchResponse, SearchResult, SourceKind};

/// Unfiltered assembly stored in the result cache.
#[derive(Debug, Clone, Default, Serialize)]
struct CachedSearch {
    results: Vec<SearchResult>,
    merged: MergedLinks,
}

/// One selected source after its invocation finished.
struct SourceRun {
    plugin: Arc<dyn SearchPlugin>,
    results: Vec<SearchResult>,
    /// Timed out or skipped, so the results may be missing rather than empty.
    incomplete: bool,
}

/// Owns the registry, result cache and per-source health for searches.
///
/// Construct one per process (or per test) and share it behind an `Arc`.
/// Nothing here is global, so independent services never see each other's
/// cache entries or circuit state.
pub struct SearchService {
    registry: Arc<PluginRegistry>,
    cache: BoundedCache<CachedSearch>,
    config: SearchConfig,
    breaker: Mutex<CircuitBreaker>,
    observer: Arc<dyn SearchObserver>,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SearchService {
    /// Create a service with an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if either configuration is invalid.
    pub fn new(config: SearchConfig, cache_config: CacheConfig) -> Result<Self> {
        config.validate()?;
        cache_config.validate()?;
        Ok(Self {
            registry: Arc::new(PluginRegistry::new()),
            cache: BoundedCache::new(cache_config),
            config,
            breaker: Mutex::new(CircuitBreaker::default()),
            observer: Arc::new(NoopObserver),
        })
    }

    /// Use an existing registry instead of the empty default.
    pub fn with_registry(mut self, registry: Arc<PluginRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Configure the per-source circuit breaker.
    pub fn with_breaker(self, config: CircuitBreakerConfig) -> Self {
        *self.breaker() = CircuitBreaker::new(config);
        self
    }

    /// Send execution events to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn SearchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The source registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Register a source. Returns `false` if it was ignored.
    pub fn register_plugin(&self, plugin: Arc<dyn SearchPlugin>) -> bool {
        self.registry.register_plugin(plugin)
    }

    /// The search configuration in use.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Result cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached search.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Circuit state of every source with a recorded failure.
    pub fn health_report(&self) -> Vec<(String, CircuitState, u32)> {
        self.breaker().health_report()
    }

    /// Run a search.
    ///
    /// Individual source failures, timeouts and panics never fail the call;
    /// they only reduce `total`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidRequest`] for an empty keyword, or
    /// [`SearchError::Internal`] if orchestration itself breaks.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.search_with_cancel(request, CancellationToken::new()).await
    }

    /// Run a search that the caller can abandon through `cancel`.
    ///
    /// Once cancelled, in-flight source calls are dropped and contribute
    /// nothing, and the partial assembly is returned without being cached.
    ///
    /// # Errors
    ///
    /// Same as [`SearchService::search`].
    pub async fn search_with_cancel(
        &self,
        request: &SearchRequest,
        cancel: CancellationToken,
    ) -> Result<SearchResponse> {
        let keyword = request.keyword.trim();
        if keyword.is_empty() {
            return Err(SearchError::InvalidRequest("keyword must not be empty".into()));
        }

        let sources = self.select_sources(request);
        let key = cache_key(keyword, request, &sources);
        tracing::trace!(keyword, key = %key, "search requested");

        if self.config.cache_enabled && !request.force_refresh {
            let cached = self.cache.get(&key);
            self.observer.cache_lookup(&key, cached.is_some());
            if let Some(cached) = cached {
                tracing::debug!(total = cached.results.len(), "search served from cache");
                return Ok(shape(request, &cached));
            }
        }

        let context = PluginContext {
            cache_key: key.clone(),
            keyword: keyword.to_string(),
        };
        let concurrency = self.config.effective_concurrency(request.concurrency);
        let timeout = self.plugin_timeout(&request.ext);

        tracing::debug!(
            sources = sources.len(),
            concurrency,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "fan-out starting"
        );

        let runs = self
            .fan_out(&sources, &request.ext, &context, concurrency, timeout, &cancel)
            .await?;
        let incomplete = runs.iter().filter(|run| run.incomplete).count();
        let assembled = assemble(runs);

        if cancel.is_cancelled() {
            tracing::debug!(total = assembled.results.len(), "search cancelled, not caching");
        } else if incomplete > 0 {
            tracing::debug!(incomplete, "sources missing from assembly, not caching");
        } else if self.config.cache_enabled {
            self.cache.set(key, assembled.clone(), self.config.cache_ttl());
        }

        Ok(shape(request, &assembled))
    }

    /// Registered sources the request targets, in registry priority order.
    ///
    /// Plugin-kind sources are narrowed by `request.plugins` and channel-kind
    /// sources by `request.channels`; an empty list admits every source of
    /// that kind.
    fn select_sources(&self, request: &SearchRequest) -> Vec<Arc<dyn SearchPlugin>> {
        self.registry
            .plugins()
            .into_iter()
            .filter(|plugin| request.source_type.admits(plugin.kind()))
            .filter(|plugin| {
                let wanted = match plugin.kind() {
                    SourceKind::Plugin => &request.plugins,
                    SourceKind::Channel => &request.channels,
                };
                wanted.is_empty() || wanted.iter().any(|name| name.trim() == plugin.name())
            })
            .collect()
    }

    fn plugin_timeout(&self, ext: &Ext) -> Duration {
        timeout_override(ext).unwrap_or_else(|| self.config.plugin_timeout())
    }

    async fn fan_out(
        &self,
        sources: &[Arc<dyn SearchPlugin>],
        ext: &Ext,
        context: &PluginContext,
        concurrency: usize,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceRun>> {
        let limiter = Semaphore::new(concurrency);
        let mut runs = Vec::with_capacity(sources.len());

        for batch in sources.chunks(concurrency) {
            let batch_runs = futures::future::join_all(batch.iter().map(|plugin| {
                self.run_source(Arc::clone(plugin), ext, context, &limiter, timeout, cancel)
            }))
            .await;
            for run in batch_runs {
                runs.push(run?);
            }
        }

        Ok(runs)
    }

    async fn run_source(
        &self,
        plugin: Arc<dyn SearchPlugin>,
        ext: &Ext,
        context: &PluginContext,
        limiter: &Semaphore,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<SourceRun> {
        let started = Instant::now();
        let name = plugin.name().to_string();

        let admission = self.breaker().admit(&name);
        match admission {
            Admission::Skip => {
                tracing::debug!(plugin = %name, "source parked, skipping");
                self.report(&name, PluginOutcome::Skipped, started);
                return Ok(SourceRun {
                    plugin,
                    results: Vec::new(),
                    incomplete: true,
                });
            }
            Admission::Trial => tracing::debug!(plugin = %name, "trial call after cooldown"),
            Admission::Call => {}
        }
        // A deadline shortened by the caller says nothing about the source.
        let counts_against_source = timeout >= self.config.plugin_timeout();

        let invocation = async {
            let _permit = limiter
                .acquire()
                .await
                .map_err(|e| SearchError::Internal(format!("concurrency limiter closed: {e}")))?;
            let call = AssertUnwindSafe(plugin.search(&context.keyword, ext, context)).catch_unwind();
            Ok::<_, SearchError>(tokio::time::timeout(timeout, call).await)
        };

        let (outcome, results) = tokio::select! {
            biased;
            () = cancel.cancelled() => (PluginOutcome::Cancelled, Vec::new()),
            finished = invocation => match finished? {
                Err(_elapsed) => (PluginOutcome::Timeout, Vec::new()),
                Ok(Err(panic)) => (
                    PluginOutcome::Failure {
                        message: format!("panicked: {}", panic_message(panic.as_ref())),
                    },
                    Vec::new(),
                ),
                Ok(Ok(Err(err))) => (
                    PluginOutcome::Failure {
                        message: err.to_string(),
                    },
                    Vec::new(),
                ),
                Ok(Ok(Ok(results))) => {
                    let results = self.post_filter(plugin.as_ref(), &context.keyword, results);
                    (PluginOutcome::Success { count: results.len() }, results)
                }
            },
        };

        match &outcome {
            PluginOutcome::Success { count } => {
                tracing::debug!(plugin = %name, count, "source returned results");
                self.breaker().record_success(&name);
            }
            PluginOutcome::Failure { message } => {
                tracing::warn!(plugin = %name, error = %message, "source failed");
                self.breaker().record_failure(&name);
            }
            PluginOutcome::Timeout => {
                tracing::warn!(
                    plugin = %name,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "source timed out"
                );
                if counts_against_source {
                    self.breaker().record_failure(&name);
                } else {
                    self.breaker().release(&name);
                }
            }
            PluginOutcome::Cancelled => {
                tracing::debug!(plugin = %name, "source cancelled");
                self.breaker().release(&name);
            }
            PluginOutcome::Skipped => {}
        }
        let incomplete = matches!(outcome, PluginOutcome::Timeout);
        self.report(&name, outcome, started);

        Ok(SourceRun {
            plugin,
            results,
            incomplete,
        })
    }

    fn post_filter(
        &self,
        plugin: &dyn SearchPlugin,
        keyword: &str,
        mut results: Vec<SearchResult>,
    ) -> Vec<SearchResult> {
        if !self.config.keyword_filter || plugin.skip_service_filter() {
            return results;
        }
        let terms: Vec<String> = keyword.split_whitespace().map(str::to_lowercase).collect();
        let before = results.len();
        results.retain(|result| matches_keyword(result, &terms));
        if results.len() < before {
            tracing::trace!(
                plugin = plugin.name(),
                dropped = before - results.len(),
                "keyword filter dropped results"
            );
        }
        results
    }

    fn report(&self, name: &str, outcome: PluginOutcome, started: Instant) {
        self.observer.plugin_completed(&PluginExecution {
            plugin: name.to_string(),
            outcome,
            duration: started.elapsed(),
        });
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Deterministic cache key for a request and its selected sources.
///
/// Made of the lowercased keyword, the source selector and the sorted names
/// of the selected sources. The cloud-type filter, response shape and
/// concurrency are not part of the key.
fn cache_key(keyword: &str, request: &SearchRequest, sources: &[Arc<dyn SearchPlugin>]) -> String {
    let mut channels: Vec<&str> = Vec::new();
    let mut plugins: Vec<&str> = Vec::new();
    for source in sources {
        match source.kind() {
            SourceKind::Channel => channels.push(source.name()),
            SourceKind::Plugin => plugins.push(source.name()),
        }
    }
    channels.sort_unstable();
    plugins.sort_unstable();

    format!(
        "search:{}:{}:ch={}:pl={}",
        keyword.to_lowercase(),
        request.source_type.as_str(),
        channels.join(","),
        plugins.join(",")
    )
}

/// Per-request plugin timeout carried in the extension bag, in milliseconds.
fn timeout_override(ext: &Ext) -> Option<Duration> {
    let value = ext.get(PLUGIN_TIMEOUT_EXT_KEY)?;
    let millis = value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))?;
    (millis > 0).then(|| Duration::from_millis(millis))
}

/// Concatenate raw results and fold link groupings in run order.
fn assemble(runs: Vec<SourceRun>) -> CachedSearch {
    let mut assembled = CachedSearch::default();
    for run in runs {
        if run.results.is_empty() {
            continue;
        }
        let source = format!("{}:{}", run.plugin.kind().prefix(), run.plugin.name());
        let grouped = group_links_by_type(&run.results, &source);
        assembled.merged = merge_merged_by_type(&assembled.merged, Some(&grouped));
        assembled.results.extend(run.results);
    }
    assembled
}

fn shape(request: &SearchRequest, assembled: &CachedSearch) -> SearchResponse {
    let shape = request.result_type;
    SearchResponse {
        total: assembled.results.len(),
        results: shape.includes_results().then(|| assembled.results.clone()),
        merged_by_type: shape
            .includes_merged()
            .then(|| filter_by_cloud_types(&assembled.merged, &request.cloud_types)),
    }
}

fn matches_keyword(result: &SearchResult, terms: &[String]) -> bool {
    let mut haystack = format!("{}\n{}", result.title, result.content).to_lowercase();
    for link in &result.links {
        haystack.push('\n');
        haystack.push_str(&link.title.to_lowercase());
    }
    terms.iter().all(|term| haystack.contains(term.as_str()))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CloudType, Link, ResultShape, SourceSelector};
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        kind: SourceKind,
        skip_filter: bool,
        results: Vec<SearchResult>,
    }

    #[async_trait]
    impl SearchPlugin for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u32 {
            1
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn skip_service_filter(&self) -> bool {
            self.skip_filter
        }

        async fn search(
            &self,
            _keyword: &str,
            _ext: &Ext,
            _context: &PluginContext,
        ) -> Result<Vec<SearchResult>> {
            Ok(self.results.clone())
        }
    }

    fn fixed(name: &'static str, kind: SourceKind) -> Arc<dyn SearchPlugin> {
        Arc::new(Fixed {
            name,
            kind,
            skip_filter: false,
            results: vec![],
        })
    }

    fn result(title: &str, content: &str) -> SearchResult {
        SearchResult {
            unique_id: title.into(),
            channel: "c".into(),
            datetime: String::new(),
            title: title.into(),
            content: content.into(),
            links: vec![Link::new(CloudType::Others, format!("https://example.com/{title}"))],
        }
    }

    fn service(config: SearchConfig) -> SearchService {
        SearchService::new(config, CacheConfig::default()).expect("valid config")
    }

    #[test]
    fn invalid_config_rejected() {
        let config = SearchConfig {
            default_concurrency: 0,
            ..Default::default()
        };
        assert!(SearchService::new(config, CacheConfig::default()).is_err());
    }

    #[test]
    fn cache_key_sorted_and_case_insensitive() {
        let a = vec![fixed("zeta", SourceKind::Plugin), fixed("alpha", SourceKind::Plugin)];
        let b = vec![fixed("alpha", SourceKind::Plugin), fixed("zeta", SourceKind::Plugin)];
        let request = SearchRequest::new("Movie");
        assert_eq!(
            cache_key("Movie", &request, &a),
            cache_key("movie", &request, &b)
        );
        assert_eq!(
            cache_key("movie", &request, &a),
            "search:movie:all:ch=:pl=alpha,zeta"
        );
    }

    #[test]
    fn cache_key_ignores_cloud_filter_and_shape() {
        let sources = vec![fixed("p", SourceKind::Plugin)];
        let plain = SearchRequest::new("x");
        let filtered = SearchRequest::new("x")
            .with_cloud_types(vec![CloudType::Baidu])
            .with_result_type(ResultShape::All);
        assert_eq!(
            cache_key("x", &plain, &sources),
            cache_key("x", &filtered, &sources)
        );
    }

    #[test]
    fn cache_key_separates_selectors_and_kinds() {
        let sources = vec![fixed("c1", SourceKind::Channel), fixed("p1", SourceKind::Plugin)];
        let all = SearchRequest::new("x");
        let tg = SearchRequest::new("x").with_source_type(SourceSelector::Tg);
        assert_ne!(cache_key("x", &all, &sources), cache_key("x", &tg, &sources));
        assert!(cache_key("x", &all, &sources).contains("ch=c1:pl=p1"));
    }

    #[test]
    fn timeout_override_parsing() {
        let mut ext = Ext::new();
        assert!(timeout_override(&ext).is_none());
        ext.insert(PLUGIN_TIMEOUT_EXT_KEY.into(), serde_json::json!(250));
        assert_eq!(timeout_override(&ext), Some(Duration::from_millis(250)));
        ext.insert(PLUGIN_TIMEOUT_EXT_KEY.into(), serde_json::json!("1500"));
        assert_eq!(timeout_override(&ext), Some(Duration::from_millis(1500)));
        ext.insert(PLUGIN_TIMEOUT_EXT_KEY.into(), serde_json::json!(0));
        assert!(timeout_override(&ext).is_none());
        ext.insert(PLUGIN_TIMEOUT_EXT_KEY.into(), serde_json::json!("soon"));
        assert!(timeout_override(&ext).is_none());
    }

    #[test]
    fn selection_respects_selector_and_names() {
        let svc = service(SearchConfig::default());
        svc.register_plugin(fixed("chan-a", SourceKind::Channel));
        svc.register_plugin(fixed("chan-b", SourceKind::Channel));
        svc.register_plugin(fixed("plug-a", SourceKind::Plugin));
        svc.register_plugin(fixed("plug-b", SourceKind::Plugin));

        let names = |request: &SearchRequest| -> Vec<String> {
            svc.select_sources(request)
                .iter()
                .map(|p| p.name().to_string())
                .collect()
        };

        assert_eq!(names(&SearchRequest::new("x")).len(), 4);
        assert_eq!(
            names(&SearchRequest::new("x").with_source_type(SourceSelector::Tg)),
            vec!["chan-a", "chan-b"]
        );
        assert_eq!(
            names(
                &SearchRequest::new("x")
                    .with_source_type(SourceSelector::Plugin)
                    .with_plugins(["plug-b", "missing"])
                    .with_channels(["chan-a"])
            ),
            vec!["plug-b"]
        );
        assert_eq!(
            names(&SearchRequest::new("x").with_channels(["chan-b"]).with_plugins(["plug-a"])),
            vec!["chan-b", "plug-a"]
        );
    }

    #[test]
    fn keyword_matching_requires_every_term() {
        let terms = vec!["rust".to_string(), "book".to_string()];
        assert!(matches_keyword(&result("The Rust Book", ""), &terms));
        assert!(matches_keyword(&result("Rust", "a BOOK about it"), &terms));
        assert!(!matches_keyword(&result("Rust", "nothing else"), &terms));

        let mut by_link = result("Rust", "");
        by_link.links[0].title = "book scans".into();
        assert!(matches_keyword(&by_link, &terms));
    }

    #[tokio::test]
    async fn post_filter_honours_opt_out() {
        let svc = service(SearchConfig {
            keyword_filter: true,
            ..Default::default()
        });
        svc.register_plugin(Arc::new(Fixed {
            name: "strict",
            kind: SourceKind::Plugin,
            skip_filter: false,
            results: vec![result("matching rust", ""), result("unrelated", "")],
        }));
        svc.register_plugin(Arc::new(Fixed {
            name: "loose",
            kind: SourceKind::Plugin,
            skip_filter: true,
            results: vec![result("also unrelated", "")],
        }));

        let response = svc
            .search(&SearchRequest::new("rust").with_result_type(ResultShape::Results))
            .await
            .expect("search");
        assert_eq!(response.total, 2);
        let titles: Vec<_> = response
            .results
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert!(titles.contains(&"matching rust".to_string()));
        assert!(titles.contains(&"also unrelated".to_string()));
    }

    #[tokio::test]
    async fn empty_keyword_rejected() {
        let svc = service(SearchConfig::default());
        let err = svc.search(&SearchRequest::new("   ")).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn no_sources_yields_empty_response() {
        let svc = service(SearchConfig::default());
        let response = svc.search(&SearchRequest::new("x")).await.expect("search");
        assert_eq!(response.total, 0);
        assert!(response.results.is_none());
        assert_eq!(response.merged_by_type, Some(MergedLinks::new()));
    }

    #[test]
    fn panic_messages_extracted() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("static");
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "static");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
