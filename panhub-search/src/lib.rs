//! # panhub-search
//!
//! Concurrent cloud-drive resource search across pluggable sources.
//!
//! Sources (Telegram-style channels and scraper plugins) implement
//! [`SearchPlugin`] and are registered with a [`SearchService`]. A search
//! fans out to the selected sources under a shared concurrency limit,
//! isolates every failure, timeout and panic to the source that caused it,
//! and returns the raw results and/or their links grouped by storage type.
//!
//! ## Design
//!
//! - Explicitly constructed service, no process-global state
//! - Bounded in-memory result cache with TTL, LRU order and a memory budget
//! - Deterministic priority ordering for fan-out and link merging
//! - Optional per-source circuit breaker that parks persistently failing sources
//! - Cooperative cancellation via [`tokio_util::sync::CancellationToken`]
//!
//! ## Privacy
//!
//! Search keywords are logged only at trace level.
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> panhub_search::Result<()> {
//! use std::sync::Arc;
//! use panhub_search::{CacheConfig, SearchConfig, SearchRequest, SearchService, TelegramChannel};
//!
//! let config = SearchConfig::default();
//! let service = SearchService::new(config.clone(), CacheConfig::default())?;
//! service.register_plugin(Arc::new(TelegramChannel::new("tgsearchers3", &config)?));
//!
//! let response = service.search(&SearchRequest::new("rust book")).await?;
//! println!("{} results", response.total);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod channels;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod links;
pub mod merge;
pub mod observer;
pub mod orchestrator;
pub mod plugin;
pub mod registry;
pub mod types;

pub use cache::{BoundedCache, CacheStats};
pub use channels::TelegramChannel;
pub use circuit_breaker::{CircuitBreakerConfig, CircuitState};
pub use config::{CacheConfig, SearchConfig, PLUGIN_TIMEOUT_EXT_KEY};
pub use error::{Result, SearchError};
pub use merge::{filter_by_cloud_types, group_links_by_type, merge_merged_by_type};
pub use observer::{NoopObserver, PluginExecution, PluginOutcome, SearchObserver};
pub use orchestrator::SearchService;
pub use plugin::{PluginContext, SearchPlugin};
pub use registry::PluginRegistry;
pub use types::{
    CloudType, Ext, Link, MergedLinks, ResultShape, SearchRequest, SearchResponse, SearchResult,
    SourceKind, SourceSelector,
};
