//! Execution events emitted by the orchestrator.
//!
//! The orchestrator reports one [`PluginExecution`] per selected source and
//! one cache lookup per search. It never interprets these events; an
//! observer can turn them into metrics, logs or test assertions.

use std::time::Duration;

use serde::Serialize;

/// How a single source invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PluginOutcome {
    /// Returned normally with `count` results.
    Success { count: usize },
    /// Returned an error or panicked.
    Failure { message: String },
    /// Did not finish within the effective timeout.
    Timeout,
    /// Abandoned because the caller cancelled the search.
    Cancelled,
    /// Not invoked because its circuit is open.
    Skipped,
}

impl PluginOutcome {
    /// Number of results this outcome contributed.
    pub fn result_count(&self) -> usize {
        match self {
            Self::Success { count } => *count,
            _ => 0,
        }
    }

    /// Whether the source returned normally.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One finished source invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PluginExecution {
    /// Source name.
    pub plugin: String,
    /// How the invocation ended.
    #[serde(flatten)]
    pub outcome: PluginOutcome,
    /// Wall time from start to outcome, including time spent waiting for a
    /// concurrency slot.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

/// Receiver for orchestrator events.
///
/// All methods default to no-ops. Implementations must be cheap and
/// non-blocking; they are called inline on the search path.
pub trait SearchObserver: Send + Sync {
    /// A selected source finished (or was skipped).
    fn plugin_completed(&self, _execution: &PluginExecution) {}

    /// The result cache was consulted for `key`.
    fn cache_lookup(&self, _key: &str, _hit: bool) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SearchObserver for NoopObserver {}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}
