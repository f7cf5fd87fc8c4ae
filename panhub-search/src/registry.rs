//! Registry of search sources with a deterministic priority order.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::plugin::SearchPlugin;

/// Holds the registered sources.
///
/// Names are unique: registering a second source with an existing name, an
/// empty name, or one with surrounding whitespace is ignored. The priority-sorted view is rebuilt on
/// every read; the sort is stable, so equal priorities keep registration
/// order and fan-out order stays deterministic.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<Vec<Arc<dyn SearchPlugin>>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source. Returns `false` if it was ignored.
    pub fn register_plugin(&self, plugin: Arc<dyn SearchPlugin>) -> bool {
        let name = plugin.name();
        if name.is_empty() {
            tracing::debug!("ignoring source with empty name");
            return false;
        }
        if name.trim() != name {
            tracing::debug!(plugin = name, "ignoring source with padded name");
            return false;
        }

        let mut plugins = self.write();
        if plugins.iter().any(|p| p.name() == name) {
            tracing::debug!(plugin = name, "source already registered, ignoring");
            return false;
        }
        tracing::debug!(plugin = name, priority = plugin.priority(), "registered source");
        plugins.push(plugin);
        true
    }

    /// Register every source in `plugins`, returning how many were accepted.
    pub fn register_plugins<I>(&self, plugins: I) -> usize
    where
        I: IntoIterator<Item = Arc<dyn SearchPlugin>>,
    {
        plugins
            .into_iter()
            .filter(|plugin| self.register_plugin(Arc::clone(plugin)))
            .count()
    }

    /// All sources, ascending by priority, ties in registration order.
    pub fn plugins(&self) -> Vec<Arc<dyn SearchPlugin>> {
        let mut sorted = self.read().clone();
        sorted.sort_by_key(|plugin| plugin.priority());
        sorted
    }

    /// The source registered under exactly `name`.
    pub fn plugin(&self, name: &str) -> Option<Arc<dyn SearchPlugin>> {
        self.read().iter().find(|p| p.name() == name).cloned()
    }

    /// Names in priority order.
    pub fn names(&self) -> Vec<String> {
        self.plugins().iter().map(|p| p.name().to_string()).collect()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no sources are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every source.
    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn SearchPlugin>>> {
        self.plugins.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn SearchPlugin>>> {
        self.plugins.write().unwrap_or_else(|e| e.into_inner())
    }
}
