//! Metrics Registry
//!
//! Name-keyed table of the live per-resource stores and the synchronizers
//! feeding them. The registry owns every synchronizer it holds and stops it
//! when the entry goes away.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::metrics::MetricsStore;
use crate::sync::SynchronizerHandle;

struct RegistryEntry {
    store: Arc<MetricsStore>,
    handle: SynchronizerHandle,
}

/// Registered stores keyed by series name.
#[derive(Default)]
pub struct MetricsRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` under `name`.
    ///
    /// If the name is already taken, the old entry is replaced and its
    /// synchronizer is stopped. The stopped handle is returned so the caller
    /// may wait for it to exit.
    pub fn register(
        &self,
        name: impl Into<String>,
        store: Arc<MetricsStore>,
        handle: SynchronizerHandle,
    ) -> Option<SynchronizerHandle> {
        let name = name.into();
        let previous = self
            .entries
            .write()
            .insert(name.clone(), RegistryEntry { store, handle });

        match previous {
            Some(old) => {
                info!(series = %name, "Replacing registered metric store");
                old.handle.stop();
                Some(old.handle)
            }
            None => {
                debug!(series = %name, "Registered metric store");
                None
            }
        }
    }

    /// Remove `name` and stop its synchronizer. Unknown names are a no-op.
    pub fn remove(&self, name: &str) -> Option<SynchronizerHandle> {
        let entry = self.entries.write().remove(name)?;
        entry.handle.stop();
        debug!(series = %name, "Removed metric store");
        Some(entry.handle)
    }

    /// Write every registered store, ordered by name.
    ///
    /// Stores are snapshotted first so no registry lock is held while
    /// writing to `w`.
    pub fn render_all(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for (_, store) in self.snapshot() {
            store.write_all(w)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<(String, Arc<MetricsStore>)> {
        let mut stores: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.store.clone()))
            .collect();
        stores.sort_by(|a, b| a.0.cmp(&b.0));
        stores
    }

    pub fn get(&self, name: &str) -> Option<Arc<MetricsStore>> {
        self.entries.read().get(name).map(|e| e.store.clone())
    }

    /// Series names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove every entry and stop its synchronizer.
    pub fn drain(&self) -> Vec<SynchronizerHandle> {
        self.entries
            .write()
            .drain()
            .map(|(_, entry)| {
                entry.handle.stop();
                entry.handle
            })
            .collect()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("series", &self.names())
            .finish()
    }
}
