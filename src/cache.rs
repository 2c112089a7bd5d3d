use std::collections::HashMap;
use std::hash::Hash;

use crate::deferred::Deferred;

/// Outcome of registering a key with a [`KeyCache`].
pub(crate) enum Lookup<V> {
    /// The key already had a deferred, either still pending or completed.
    Hit(Deferred<Option<V>>),
    /// The key was added to the open batch window. `opened_window` is set when the window was
    /// empty before this key, which is when the owning loader must be queued on its scope.
    Miss { deferred: Deferred<Option<V>>, opened_window: bool },
}

/// Per-loader store mapping every key requested in a scope to its deferred value, plus the set of
/// keys in the open batch window that have not been handed to the batch function yet.
///
/// Entries are never evicted on their own; the cache lives exactly as long as its loader, which
/// lives as long as its scope.
pub(crate) struct KeyCache<K, V> {
    entries: HashMap<K, Deferred<Option<V>>>,
    window: Vec<K>,
}

impl<K, V> KeyCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self { entries: HashMap::new(), window: Vec::new() }
    }

    /// Returns the deferred for `key`, registering it in the open window if it is new.
    pub fn lookup_or_register(&mut self, key: K) -> Lookup<V> {
        if let Some(deferred) = self.entries.get(&key) {
            return Lookup::Hit(deferred.clone());
        }
        let deferred = Deferred::new();
        let opened_window = self.window.is_empty();
        self.entries.insert(key.clone(), deferred.clone());
        self.window.push(key);
        Lookup::Miss { deferred, opened_window }
    }

    /// Closes the open window and returns its keys with their deferreds. A fresh, empty window is
    /// open once this returns, so keys registered afterwards belong to the next batch.
    pub fn take_window(&mut self) -> Vec<(K, Deferred<Option<V>>)> {
        let keys = std::mem::take(&mut self.window);
        keys.into_iter()
            .filter_map(|key| self.entries.get(&key).cloned().map(|deferred| (key, deferred)))
            .collect()
    }

    /// Inserts an already resolved value unless the key is known. Returns whether it was inserted.
    pub fn prime(&mut self, key: K, value: V) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, Deferred::resolved(Some(value)));
        true
    }

    /// Forgets a completed entry so the key is fetched again on its next request. Keys still
    /// waiting on a batch are left alone. Returns whether an entry was removed.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.entries.get(key) {
            Some(deferred) if deferred.is_completed() => {
                self.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}
