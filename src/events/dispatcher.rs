//! Keyed listener registry
//!
//! A plain publish/subscribe table. It knows nothing about event names; the
//! caller picks the key.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Handle returned on registration, used to remove a single listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback invoked with the event argument
pub type Listener<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct Entry<A> {
    id: ListenerId,
    once: bool,
    listener: Listener<A>,
}

/// Listener table keyed by `K`, passing `&A` to callbacks
pub struct Dispatcher<K, A> {
    next_id: u64,
    listeners: HashMap<K, Vec<Entry<A>>>,
}

impl<K: Eq + Hash, A> Dispatcher<K, A> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            listeners: HashMap::new(),
        }
    }

    /// Register a listener called on every emission of `key`
    pub fn on(&mut self, key: K, listener: Listener<A>) -> ListenerId {
        self.insert(key, listener, false)
    }

    /// Register a listener removed after its first call
    pub fn once(&mut self, key: K, listener: Listener<A>) -> ListenerId {
        self.insert(key, listener, true)
    }

    /// Remove one listener; returns whether it was registered under `key`
    pub fn off(&mut self, key: &K, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(key);
        }
        removed
    }

    /// Remove every listener for `key`, returning how many were dropped
    pub fn remove_all(&mut self, key: &K) -> usize {
        self.listeners.remove(key).map_or(0, |entries| entries.len())
    }

    /// Number of listeners registered for `key`
    pub fn listener_count(&self, key: &K) -> usize {
        self.listeners.get(key).map_or(0, Vec::len)
    }

    /// Collect the listeners to call for one emission of `key`.
    ///
    /// Once-listeners are removed as part of the take, so calling the returned
    /// callbacks outside any lock still fires each of them at most once.
    pub fn take_for_emit(&mut self, key: &K) -> Vec<Listener<A>> {
        let Some(entries) = self.listeners.get_mut(key) else {
            return Vec::new();
        };
        let listeners = entries.iter().map(|e| e.listener.clone()).collect();
        entries.retain(|entry| !entry.once);
        if entries.is_empty() {
            self.listeners.remove(key);
        }
        listeners
    }

    /// Call every listener for `key` in registration order
    pub fn emit(&mut self, key: &K, arg: &A) -> usize {
        let listeners = self.take_for_emit(key);
        for listener in &listeners {
            listener(arg);
        }
        listeners.len()
    }

    fn insert(&mut self, key: K, listener: Listener<A>, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners
            .entry(key)
            .or_default()
            .push(Entry { id, once, listener });
        id
    }
}

impl<K: Eq + Hash, A> Default for Dispatcher<K, A> {
    fn default() -> Self {
        Self::new()
    }
}
