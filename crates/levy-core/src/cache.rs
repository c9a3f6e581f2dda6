//! # Entity Cache
//!
//! A small keyed cache shared by the lookups of one engine instance.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EntityCache<K, V>                                                      │
//! │                                                                         │
//! │   get ──► RwLock::read ──► clone of V                                   │
//! │   insert ──► RwLock::write ──► evict oldest key if over capacity        │
//! │   invalidate / clear ──► RwLock::write                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two threads filling the same key from the same storage state race
//! harmlessly, the later write wins. A fill that may overtake an
//! invalidation needs a guard on top; `RateResolver` uses an epoch.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;

use parking_lot::RwLock;

struct Inner<K, V> {
    entries: HashMap<K, V>,
    /// Insertion order, used for eviction when bounded.
    order: VecDeque<K>,
}

/// Thread-safe map with optional FIFO bound.
pub struct EntityCache<K, V> {
    inner: RwLock<Inner<K, V>>,
    capacity: Option<usize>,
}

impl<K, V> EntityCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// An unbounded cache.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// A cache evicting its oldest entry beyond `capacity` entries.
    /// `None` or `Some(0)` means unbounded.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        EntityCache {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.filter(|c| *c > 0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().entries.get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.write();
        if inner.entries.insert(key.clone(), value).is_some() {
            return;
        }
        inner.order.push_back(key);

        if let Some(capacity) = self.capacity {
            while inner.entries.len() > capacity {
                match inner.order.pop_front() {
                    Some(oldest) => {
                        inner.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }

    pub fn invalidate(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write();
        let removed = inner.entries.remove(key);
        if removed.is_some() {
            inner.order.retain(|k| k != key);
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for EntityCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for EntityCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("len", &self.inner.read().entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
