//! Bounded LRU cache of pinned block handles.

use super::BlockHandle;

/// LRU cache over block handles, keyed by rowid.
///
/// The cache is exclusively a *reference holder*: each slot owns one strong
/// reference to its handle, and eviction merely drops that reference. A
/// block still pinned by a traversal survives its own eviction untouched.
///
/// Entries are kept in recency order (most recent first) in a plain vector;
/// lookups scan linearly. Capacities stay small (around 100–200 slots),
/// where a scan beats hashing.
pub struct BlockCache {
    entries: Vec<(u64, BlockHandle)>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl BlockCache {
    /// Creates a cache bounded to `capacity` handles.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up a handle; promotes it on hit.
    pub fn get(&mut self, rowid: u64) -> Option<BlockHandle> {
        match self.entries.iter().position(|(r, _)| *r == rowid) {
            Some(pos) => {
                self.hits += 1;
                let entry = self.entries.remove(pos);
                let handle = entry.1.clone();
                self.entries.insert(0, entry);
                Some(handle)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts a handle, evicting the least recently used entry if full.
    ///
    /// Re-inserting the handle already cached for `rowid` only refreshes
    /// recency; inserting a *different* handle for the same rowid replaces
    /// the old one (dropping the cache's reference to it).
    pub fn put(&mut self, rowid: u64, handle: &BlockHandle) {
        if self.capacity == 0 {
            return;
        }
        if let Some(pos) = self.entries.iter().position(|(r, _)| *r == rowid) {
            let (_, cached) = self.entries.remove(pos);
            let keep = if cached.same_block(handle) {
                cached
            } else {
                handle.clone()
            };
            self.entries.insert(0, (rowid, keep));
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop();
        }
        self.entries.insert(0, (rowid, handle.clone()));
    }

    /// Drops the cached handle for `rowid`, if any.
    ///
    /// Used when the node is deleted so later lookups cannot resurrect it.
    pub fn remove(&mut self, rowid: u64) {
        self.entries.retain(|(r, _)| *r != rowid);
    }

    /// Releases every held reference.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Shrinks or grows the bound, evicting LRU entries as needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.entries.len() > capacity {
            self.entries.pop();
        }
    }

    /// Number of cached handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup hits so far.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookup misses so far.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
