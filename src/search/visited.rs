//! O(1) visited tracking for graph traversals.

/// All-ones slot value meaning "empty".
const EMPTY: u64 = u64::MAX;

/// Open-addressed hash set of rowids.
///
/// Linear probing over a power-of-two table, FNV-1a hashing, and an
/// all-ones sentinel for empty slots. The table doubles whenever the load
/// factor would reach 0.5, so probes stay short for the lifetime of a
/// search. `u64::MAX` itself is a legal caller rowid and is tracked by a
/// side flag instead of occupying a slot.
pub struct VisitedSet {
    slots: Vec<u64>,
    len: usize,
    has_sentinel_key: bool,
}

impl VisitedSet {
    /// Creates a set sized for roughly `expected` insertions.
    #[must_use]
    pub fn with_capacity(expected: usize) -> Self {
        let slots = (expected.max(8) * 2).next_power_of_two();
        Self {
            slots: vec![EMPTY; slots],
            len: 0,
            has_sentinel_key: false,
        }
    }

    fn hash(rowid: u64) -> u64 {
        // FNV-1a over the eight little-endian bytes.
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in rowid.to_le_bytes() {
            h ^= u64::from(byte);
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
        h
    }

    fn slot_of(&self, rowid: u64) -> usize {
        let mask = self.slots.len() - 1;
        let mut i = (Self::hash(rowid) as usize) & mask;
        while self.slots[i] != EMPTY && self.slots[i] != rowid {
            i = (i + 1) & mask;
        }
        i
    }

    /// Marks `rowid` as visited. Idempotent: re-adding changes nothing.
    pub fn insert(&mut self, rowid: u64) {
        if rowid == EMPTY {
            if !self.has_sentinel_key {
                self.has_sentinel_key = true;
                self.len += 1;
            }
            return;
        }
        let i = self.slot_of(rowid);
        if self.slots[i] == rowid {
            return;
        }
        self.slots[i] = rowid;
        self.len += 1;
        // Keep the load factor strictly below 0.5.
        if self.len * 2 >= self.slots.len() {
            self.grow();
        }
    }

    /// True when `rowid` was inserted before.
    #[must_use]
    pub fn contains(&self, rowid: u64) -> bool {
        if rowid == EMPTY {
            return self.has_sentinel_key;
        }
        self.slots[self.slot_of(rowid)] == rowid
    }

    /// Number of distinct rowids inserted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing was inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Empties the set, keeping its allocation for reuse.
    pub fn clear(&mut self) {
        self.slots.fill(EMPTY);
        self.len = 0;
        self.has_sentinel_key = false;
    }

    fn grow(&mut self) {
        let new_len = self.slots.len() * 2;
        let old = std::mem::replace(&mut self.slots, vec![EMPTY; new_len]);
        for rowid in old {
            if rowid != EMPTY {
                let i = self.slot_of(rowid);
                self.slots[i] = rowid;
            }
        }
    }
}
