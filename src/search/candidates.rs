//! Bounded sorted candidate buffer.

/// One entry of the frontier.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Rowid of the candidate node.
    pub rowid: u64,
    /// Distance from the query to the candidate.
    pub distance: f32,
    /// Whether beam search has already expanded this candidate.
    pub expanded: bool,
    /// Snapshot of the candidate's vector, kept only when the caller needs
    /// the pool for pruning (insert path).
    pub vector: Option<Box<[f32]>>,
}

/// Fixed-capacity array of candidates, sorted ascending by
/// `(distance, rowid)`.
///
/// Insertion is a binary search plus a shifted write; when the buffer is
/// full the largest entry is evicted if the newcomer beats it. The rowid
/// tiebreak makes the order total and deterministic, which is what gives
/// search results their stable tie ordering.
pub struct CandidateList {
    entries: Vec<Candidate>,
    capacity: usize,
}

impl CandidateList {
    /// Creates an empty buffer bounded to `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// The bound this buffer was created with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of held candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no candidates are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the buffer, keeping its allocation and capacity.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Rebounds the buffer (used when a query overrides the search list
    /// size); excess tail entries are dropped.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.entries.truncate(capacity);
    }

    fn rank(distance: f32, rowid: u64) -> impl FnMut(&Candidate) -> std::cmp::Ordering {
        move |c: &Candidate| {
            c.distance
                .total_cmp(&distance)
                .then(c.rowid.cmp(&rowid))
        }
    }

    /// Offers a candidate; returns `true` if it entered the buffer.
    ///
    /// A full buffer rejects candidates that do not beat the current
    /// maximum. Duplicate rowids are the caller's concern (the visited set
    /// already guarantees each rowid is offered at most once per search).
    pub fn insert(&mut self, candidate: Candidate) -> bool {
        let pos = self
            .entries
            .binary_search_by(Self::rank(candidate.distance, candidate.rowid))
            .unwrap_or_else(|p| p);
        if self.entries.len() >= self.capacity {
            if pos >= self.capacity {
                return false;
            }
            self.entries.pop();
        }
        self.entries.insert(pos, candidate);
        true
    }

    /// Index of the nearest candidate not yet expanded.
    #[must_use]
    pub fn nearest_unexpanded(&self) -> Option<usize> {
        self.entries.iter().position(|c| !c.expanded)
    }

    /// Marks the candidate at `index` as expanded.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn mark_expanded(&mut self, index: usize) {
        self.entries[index].expanded = true;
    }

    /// Removes and returns the candidate at `index`.
    ///
    /// Used to drop zombie candidates whose block turned out to be gone.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> Candidate {
        self.entries.remove(index)
    }

    /// Borrow of the candidate at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> &Candidate {
        &self.entries[index]
    }

    /// Iterates candidates in ascending distance order.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.entries.iter()
    }

    /// Drains the buffer in ascending distance order.
    pub fn drain(&mut self) -> impl Iterator<Item = Candidate> + '_ {
        self.entries.drain(..)
    }
}
