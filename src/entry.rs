//! In-memory entry table, maintained in LRU (access) order.
//!
//! Ordering is provided by `IndexMap`, which preserves insertion order and lets us move a
//! touched key to the back in `O(distance moved)` via `move_index` rather than needing a
//! hand-rolled intrusive linked list, the way the teacher's own LRU-adjacent structures avoid
//! reimplementing ordering primitives already covered by a crate in its dependency graph.

use indexmap::IndexMap;

/// One cache entry: the in-memory half of invariant 1-6 in the spec.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    /// Current byte lengths of the clean files, indexed by value slot.
    pub lengths: Vec<u64>,
    /// True once a commit has published clean files for this entry at least once.
    pub readable: bool,
    /// True while an `Editor` is attached; at most one editor per entry.
    pub editing: bool,
    /// Bumped on every successful commit; used to invalidate `Snapshot::edit()`.
    pub sequence_number: u64,
}

impl Entry {
    pub fn new(value_count: usize) -> Self {
        Entry {
            lengths: vec![0; value_count],
            readable: false,
            editing: false,
            sequence_number: 0,
        }
    }

    pub fn total_len(&self) -> u64 {
        self.lengths.iter().sum()
    }
}

/// The entry table, in access order (most recently used last).
#[derive(Debug, Default)]
pub(crate) struct EntryTable {
    entries: IndexMap<String, Entry>,
}

impl EntryTable {
    pub fn new() -> Self {
        EntryTable {
            entries: IndexMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts a brand-new entry at the most-recently-used end.
    pub fn insert_new(&mut self, key: String, entry: Entry) {
        self.entries.insert(key, entry);
    }

    /// Returns the entry for `key`, inserting one built from `make` at the most-recently-used
    /// end if it isn't already present.
    pub fn get_or_insert_with(
        &mut self,
        key: String,
        make: impl FnOnce() -> Entry,
    ) -> &mut Entry {
        self.entries.entry(key).or_insert_with(make)
    }

    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves `key` to the most-recently-used end, if present.
    pub fn touch(&mut self, key: &str) {
        if let Some(idx) = self.entries.get_index_of(key) {
            let last = self.entries.len() - 1;
            self.entries.move_index(idx, last);
        }
    }

    /// The least-recently-used key that doesn't have an in-flight editor, if any.
    pub fn eviction_candidate(&self) -> Option<String> {
        self.entries
            .iter()
            .find(|(_, entry)| !entry.editing)
            .map(|(key, _)| key.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_moves_to_back() {
        let mut table = EntryTable::new();
        for k in ["a", "b", "c"] {
            table.insert_new(k.to_string(), Entry::new(1));
        }
        table.touch("a");
        let order: Vec<_> = table.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn eviction_candidate_skips_editing_entries() {
        let mut table = EntryTable::new();
        let mut editing = Entry::new(1);
        editing.editing = true;
        table.insert_new("a".to_string(), editing);
        table.insert_new("b".to_string(), Entry::new(1));

        assert_eq!(table.eviction_candidate(), Some("b".to_string()));
    }

    #[test]
    fn eviction_candidate_none_when_all_editing() {
        let mut table = EntryTable::new();
        let mut editing = Entry::new(1);
        editing.editing = true;
        table.insert_new("a".to_string(), editing);

        assert_eq!(table.eviction_candidate(), None);
    }

    #[test]
    fn total_len_sums_lengths() {
        let mut entry = Entry::new(3);
        entry.lengths = vec![1, 2, 3];
        assert_eq!(entry.total_len(), 6);
    }
}
