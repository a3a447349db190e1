//! Index maps: compact diffs of collection mutations.
//!
//! An [`IndexMap`] describes how the current slots of a collection relate to
//! the slots it had at some earlier reference point. Entry `i` holds the
//! original index of the item now in slot `i`, or [`CREATED`] if the slot
//! holds an item that did not exist at the reference point. Items that were
//! present at the reference point and are gone now are listed in
//! `deleted_indices` / `deleted_items`, in the order they were removed.
//!
//! # Invariants
//!
//! 1. `entries.len()` equals the collection's current length.
//! 2. Every non-negative entry is a distinct index into the reference state.
//! 3. Non-negative entries and `deleted_indices` together are a permutation
//!    of `0..reference_len`.
//! 4. A slot created and removed between two reference points leaves no
//!    trace: it is neither an entry nor a deletion.

use sinew_core::{Array, ArrayChange, KeyedChange, Value};

/// Sentinel entry for a slot that did not exist at the reference point.
pub const CREATED: isize = -2;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexMap {
    pub entries: Vec<isize>,
    pub deleted_indices: Vec<usize>,
    pub deleted_items: Vec<Value>,
}

impl IndexMap {
    /// The map of a collection of `len` items that has not changed.
    #[must_use]
    pub fn identity(len: usize) -> Self {
        Self {
            entries: (0..len as isize).collect(),
            deleted_indices: Vec::new(),
            deleted_items: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether this map differs from the identity map of its length.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.deleted_indices.is_empty()
            || self
                .entries
                .iter()
                .enumerate()
                .any(|(i, &entry)| entry != i as isize)
    }

    /// Reset to the identity map of `len` slots.
    pub fn reset(&mut self, len: usize) {
        self.entries.clear();
        self.entries.extend(0..len as isize);
        self.deleted_indices.clear();
        self.deleted_items.clear();
    }

    /// Compose two consecutive maps.
    ///
    /// `self` maps state 1 to state 0 and `next` maps state 2 to state 1; the
    /// result maps state 2 directly to state 0. Deletions of state-1 slots
    /// that were themselves created since state 0 vanish.
    #[must_use]
    pub fn compose(&self, next: &IndexMap) -> IndexMap {
        let entries = next
            .entries
            .iter()
            .map(|&entry| self.origin(entry))
            .collect();
        let mut deleted_indices = self.deleted_indices.clone();
        let mut deleted_items = self.deleted_items.clone();
        for (&index, item) in next.deleted_indices.iter().zip(&next.deleted_items) {
            let origin = self.origin(index as isize);
            if origin >= 0 {
                deleted_indices.push(origin as usize);
                deleted_items.push(item.clone());
            }
        }
        IndexMap {
            entries,
            deleted_indices,
            deleted_items,
        }
    }

    fn origin(&self, entry: isize) -> isize {
        if entry < 0 {
            CREATED
        } else {
            self.entries.get(entry as usize).copied().unwrap_or(CREATED)
        }
    }

    fn record_removal(&mut self, entry: isize, item: Value) {
        if entry >= 0 {
            self.deleted_indices.push(entry as usize);
            self.deleted_items.push(item);
        }
    }

    /// Fold one array mutation into this cumulative map.
    pub fn apply_array_change(&mut self, change: &ArrayChange) {
        match change {
            ArrayChange::Push { count } => {
                self.entries.extend(std::iter::repeat_n(CREATED, *count));
            }
            ArrayChange::Unshift { count } => {
                self.entries
                    .splice(0..0, std::iter::repeat_n(CREATED, *count));
            }
            ArrayChange::Pop { removed } => {
                if let Some(entry) = self.entries.pop() {
                    self.record_removal(entry, removed.clone());
                }
            }
            ArrayChange::Shift { removed } => {
                if !self.entries.is_empty() {
                    let entry = self.entries.remove(0);
                    self.record_removal(entry, removed.clone());
                }
            }
            ArrayChange::Splice {
                start,
                removed,
                inserted,
            } => {
                let start = (*start).min(self.entries.len());
                let end = (start + removed.len()).min(self.entries.len());
                let dropped: Vec<isize> = self
                    .entries
                    .splice(start..end, std::iter::repeat_n(CREATED, *inserted))
                    .collect();
                for (entry, item) in dropped.into_iter().zip(removed) {
                    self.record_removal(entry, item.clone());
                }
            }
            ArrayChange::Reverse => self.entries.reverse(),
            ArrayChange::Sort { permutation } => {
                let before = std::mem::take(&mut self.entries);
                self.entries = permutation
                    .iter()
                    .map(|&p| before.get(p).copied().unwrap_or(CREATED))
                    .collect();
            }
            ArrayChange::Replace { index, previous } => {
                if let Some(slot) = self.entries.get_mut(*index) {
                    let entry = std::mem::replace(slot, CREATED);
                    self.record_removal(entry, previous.clone());
                }
            }
        }
    }

    /// Fold one map or set mutation into this cumulative map.
    ///
    /// Deleted map entries are recorded as `[key, value]` pairs; deleted set
    /// members as the member itself.
    pub fn apply_keyed_change(&mut self, change: &KeyedChange, pairs: bool) {
        let item = |key: &Value, value: &Value| {
            if pairs {
                Value::Array(Array::from_values([key.clone(), value.clone()]))
            } else {
                key.clone()
            }
        };
        match change {
            KeyedChange::Added { .. } => self.entries.push(CREATED),
            KeyedChange::Replaced {
                index,
                key,
                previous,
            } => {
                if let Some(slot) = self.entries.get_mut(*index) {
                    let entry = std::mem::replace(slot, CREATED);
                    self.record_removal(entry, item(key, previous));
                }
            }
            KeyedChange::Deleted { index, key, value } => {
                if *index < self.entries.len() {
                    let entry = self.entries.remove(*index);
                    self.record_removal(entry, item(key, value));
                }
            }
            KeyedChange::Cleared { entries } => {
                let slots = std::mem::take(&mut self.entries);
                for (entry, (key, value)) in slots.into_iter().zip(entries) {
                    self.record_removal(entry, item(key, value));
                }
            }
        }
    }
}

/// Build an index map from raw parts.
#[must_use]
pub fn copy_index_map(
    entries: &[isize],
    deleted_indices: Option<&[usize]>,
    deleted_items: Option<&[Value]>,
) -> IndexMap {
    IndexMap {
        entries: entries.to_vec(),
        deleted_indices: deleted_indices.map(<[usize]>::to_vec).unwrap_or_default(),
        deleted_items: deleted_items.map(<[Value]>::to_vec).unwrap_or_default(),
    }
}

/// Normalize a map into offset form.
///
/// Deleted indices are sorted (their items move with them). Each surviving
/// entry is then shifted by the number of created slots before it minus the
/// number of deletions that precede its adjusted position, so that it reads
/// as a position rather than an original index.
#[must_use]
pub fn apply_mutations_to_indices(map: &IndexMap) -> IndexMap {
    let mut out = map.clone();
    let mut deleted: Vec<(usize, Value)> = out
        .deleted_indices
        .iter()
        .copied()
        .zip(out.deleted_items.iter().cloned())
        .collect();
    deleted.sort_by_key(|&(index, _)| index);
    out.deleted_indices = deleted.iter().map(|(index, _)| *index).collect();
    out.deleted_items = deleted.into_iter().map(|(_, item)| item).collect();

    let mut offset: isize = 0;
    let mut j = 0;
    for (i, entry) in out.entries.iter_mut().enumerate() {
        while j < out.deleted_indices.len() && out.deleted_indices[j] as isize <= i as isize - offset
        {
            j += 1;
            offset -= 1;
        }
        if *entry == CREATED {
            offset += 1;
        } else {
            *entry += offset;
        }
    }
    out
}

/// Rebuild `items` (a shadow of the collection at the map's reference
/// point) so that it lines up slot-for-slot with the current collection.
///
/// Surviving slots take the shadow item from their original index; created
/// slots are filled by `create(slot)`.
pub fn synchronize_indices<T: Clone>(
    items: &mut Vec<T>,
    map: &IndexMap,
    mut create: impl FnMut(usize) -> T,
) {
    let copy = std::mem::take(items);
    items.reserve(map.len());
    for (slot, &from) in map.entries.iter().enumerate() {
        let item = usize::try_from(from)
            .ok()
            .and_then(|from| copy.get(from).cloned());
        items.push(item.unwrap_or_else(|| create(slot)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(count: usize) -> ArrayChange {
        ArrayChange::Push { count }
    }

    #[test]
    fn push_twice_from_empty() {
        let mut map = IndexMap::identity(0);
        map.apply_array_change(&push(1));
        map.apply_array_change(&push(1));
        assert_eq!(map.entries, vec![CREATED, CREATED]);
        assert!(map.deleted_indices.is_empty());
        assert!(map.has_changes());
    }

    #[test]
    fn push_then_shift_records_original_item() {
        let mut map = IndexMap::identity(1);
        map.apply_array_change(&push(1));
        map.apply_array_change(&ArrayChange::Shift {
            removed: Value::from(1),
        });
        assert_eq!(map.entries, vec![CREATED]);
        assert_eq!(map.deleted_indices, vec![0]);
        assert_eq!(map.deleted_items, vec![Value::from(1)]);
    }

    #[test]
    fn push_then_pop_is_no_change() {
        let mut map = IndexMap::identity(2);
        map.apply_array_change(&push(1));
        map.apply_array_change(&ArrayChange::Pop {
            removed: Value::from(9),
        });
        assert!(!map.has_changes());
    }

    #[test]
    fn splice_records_removed_left_to_right() {
        let mut map = IndexMap::identity(4);
        map.apply_array_change(&ArrayChange::Splice {
            start: 1,
            removed: vec![Value::from("b"), Value::from("c")],
            inserted: 1,
        });
        assert_eq!(map.entries, vec![0, CREATED, 3]);
        assert_eq!(map.deleted_indices, vec![1, 2]);
        assert_eq!(map.deleted_items, vec![Value::from("b"), Value::from("c")]);
    }

    #[test]
    fn sort_permutes_entries() {
        let mut map = IndexMap::identity(3);
        map.apply_array_change(&ArrayChange::Reverse);
        map.apply_array_change(&ArrayChange::Sort {
            permutation: vec![1, 2, 0],
        });
        assert_eq!(map.entries, vec![1, 0, 2]);
    }

    #[test]
    fn replace_then_replace_records_once() {
        let mut map = IndexMap::identity(2);
        map.apply_array_change(&ArrayChange::Replace {
            index: 1,
            previous: Value::from("old"),
        });
        map.apply_array_change(&ArrayChange::Replace {
            index: 1,
            previous: Value::from("mid"),
        });
        assert_eq!(map.entries, vec![0, CREATED]);
        assert_eq!(map.deleted_items, vec![Value::from("old")]);
    }

    #[test]
    fn compose_follows_entries_through() {
        let first = copy_index_map(&[CREATED, 0, 1], None, None);
        let second = copy_index_map(&[2, 0], Some(&[1]), Some(&[Value::from("x")]));
        let composed = first.compose(&second);
        assert_eq!(composed.entries, vec![1, CREATED]);
        assert_eq!(composed.deleted_indices, vec![0]);
    }

    #[test]
    fn compose_drops_deletion_of_created_slot() {
        let first = copy_index_map(&[0, CREATED], None, None);
        let second = copy_index_map(&[0], Some(&[1]), Some(&[Value::from(5)]));
        let composed = first.compose(&second);
        assert!(!composed.has_changes());
    }

    #[test]
    fn keyed_changes_follow_insertion_order() {
        let mut map = IndexMap::identity(2);
        map.apply_keyed_change(
            &KeyedChange::Deleted {
                index: 0,
                key: Value::from("a"),
                value: Value::from(1),
            },
            true,
        );
        map.apply_keyed_change(
            &KeyedChange::Added {
                key: Value::from("c"),
            },
            true,
        );
        assert_eq!(map.entries, vec![1, CREATED]);
        assert_eq!(map.deleted_indices, vec![0]);
        let pair = map.deleted_items[0].as_array().unwrap().snapshot();
        assert_eq!(pair, vec![Value::from("a"), Value::from(1)]);
    }

    #[test]
    fn offsets_account_for_creations_and_deletions() {
        let map = copy_index_map(
            &[CREATED, 0, 2],
            Some(&[1]),
            Some(&[Value::from("b")]),
        );
        let normalized = apply_mutations_to_indices(&map);
        assert_eq!(normalized.entries, vec![CREATED, 1, 2]);
    }

    #[test]
    fn synchronize_rebuilds_shadow() {
        let mut shadow = vec!["a", "b", "c"];
        let map = copy_index_map(&[2, CREATED, 0], Some(&[1]), None);
        synchronize_indices(&mut shadow, &map, |_| "new");
        assert_eq!(shadow, vec!["c", "new", "a"]);
    }
}
