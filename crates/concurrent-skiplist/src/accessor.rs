#![expect(unsafe_code, reason = "dereferences node pointers the pinned core guarantees are live")]

//! [`Accessor`]: the reference-counted handle callers actually interact with.

use crate::alloc::{HeapNodeAllocator, NodeAllocator};
use crate::comparator::{Comparator, DefaultComparator};
use crate::core::SkipListCore;
use crate::error::AllocError;
use crate::height_oracle::DEFAULT_SEED;
use crate::iter::Iter;
use crate::maybe_loom::Arc;

/// A reference-counted handle over a shared [`ConcurrentSkipList`].
///
/// Constructing an `Accessor` pins the list's [`Recycler`](crate::recycler::Recycler): physical
/// destruction of any node removed while this (or any cloned) `Accessor` is alive is deferred until
/// every live `Accessor` over the same list has been dropped. Cloning is cheap (an `Arc` clone plus
/// a pin bump); every set-like operation below delegates to the shared core.
///
/// # Safety contract
/// Any reference returned through an `Accessor` (from [`find`](Self::find), [`first`](Self::first),
/// iteration, etc.) stays valid at least until the last `Accessor` over the same list is dropped,
/// even if the corresponding element was concurrently removed in the meantime.
pub struct Accessor<T, C = DefaultComparator, A: NodeAllocator = HeapNodeAllocator> {
    pub(crate) list: Arc<SkipListCore<T, C, A>>,
}

impl<T, C, A: NodeAllocator> Accessor<T, C, A> {
    fn pin(core: SkipListCore<T, C, A>) -> Self {
        let list = Arc::new(core);
        list.pin();
        Self { list }
    }

    #[must_use]
    pub(crate) fn core(&self) -> &SkipListCore<T, C, A> {
        &self.list
    }

    /// The number of elements inserted minus removed so far.
    ///
    /// Approximate under concurrent mutation (relaxed counter, per §5); never a strict bound on
    /// what a concurrent traversal would actually observe.
    #[must_use]
    pub fn size(&self) -> usize {
        self.list.size()
    }

    #[must_use]
    pub fn empty(&self) -> bool {
        self.list.empty()
    }

    /// The current number of levels in the list, including the head.
    #[must_use]
    pub fn height(&self) -> usize {
        self.list.height()
    }
}

impl<T, C, A: NodeAllocator> Clone for Accessor<T, C, A> {
    fn clone(&self) -> Self {
        self.list.pin();
        Self { list: Arc::clone(&self.list) }
    }
}

impl<T, C, A: NodeAllocator> Drop for Accessor<T, C, A> {
    fn drop(&mut self) {
        self.list.unpin();
    }
}

impl<T, C, A: NodeAllocator> std::fmt::Debug for Accessor<T, C, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessor").field("size", &self.size()).field("height", &self.height()).finish()
    }
}

impl<T: Default + Ord> Accessor<T> {
    /// Creates a new list ordered by `T`'s own [`Ord`] implementation, with a fixed default seed
    /// for the height oracle.
    ///
    /// # Errors
    /// Propagates an [`AllocError`] if the head sentinel cannot be allocated.
    pub fn new(initial_height: usize) -> Result<Self, AllocError> {
        Self::with_seed(initial_height, DEFAULT_SEED)
    }

    /// Like [`Self::new`], but with an explicit height-oracle seed, for reproducible tests.
    ///
    /// # Errors
    /// Propagates an [`AllocError`] if the head sentinel cannot be allocated.
    pub fn with_seed(initial_height: usize, seed: u64) -> Result<Self, AllocError> {
        Self::with_comparator_seeded(initial_height, DefaultComparator, seed)
    }
}

impl<T: Default, C: Comparator<T>> Accessor<T, C> {
    /// Creates a new list ordered by a caller-supplied [`Comparator`].
    ///
    /// # Errors
    /// Propagates an [`AllocError`] if the head sentinel cannot be allocated.
    pub fn with_comparator(initial_height: usize, comparator: C) -> Result<Self, AllocError> {
        Self::with_comparator_seeded(initial_height, comparator, DEFAULT_SEED)
    }

    /// Like [`Self::with_comparator`], but with an explicit height-oracle seed.
    ///
    /// # Errors
    /// Propagates an [`AllocError`] if the head sentinel cannot be allocated.
    pub fn with_comparator_seeded(
        initial_height: usize,
        comparator:     C,
        seed:           u64,
    ) -> Result<Self, AllocError> {
        let core = SkipListCore::new(comparator, HeapNodeAllocator, initial_height, seed)?;
        Ok(Self::pin(core))
    }
}

impl<T: Default, C: Comparator<T>, A: NodeAllocator> Accessor<T, C, A> {
    /// Creates a new list backed by a custom [`NodeAllocator`], e.g.
    /// [`ArenaNodeAllocator`](crate::alloc::ArenaNodeAllocator).
    ///
    /// # Errors
    /// Propagates an [`AllocError`] if the head sentinel cannot be allocated.
    pub fn with_allocator(
        initial_height: usize,
        comparator:     C,
        alloc:          A,
        seed:           u64,
    ) -> Result<Self, AllocError> {
        let core = SkipListCore::new(comparator, alloc, initial_height, seed)?;
        Ok(Self::pin(core))
    }

    /// Inserts `value` if no equal element exists.
    ///
    /// Returns `true` if `value` was newly inserted, `false` if an equal element was already
    /// present (in which case `value` is dropped).
    ///
    /// # Errors
    /// Propagates an [`AllocError`] if a new node cannot be allocated. The list is left unchanged
    /// on error.
    pub fn insert(&self, value: T) -> Result<bool, AllocError> {
        let (_node, new_size) = self.list.insert(value)?;
        Ok(new_size != 0)
    }

    /// Inserts `value` if no equal element exists, returning a reference to the (new or
    /// pre-existing) stored value alongside whether it was newly inserted.
    ///
    /// # Errors
    /// Propagates an [`AllocError`] if a new node cannot be allocated.
    pub fn add_or_get_data(&self, value: T) -> Result<(&T, bool), AllocError> {
        let (node, new_size) = self.list.insert(value)?;
        // SAFETY: `node` belongs to this list, which is pinned for at least `self`'s lifetime.
        let value_ref = unsafe { node.as_ref() }.value();
        Ok((value_ref, new_size != 0))
    }

    /// Logically removes an element equal to `key`, handing it to the recycler once physically
    /// unlinked.
    ///
    /// Returns `false` if no equal live element existed, or a concurrent remover won the race.
    pub fn erase(&self, key: &T) -> bool {
        self.list.remove(key)
    }

    /// Returns a reference to the element equal to `key`, if one is present and not concurrently
    /// being removed.
    #[must_use]
    pub fn find(&self, key: &T) -> Option<&T> {
        let node = self.list.find(key)?;
        // SAFETY: see `add_or_get_data`.
        Some(unsafe { node.as_ref() }.value())
    }

    /// Returns the first element not less than `key`.
    #[must_use]
    pub fn lower_bound(&self, key: &T) -> Option<&T> {
        let node = self.list.lower_bound(key)?;
        // SAFETY: see `add_or_get_data`.
        Some(unsafe { node.as_ref() }.value())
    }

    #[must_use]
    pub fn contains(&self, key: &T) -> bool {
        self.find(key).is_some()
    }

    /// `1` if `key` is present, `0` otherwise (this is a set: no element ever has a duplicate).
    #[must_use]
    pub fn count(&self, key: &T) -> usize {
        usize::from(self.contains(key))
    }

    /// The smallest element, on a best-effort basis (per §4.E, may observe a node that's
    /// concurrently being marked for removal).
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        let node = self.list.first()?;
        // SAFETY: see `add_or_get_data`.
        Some(unsafe { node.as_ref() }.value())
    }

    /// The largest element, on the same best-effort basis as [`Self::first`].
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        let node = self.list.last()?;
        // SAFETY: see `add_or_get_data`.
        Some(unsafe { node.as_ref() }.value())
    }

    /// Attempts to remove [`Self::last`]. Returns `false` on an empty list, or if a concurrent
    /// remover already took the element this call observed as last.
    pub fn pop_back(&self) -> bool {
        loop {
            let Some(node) = self.list.last() else { return false };
            // SAFETY: see `add_or_get_data`; the node stays live even if `remove` below wins a
            // race against a concurrent remover and unlinks it out from under us.
            let value = unsafe { node.as_ref() }.value();
            if self.list.remove(value) {
                return true;
            }
            // Lost the race (or `node` was already gone); retry against the new last element.
        }
    }

    #[must_use]
    pub fn begin(&self) -> Iter<'_, T, C, A> {
        Iter::from_first(self)
    }

    #[must_use]
    pub fn end(&self) -> Iter<'_, T, C, A> {
        Iter::at_end(self)
    }

    /// Identical to [`Self::begin`]; Rust has no separate const-iterator type.
    #[must_use]
    pub fn cbegin(&self) -> Iter<'_, T, C, A> {
        self.begin()
    }

    /// Identical to [`Self::end`]; Rust has no separate const-iterator type.
    #[must_use]
    pub fn cend(&self) -> Iter<'_, T, C, A> {
        self.end()
    }

    #[must_use]
    pub fn iter(&self) -> Iter<'_, T, C, A> {
        self.begin()
    }
}

impl<'a, T: Default, C: Comparator<T>, A: NodeAllocator> IntoIterator for &'a Accessor<T, C, A> {
    type IntoIter = Iter<'a, T, C, A>;
    type Item     = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::Accessor;

    #[test]
    fn insert_find_erase_round_trip() {
        let list = Accessor::<i32>::new(1).unwrap();
        assert!(list.insert(5).unwrap());
        assert!(!list.insert(5).unwrap());
        assert_eq!(list.size(), 1);
        assert_eq!(list.find(&5), Some(&5));
        assert!(list.erase(&5));
        assert!(!list.erase(&5));
        assert_eq!(list.size(), 0);
        assert_eq!(list.find(&5), None);
    }

    #[test]
    fn scenario_sorted_traversal() {
        let list = Accessor::<i32>::new(1).unwrap();
        for x in [3, 6, 7, 9, 12, 19, 17, 26, 21, 25] {
            assert!(list.insert(x).unwrap());
        }
        let got: Vec<i32> = list.iter().copied().collect();
        assert_eq!(got, vec![3, 6, 7, 9, 12, 17, 19, 21, 25, 26]);
        assert_eq!(list.find(&19), Some(&19));
        assert_eq!(list.find(&15), None);

        assert!(list.erase(&19));
        let got: Vec<i32> = list.iter().copied().collect();
        assert_eq!(got, vec![3, 6, 7, 9, 12, 17, 21, 25, 26]);
        assert_eq!(list.size(), 9);
    }

    #[test]
    fn pop_back_removes_the_largest() {
        let list = Accessor::<i32>::new(1).unwrap();
        for x in [1, 2, 3] {
            list.insert(x).unwrap();
        }
        assert!(list.pop_back());
        assert_eq!(list.last(), Some(&2));
        assert_eq!(list.size(), 2);
    }

    #[test]
    fn first_and_last_on_a_run() {
        let list = Accessor::<i32>::new(1).unwrap();
        for x in 1..=1024 {
            list.insert(x).unwrap();
        }
        assert_eq!(list.first(), Some(&1));
        assert_eq!(list.last(), Some(&1024));
        assert!((6..=14).contains(&list.height()));
    }

    #[test]
    fn reversed_comparator_sorts_descending() {
        use crate::comparator::FnComparator;

        let list = Accessor::with_comparator(1, FnComparator(|a: &i32, b: &i32| b < a)).unwrap();
        for x in [1, 2, 3] {
            list.insert(x).unwrap();
        }
        let got: Vec<i32> = list.iter().copied().collect();
        assert_eq!(got, vec![3, 2, 1]);
        assert_eq!(list.lower_bound(&2), Some(&2));
    }

    #[test]
    fn add_or_get_data_reports_whether_inserted() {
        let list = Accessor::<i32>::new(1).unwrap();
        let (value, inserted) = list.add_or_get_data(5).unwrap();
        assert_eq!(*value, 5);
        assert!(inserted);
        let (value, inserted) = list.add_or_get_data(5).unwrap();
        assert_eq!(*value, 5);
        assert!(!inserted);
    }
}
