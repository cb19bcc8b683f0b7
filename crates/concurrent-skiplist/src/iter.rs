#![expect(unsafe_code, reason = "walks node pointers the owning Accessor keeps pinned alive")]

//! Forward iteration ([`Iter`]) and a reseekable cursor ([`Skipper`]) over a pinned list.

use std::ptr::NonNull;

use crate::accessor::Accessor;
use crate::alloc::NodeAllocator;
use crate::comparator::{Comparator, DefaultComparator};
use crate::height_oracle::MAX_HEIGHT;
use crate::node::Node;

/// A forward iterator over a list's elements in ascending order.
///
/// Borrows its [`Accessor`], so it cannot outlive the handle that keeps the underlying list
/// pinned; the borrow checker rules out the dangling-iterator misuse this would otherwise allow.
/// Elements concurrently marked for removal are skipped, matching [`Node::next`].
pub struct Iter<'a, T, C = DefaultComparator, A: NodeAllocator = crate::alloc::HeapNodeAllocator> {
    accessor: &'a Accessor<T, C, A>,
    current:  Option<NonNull<Node<T>>>,
}

impl<'a, T: Default, C: Comparator<T>, A: NodeAllocator> Iter<'a, T, C, A> {
    pub(crate) fn from_first(accessor: &'a Accessor<T, C, A>) -> Self {
        Self { accessor, current: accessor.core().first() }
    }

    pub(crate) fn at_end(accessor: &'a Accessor<T, C, A>) -> Self {
        Self { accessor, current: None }
    }

    /// The list this iterator is walking.
    #[must_use]
    pub fn accessor(&self) -> &'a Accessor<T, C, A> {
        self.accessor
    }
}

impl<'a, T: Default, C: Comparator<T>, A: NodeAllocator> Iterator for Iter<'a, T, C, A> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        // SAFETY: `node` was reached from the list's head (or a prior `next`), and the list stays
        // pinned for at least `'a` by `self.accessor`.
        let node_ref = unsafe { node.as_ref() };
        self.current = node_ref.next();

        // SAFETY: `'a` is bounded by `self.accessor`'s borrow, which keeps the list (and thus
        // `node`) pinned against recycling for at least that long.
        let value: &'a T = unsafe { &*std::ptr::from_ref(node_ref.value()) };
        Some(value)
    }
}

/// A reseekable cursor over a list, caching the predecessor/successor chain at every level so that
/// repeated forward seeks don't re-walk from the head each time.
///
/// Mirrors the spec's description of a `Skipper`: `preds`/`succs` arrays plus the head height
/// observed at construction. Rather than a separate `hints[]` array, the climb in [`Self::to`]
/// reuses the cached `preds` themselves as the hint: scanning down from the highest cached level,
/// the first predecessor still known to be less than the new key is a valid point from which a
/// single down-then-right descent can fill in every level at or below it.
pub struct Skipper<'a, T, C = DefaultComparator, A: NodeAllocator = crate::alloc::HeapNodeAllocator> {
    accessor:      &'a Accessor<T, C, A>,
    preds:         [Option<NonNull<Node<T>>>; MAX_HEIGHT],
    succs:         [Option<NonNull<Node<T>>>; MAX_HEIGHT],
    cached_height: usize,
}

impl<'a, T: Default, C: Comparator<T>, A: NodeAllocator> Skipper<'a, T, C, A> {
    #[must_use]
    pub fn new(accessor: &'a Accessor<T, C, A>) -> Self {
        Self {
            accessor,
            preds: [None; MAX_HEIGHT],
            succs: [None; MAX_HEIGHT],
            cached_height: accessor.core().height(),
        }
    }

    /// Repositions the cursor at the first element not less than `key`.
    ///
    /// After this call, [`Self::current`] is that element (or `None` if the list has no such
    /// element), and [`Self::advance`] continues forward from there.
    pub fn to(&mut self, key: &T) {
        let core = self.accessor.core();
        self.cached_height = self.cached_height.max(core.height()).min(MAX_HEIGHT);

        // Climb: scan down from the highest cached level for the first predecessor still known
        // to be less than `key` (the head, cached as `None`, is always less than any key). That
        // predecessor is a valid point to resume the down-then-right descent from, without
        // walking all the way from the head; `probe_from` then fills in every level at or below
        // it in one pass.
        let mut level = self.cached_height - 1;
        while level > 0 {
            // SAFETY: anything previously cached in `preds` is a node reachable from this list,
            // kept alive by `self.accessor`.
            let pred_still_valid = self.preds[level]
                .is_none_or(|p| core.less(unsafe { p.as_ref() }.value(), key));
            if pred_still_valid {
                break;
            }
            level -= 1;
        }

        let start = self.preds[level].unwrap_or_else(|| core.head_ptr());
        let probe = core.probe_from(level + 1, start, key);
        self.preds[..=level].copy_from_slice(&probe.preds[..=level]);
        self.succs[..=level].copy_from_slice(&probe.succs[..=level]);

        // Skip any run of logically-removed nodes at level 0, so `current` never yields one.
        while let Some(node) = self.succs[0] {
            // SAFETY: reachable node, kept alive by `self.accessor`.
            let node_ref = unsafe { node.as_ref() };
            if node_ref.marked_for_removal() {
                self.preds[0] = Some(node);
                self.succs[0] = node_ref.skip(0);
            } else {
                break;
            }
        }
    }

    /// Whether the cursor currently sits on a live element.
    #[must_use]
    pub fn good(&self) -> bool {
        self.succs[0].is_some()
    }

    /// The element the cursor currently sits on, if any.
    #[must_use]
    pub fn current(&self) -> Option<&'a T> {
        let node = self.succs[0]?;
        // SAFETY: `node` is reachable and kept alive by `self.accessor` for at least `'a`.
        let node_ref = unsafe { node.as_ref() };
        let value: &'a T = unsafe { &*std::ptr::from_ref(node_ref.value()) };
        Some(value)
    }

    /// Moves the cursor to the next element.
    ///
    /// Returns `false` (leaving the cursor past the end) if there was no next element.
    pub fn advance(&mut self) -> bool {
        let Some(next) = self.succs[0] else { return false };
        // SAFETY: reachable node, kept alive by `self.accessor`.
        let next_ref = unsafe { next.as_ref() };

        self.preds[0] = Some(next);
        self.succs[0] = next_ref.next();

        for level in 1..self.cached_height {
            if self.succs[level] == Some(next) {
                self.preds[level] = self.succs[level];
                // SAFETY: see above.
                self.succs[level] = unsafe { next.as_ref() }.skip(level);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::accessor::Accessor;
    use crate::iter::Skipper;

    #[test]
    fn iter_visits_elements_in_order() {
        let list = Accessor::<i32>::new(1).unwrap();
        for x in [5, 1, 4, 2, 3] {
            list.insert(x).unwrap();
        }
        let got: Vec<i32> = list.iter().copied().collect();
        assert_eq!(got, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn iter_skips_removed_elements() {
        let list = Accessor::<i32>::new(1).unwrap();
        for x in 1..=5 {
            list.insert(x).unwrap();
        }
        assert!(list.erase(&3));
        let got: Vec<i32> = list.iter().copied().collect();
        assert_eq!(got, vec![1, 2, 4, 5]);
    }

    #[test]
    fn skipper_seeks_and_advances() {
        let list = Accessor::<i32>::new(1).unwrap();
        for x in [10, 20, 30, 40, 50] {
            list.insert(x).unwrap();
        }

        let mut skipper = Skipper::new(&list);
        skipper.to(&25);
        assert!(skipper.good());
        assert_eq!(skipper.current(), Some(&30));

        assert!(skipper.advance());
        assert_eq!(skipper.current(), Some(&40));

        skipper.to(&40);
        assert_eq!(skipper.current(), Some(&40));

        assert!(skipper.advance());
        assert!(skipper.advance());
        assert!(!skipper.good());
    }

    #[test]
    fn skipper_to_past_the_end_is_not_good() {
        let list = Accessor::<i32>::new(1).unwrap();
        list.insert(1).unwrap();
        let mut skipper = Skipper::new(&list);
        skipper.to(&100);
        assert!(!skipper.good());
        assert_eq!(skipper.current(), None);
    }
}
