//! A fine-grained-locking, concurrent, lock-free-read ordered set backed by a multi-level skip
//! list.
//!
//! Writers serialize only over the handful of nodes they actually touch, acquiring per-node
//! [`SpinLock`](spin_lock::SpinLock)s bottom-up to avoid deadlock; readers never take a lock at
//! all, walking a chain of acquire-loaded forward pointers instead. A node removed while a reader
//! might still be mid-traversal through it is never freed immediately: the [`Recycler`] defers
//! physical destruction until every [`Accessor`] pinning the list has been dropped.
//!
//! # Getting started
//!
//! ```
//! use concurrent_skiplist::{Accessor, ConcurrentSkipList};
//!
//! let list: Accessor<i32> = ConcurrentSkipList::create(1).unwrap();
//! assert!(list.insert(5).unwrap());
//! assert!(!list.insert(5).unwrap());
//! assert_eq!(list.find(&5), Some(&5));
//!
//! let other = list.clone();
//! std::thread::spawn(move || {
//!     other.insert(6).unwrap();
//! })
//! .join()
//! .unwrap();
//! assert_eq!(list.size(), 2);
//! ```
//!
//! Ordering is by `T`'s own [`Ord`] by default; [`ConcurrentSkipList::with_comparator`] takes a
//! caller-supplied [`Comparator`] instead, e.g. [`FnComparator`] for a reversed order.

mod accessor;
mod alloc;
mod comparator;
mod core;
mod error;
mod height_oracle;
mod iter;
mod maybe_loom;
mod node;
mod recycler;
mod spin_lock;

use std::marker::PhantomData;

pub use accessor::Accessor;
pub use comparator::{Comparator, DefaultComparator, FnComparator};
pub use error::AllocError;
pub use iter::{Iter, Skipper};
pub use alloc::{HeapNodeAllocator, NodeAllocator};

cfg_if::cfg_if! {
    if #[cfg(feature = "arena-alloc")] {
        pub use alloc::ArenaNodeAllocator;
    }
}

/// A namespace for the handful of ways to build a new list; the handle you actually hold onto and
/// call methods on is an [`Accessor`].
///
/// This type is never instantiated; it exists purely so the construction entry points read as
/// `ConcurrentSkipList::create(...)` rather than free functions.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrentSkipList<T, C = DefaultComparator, A: NodeAllocator = HeapNodeAllocator> {
    _never: PhantomData<(fn() -> T, fn() -> C, fn() -> A)>,
}

impl<T: Default + Ord> ConcurrentSkipList<T> {
    /// Creates a new, empty list ordered by `T`'s own [`Ord`] implementation.
    ///
    /// `initial_height` is clamped to `[1, MAX_HEIGHT]`; most callers should just pass `1`, since
    /// the list grows its own height automatically as it fills up (§3 of the design notes).
    ///
    /// # Errors
    /// Propagates an [`AllocError`] if the head sentinel cannot be allocated.
    pub fn create(initial_height: usize) -> Result<Accessor<T>, AllocError> {
        Accessor::new(initial_height)
    }

    /// Like [`Self::create`], but with an explicit height-oracle seed, for reproducible tests.
    ///
    /// # Errors
    /// Propagates an [`AllocError`] if the head sentinel cannot be allocated.
    pub fn create_seeded(initial_height: usize, seed: u64) -> Result<Accessor<T>, AllocError> {
        Accessor::with_seed(initial_height, seed)
    }
}

impl<T: Default, C: Comparator<T>> ConcurrentSkipList<T, C> {
    /// Creates a new, empty list ordered by a caller-supplied [`Comparator`].
    ///
    /// # Errors
    /// Propagates an [`AllocError`] if the head sentinel cannot be allocated.
    pub fn with_comparator(initial_height: usize, comparator: C) -> Result<Accessor<T, C>, AllocError> {
        Accessor::with_comparator(initial_height, comparator)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "arena-alloc")] {
        impl<T: Default, C: Comparator<T>> ConcurrentSkipList<T, C, ArenaNodeAllocator> {
            /// Creates a new list backed by a [`bumpalo`] arena: individual removed nodes are never
            /// freed, only reclaimed in bulk when every [`Accessor`] over the list is dropped.
            ///
            /// # Errors
            /// Propagates an [`AllocError`] if the head sentinel cannot be allocated.
            pub fn with_arena(
                initial_height: usize,
                comparator:     C,
                seed:           u64,
            ) -> Result<Accessor<T, C, ArenaNodeAllocator>, AllocError> {
                Accessor::with_allocator(initial_height, comparator, ArenaNodeAllocator::new(), seed)
            }
        }
    }
}
