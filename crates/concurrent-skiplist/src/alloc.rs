#![expect(unsafe_code, reason = "raw memory allocation")]

//! The allocator abstraction nodes are carved out of.
//!
//! Generalizes the `SysAllocator` / `CxxAllocatorAdaptor` / `AllocatorHasTrivialDeallocate` trio
//! that the original skip list used to let a `NodeRecycler` skip the destructor sweep entirely
//! when backed by an arena: [`NodeAllocator::TRIVIAL_DEALLOCATE`] is this crate's equivalent
//! compile-time flag.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::AllocError;

/// A thread-safe byte allocator that nodes are carved out of.
///
/// # Safety
/// Implementations must return memory that is valid for reads and writes for the requested
/// `layout`, not aliased by any other live allocation, and must accept back in `deallocate` only
/// pointers previously returned by `allocate` on the same allocator instance with the same
/// `layout`.
pub unsafe trait NodeAllocator: Send + Sync {
    /// Whether [`deallocate`](Self::deallocate) is a no-op.
    ///
    /// When `true`, the [`Recycler`](crate::recycler::Recycler) skips queuing retired nodes
    /// entirely, and the list's destructor skips walking the list to free nodes one by one,
    /// since the allocator reclaims everything in bulk on its own drop.
    const TRIVIAL_DEALLOCATE: bool;

    /// Allocates memory fitting `layout`.
    ///
    /// # Errors
    /// Returns [`AllocError::OutOfMemory`] if the allocator cannot satisfy the request.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Deallocates memory previously returned by [`allocate`](Self::allocate) with the same
    /// `layout`.
    ///
    /// # Safety
    /// `ptr` must have been returned by `self.allocate(layout)` and not already deallocated.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The default [`NodeAllocator`]: the global heap allocator.
///
/// Individual nodes are freed as soon as the [`Recycler`](crate::recycler::Recycler) sweeps them,
/// which is what every public constructor in this crate uses unless told otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapNodeAllocator;

// SAFETY: `std::alloc::{alloc, dealloc}` satisfy the contract of `NodeAllocator` directly.
unsafe impl NodeAllocator for HeapNodeAllocator {
    const TRIVIAL_DEALLOCATE: bool = false;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }
        // SAFETY: `layout` has nonzero size, as checked above.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or(AllocError::OutOfMemory { layout })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        // SAFETY: caller guarantees `ptr`/`layout` match a prior `allocate` call.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

#[cfg(feature = "arena-alloc")]
pub use arena::ArenaNodeAllocator;

#[cfg(feature = "arena-alloc")]
mod arena {
    use std::alloc::Layout;
    use std::ptr::NonNull;

    use bumpalo::Bump;

    use super::NodeAllocator;
    use crate::error::AllocError;
    use crate::maybe_loom::Mutex;

    /// A [`NodeAllocator`] backed by a [`bumpalo`] arena, with a trivial (no-op) `deallocate`.
    ///
    /// Appropriate for lists with a bounded, throwaway lifetime, e.g. building a sorted index once
    /// and discarding it in bulk: individual nodes are never freed, only reclaimed all at once when
    /// the arena itself is dropped.
    #[derive(Debug, Default)]
    pub struct ArenaNodeAllocator {
        bump: Mutex<Bump>,
    }

    impl ArenaNodeAllocator {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    // SAFETY: allocation is serialized by the inner `Mutex`, and `deallocate` does nothing, so
    // there is nothing for a second thread to observe inconsistently.
    unsafe impl NodeAllocator for ArenaNodeAllocator {
        const TRIVIAL_DEALLOCATE: bool = true;

        fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
            self.bump
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .try_alloc_layout(layout)
                .map_err(|_huge_layout_error| AllocError::OutOfMemory { layout })
        }

        unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
            // Bump allocators reclaim everything at once, on drop.
        }
    }
}

#[cfg(test)]
mod tests {
    use std::alloc::Layout;

    use super::{HeapNodeAllocator, NodeAllocator};

    #[test]
    fn heap_allocator_is_not_trivial() {
        assert!(!HeapNodeAllocator::TRIVIAL_DEALLOCATE);
    }

    #[test]
    fn heap_allocator_round_trips() {
        let alloc = HeapNodeAllocator;
        let layout = Layout::new::<u64>();
        let ptr = alloc.allocate(layout).unwrap();
        // SAFETY: freshly allocated memory fitting `layout`.
        unsafe {
            ptr.as_ptr().cast::<u64>().write(42);
            assert_eq!(ptr.as_ptr().cast::<u64>().read(), 42);
            alloc.deallocate(ptr, layout);
        }
    }
}
