#![expect(unsafe_code, reason = "frees raw node pointers handed over by the core")]

//! Deferred, reference-counted destruction of logically-unlinked nodes.
//!
//! A node that has been physically unlinked from the list may still be reachable through a stale
//! forward pointer held by a reader that is mid-traversal. The [`Recycler`] defers the actual
//! `destroy` call until every [`Accessor`](crate::accessor::Accessor) pinning the list has gone
//! away, at which point no reader could possibly still be holding a pointer into the retired node.

use std::ptr::NonNull;

use tracing::debug;

use crate::alloc::NodeAllocator;
use crate::maybe_loom::{Mutex, MutexGuard};
use crate::node::Node;

/// Pending nodes plus the live-accessor count, behind one lock (per §5: "the Recycler has one
/// internal lock protecting the pending list and pinned counter"). Keeping both under the same
/// lock, rather than a separate atomic counter, is what rules out a sweep racing a fresh `add` that
/// arrives just as the count reaches zero.
struct RecyclerState<T> {
    pinned:  usize,
    pending: Vec<NonNull<Node<T>>>,
}

/// Defers physical node destruction until no [`Accessor`](crate::accessor::Accessor) remains.
pub(crate) struct Recycler<T, A> {
    alloc: A,
    state: Mutex<RecyclerState<T>>,
}

// SAFETY: `Node<T>` is `Send`/`Sync` whenever `T` is (see `node.rs`); every access to the pending
// `NonNull<Node<T>>` pointers goes through `state`'s mutex, and `alloc` is itself `Send + Sync`.
unsafe impl<T: Send, A: Send> Send for Recycler<T, A> {}
// SAFETY: see above.
unsafe impl<T: Send, A: Sync> Sync for Recycler<T, A> {}

impl<T, A: NodeAllocator> Recycler<T, A> {
    #[must_use]
    pub(crate) fn new(alloc: A) -> Self {
        Self {
            alloc,
            state: Mutex::new(RecyclerState { pinned: 0, pending: Vec::new() }),
        }
    }

    #[must_use]
    pub(crate) fn alloc(&self) -> &A {
        &self.alloc
    }

    /// Called by [`Accessor`](crate::accessor::Accessor) construction.
    pub(crate) fn add_ref(&self) {
        let mut state = self.lock();
        state.pinned += 1;
    }

    /// Called by [`Accessor`](crate::accessor::Accessor) destruction. Sweeps and physically frees
    /// every pending node if this was the last pinning accessor.
    pub(crate) fn release_ref(&self) {
        let pending = {
            let mut state = self.lock();
            debug_assert!(state.pinned > 0, "release_ref without a matching add_ref");
            state.pinned -= 1;
            if state.pinned == 0 {
                std::mem::take(&mut state.pending)
            } else {
                return;
            }
        };

        if pending.is_empty() {
            return;
        }

        debug!(count = pending.len(), "recycler sweep: freeing retired nodes");
        for node in pending {
            // SAFETY: every node ever pushed to `pending` came from `add`, whose caller contract
            // requires it be logically unlinked and not reachable from any other node's forward
            // pointers; by construction no `Accessor` existed when this sweep began, so no reader
            // can be mid-traversal through it either.
            unsafe { Node::destroy(&self.alloc, node) };
        }
    }

    /// Enqueues a logically-unlinked node for deferred destruction.
    ///
    /// A no-op when `A::TRIVIAL_DEALLOCATE`, since nothing is ever physically freed early in that
    /// case; the whole arena is reclaimed in bulk when the list itself drops.
    ///
    /// # Safety
    /// `node` must be logically unlinked (unreachable from any other node's forward pointers or
    /// from the head) and must not be handed to `add` more than once.
    pub(crate) unsafe fn add(&self, node: NonNull<Node<T>>) {
        if A::TRIVIAL_DEALLOCATE {
            return;
        }
        self.lock().pending.push(node);
    }

    fn lock(&self) -> MutexGuard<'_, RecyclerState<T>> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
