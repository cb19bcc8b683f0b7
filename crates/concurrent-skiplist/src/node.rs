#![expect(unsafe_code, reason = "variable-height nodes are hand-allocated and linked by raw pointer")]

//! The skip list's node representation: a fixed header plus a per-node forward-pointer array,
//! sized to the node's randomly-drawn height.

use std::alloc::Layout;
use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering;

use crate::alloc::NodeAllocator;
use crate::error::AllocError;
use crate::maybe_loom::{AtomicBool, AtomicPtr};
use crate::spin_lock::{SpinLock, SpinLockGuard};

/// A node in the skip list.
///
/// Each node is carved out of a single allocation: the fixed-size header (this struct) followed
/// immediately by a trailing array of `height` forward pointers, one per level the node
/// participates in, placed at whatever alignment-driven offset [`Layout::extend`] computes for
/// them. See [`Self::create`].
///
/// # Invariants relied on by unsafe code
/// - `forward` points to exactly `height` initialized, live `AtomicPtr<Node<T>>` slots, living
///   inside the same allocation as the header, for as long as this node exists.
/// - Every non-null pointer ever stored into a `forward` slot points to another node allocated by
///   the same list (and thus the same allocator), kept alive at least until the list's
///   [`Recycler`](crate::recycler::Recycler) physically frees it.
pub(crate) struct Node<T> {
    value:              T,
    height:             u32,
    is_head:            bool,
    lock:               SpinLock,
    fully_linked:        AtomicBool,
    marked_for_removal: AtomicBool,
    forward:            NonNull<AtomicPtr<Node<T>>>,
}

// SAFETY: a `Node<T>` is only ever reached through the list's own synchronization (per-node spin
// locks on the write path, acquire/release atomics on the read path); sending or sharing it across
// threads is sound whenever `T` itself is.
unsafe impl<T: Send> Send for Node<T> {}
// SAFETY: see above; shared access additionally requires `T: Sync` since `value` is read through
// `&Node<T>` from any thread holding a reference to the node.
unsafe impl<T: Sync> Sync for Node<T> {}

impl<T> Node<T> {
    fn header_layout() -> Layout {
        Layout::new::<Node<T>>()
    }

    fn forward_layout(height: usize) -> Layout {
        Layout::array::<AtomicPtr<Node<T>>>(height).expect("node height is always small")
    }

    /// The layout of a node's single allocation (the header immediately followed by `height`
    /// forward-pointer slots) and the byte offset at which those slots begin.
    fn combined_layout(height: usize) -> (Layout, usize) {
        let (combined, forward_offset) = Self::header_layout()
            .extend(Self::forward_layout(height))
            .expect("node layout never overflows for any height up to MAX_HEIGHT");
        (combined.pad_to_align(), forward_offset)
    }

    /// Allocates and fully initializes a new node with the given `height`, holding `value`.
    ///
    /// The node starts with every forward slot null, `fully_linked = false`, and
    /// `marked_for_removal = false`; the caller is responsible for linking it into the list and
    /// calling [`Self::set_fully_linked`] once that is done.
    ///
    /// # Errors
    /// Propagates [`AllocError`] if the single allocation this performs fails.
    pub(crate) fn create<A: NodeAllocator>(
        alloc:   &A,
        height:  usize,
        value:   T,
        is_head: bool,
    ) -> Result<NonNull<Self>, AllocError> {
        debug_assert!(height >= 1, "every node has at least one level");

        let (layout, forward_offset) = Self::combined_layout(height);
        let base = alloc.allocate(layout)?;

        let header_ptr = base.as_ptr().cast::<Self>();
        // SAFETY: `forward_offset` was computed by `Layout::extend` against this exact `layout`,
        // so it lands within the allocation, correctly aligned for `AtomicPtr<Self>`.
        let forward_ptr = unsafe { base.as_ptr().add(forward_offset).cast::<AtomicPtr<Self>>() };

        for i in 0..height {
            // SAFETY: `forward_ptr` is valid for `height` writes of this type, freshly allocated.
            unsafe { forward_ptr.add(i).write(AtomicPtr::new(ptr::null_mut())) };
        }

        // SAFETY: `header_ptr` is valid, freshly allocated, and not yet initialized.
        unsafe {
            header_ptr.write(Self {
                value,
                height: u32::try_from(height).expect("height never exceeds MAX_HEIGHT"),
                is_head,
                lock: SpinLock::new(),
                fully_linked: AtomicBool::new(false),
                marked_for_removal: AtomicBool::new(false),
                forward: NonNull::new_unchecked(forward_ptr),
            });
        }

        // SAFETY: just initialized above, and is nonnull since it came from `NodeAllocator`.
        Ok(unsafe { NonNull::new_unchecked(header_ptr) })
    }

    /// Drops the value and frees a node's single allocation.
    ///
    /// A no-op when `A::TRIVIAL_DEALLOCATE` is set, since the allocator reclaims everything in
    /// bulk; in that case the caller must still ensure the node is no longer reachable, since its
    /// memory, while not freed, is allowed to be reused for nothing else until the arena drops.
    ///
    /// # Safety
    /// `node` must have been created by [`Self::create`] using `alloc`, must not be reachable from
    /// any other node's forward pointers, and must not be destroyed more than once.
    pub(crate) unsafe fn destroy<A: NodeAllocator>(alloc: &A, node: NonNull<Self>) {
        if A::TRIVIAL_DEALLOCATE {
            return;
        }

        let ptr = node.as_ptr();
        // SAFETY: caller guarantees `node` is a live, uniquely-owned node from `create`.
        let height = unsafe { (*ptr).height as usize };
        let (layout, _forward_offset) = Self::combined_layout(height);

        // Drops `value` (and runs no-op destructors for the rest of the header).
        // SAFETY: caller guarantees this is the only access to `node` from here on.
        unsafe { ptr::drop_in_place(ptr) };

        // SAFETY: `ptr`/`layout` match the single allocation `create` made for this node.
        unsafe { alloc.deallocate(NonNull::new_unchecked(ptr.cast::<u8>()), layout) };
    }

    #[inline]
    #[must_use]
    pub(crate) fn height(&self) -> usize {
        self.height as usize
    }

    #[inline]
    #[must_use]
    pub(crate) fn max_layer(&self) -> usize {
        self.height() - 1
    }

    #[inline]
    #[must_use]
    pub(crate) const fn is_head(&self) -> bool {
        self.is_head
    }

    #[inline]
    #[must_use]
    pub(crate) fn value(&self) -> &T {
        &self.value
    }

    fn forward_slots(&self) -> &[AtomicPtr<Self>] {
        // SAFETY: by this node's invariants, `forward` references exactly `height` initialized,
        // live slots for as long as `self` is alive.
        unsafe { std::slice::from_raw_parts(self.forward.as_ptr(), self.height()) }
    }

    fn skip_with(&self, level: usize, order: Ordering) -> Option<NonNull<Self>> {
        NonNull::new(self.forward_slots()[level].load(order))
    }

    /// Acquire-load of the forward pointer at `level`.
    #[inline]
    #[must_use]
    pub(crate) fn skip(&self, level: usize) -> Option<NonNull<Self>> {
        self.skip_with(level, Ordering::Acquire)
    }

    /// Release-store of the forward pointer at `level`.
    ///
    /// # Safety
    /// If `next` is `Some`, the referenced node must have been allocated by the same list (so
    /// readers that later acquire-load it observe a consistent allocator and recycler).
    #[inline]
    pub(crate) unsafe fn set_skip(&self, level: usize, next: Option<NonNull<Self>>) {
        self.forward_slots()[level]
            .store(next.map_or(ptr::null_mut(), NonNull::as_ptr), Ordering::Release);
    }

    /// Like [`Self::skip`], but skips over any run of logically-removed nodes at level 0.
    #[must_use]
    pub(crate) fn next(&self) -> Option<NonNull<Self>> {
        let mut cur = self.skip(0);
        while let Some(node) = cur {
            // SAFETY: `node` is reachable from this live node, hence itself live.
            let node_ref = unsafe { node.as_ref() };
            if node_ref.marked_for_removal() {
                cur = node_ref.skip(0);
            } else {
                break;
            }
        }
        cur
    }

    /// Copies `old`'s forward pointers into `self`, for use when growing the head.
    ///
    /// # Safety
    /// `self` must have height at least `old.height()`, and must not yet be reachable from any
    /// other node (so no reader can observe a partially-copied head).
    pub(crate) unsafe fn copy_head(&self, old: &Self) {
        debug_assert!(self.height() >= old.height());
        for level in 0..old.height() {
            // Relaxed is sufficient: `old` is locked by the caller, so no concurrent writer is
            // changing this slot, and `self` is not yet published to any reader.
            let next = old.skip_with(level, Ordering::Relaxed);
            // SAFETY: `next`, if any, belongs to the same list as `old`, hence the same list as
            // `self` (the caller is growing that same list's head).
            unsafe { self.set_skip(level, next) };
        }
    }

    #[must_use]
    pub(crate) fn acquire_guard(&self) -> SpinLockGuard<'_> {
        self.lock.lock()
    }

    #[inline]
    #[must_use]
    pub(crate) fn fully_linked(&self) -> bool {
        self.fully_linked.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_fully_linked(&self) {
        self.fully_linked.store(true, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub(crate) fn marked_for_removal(&self) -> bool {
        self.marked_for_removal.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_marked_for_removal(&self) {
        self.marked_for_removal.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::Node;
    use crate::alloc::HeapNodeAllocator;

    #[test]
    fn create_and_destroy_round_trips() {
        let alloc = HeapNodeAllocator;
        let node = Node::create(&alloc, 4, 7_i32, false).unwrap();
        // SAFETY: freshly created, exclusively owned here.
        unsafe {
            assert_eq!(node.as_ref().height(), 4);
            assert_eq!(node.as_ref().max_layer(), 3);
            assert_eq!(*node.as_ref().value(), 7);
            assert!(!node.as_ref().fully_linked());
            assert!(node.as_ref().skip(0).is_none());
            Node::destroy(&alloc, node);
        }
    }

    #[test]
    fn skip_pointers_round_trip() {
        let alloc = HeapNodeAllocator;
        let a = Node::create(&alloc, 1, 1_i32, false).unwrap();
        let b = Node::create(&alloc, 1, 2_i32, false).unwrap();
        // SAFETY: both nodes are allocated by `alloc` and kept alive for this test.
        unsafe {
            a.as_ref().set_skip(0, Some(b));
            assert_eq!(a.as_ref().skip(0), Some(b));
            assert_eq!(*a.as_ref().next().unwrap().as_ref().value(), 2);

            b.as_ref().set_marked_for_removal();
            assert!(a.as_ref().next().is_none());

            Node::destroy(&alloc, a);
            Node::destroy(&alloc, b);
        }
    }
}
