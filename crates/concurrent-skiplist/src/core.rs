#![expect(unsafe_code, reason = "lock-free traversal and fine-grained per-node locking over raw pointers")]

//! The skip list's write/read engine: search, insert, remove, and height growth.
//!
//! Readers never take a lock: every traversal is a chain of acquire-loads of `forward` pointers.
//! Writers serialize through the per-node [`SpinLock`](crate::spin_lock::SpinLock) exposed by
//! [`Node::acquire_guard`], always acquired bottom-up (lowest level first) by both `insert` and
//! `remove`, which is what rules out deadlock between concurrent writers (see §5).

use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use tracing::debug;

use crate::alloc::NodeAllocator;
use crate::comparator::Comparator;
use crate::error::AllocError;
use crate::height_oracle::{self, HeightOracle, MAX_HEIGHT};
use crate::maybe_loom::AtomicPtr;
use crate::node::Node;
use crate::recycler::Recycler;

/// The result of a downward-then-rightward search from the head.
///
/// `preds[level]`/`succs[level]` are only meaningful for `level < height`; they hold, respectively,
/// the last node strictly less than the search key and its right neighbor at that level (the head
/// counts as a valid, always-present predecessor).
pub(crate) struct Probe<T> {
    pub(crate) preds:  [Option<NonNull<Node<T>>>; MAX_HEIGHT],
    pub(crate) succs:  [Option<NonNull<Node<T>>>; MAX_HEIGHT],
    pub(crate) height: usize,
    /// The highest level at which `succs[level]` compares equal to the search key, if any.
    found_layer:       Option<usize>,
}

/// The shared, reference-counted skip list state: head sentinel, size counter, height oracle, and
/// node recycler. Reached only through [`Accessor`](crate::accessor::Accessor), which is what
/// hands out the `Arc` this lives behind.
pub(crate) struct SkipListCore<T, C, A: NodeAllocator> {
    comparator: C,
    head:       AtomicPtr<Node<T>>,
    size:       std::sync::atomic::AtomicUsize,
    oracle:     HeightOracle,
    recycler:   Recycler<T, A>,
}

// SAFETY: all shared access to nodes and the head pointer goes through the atomics and per-node
// spin locks documented above; this is sound exactly when `T`, `C`, and `A` are themselves.
unsafe impl<T: Send, C: Send, A: NodeAllocator + Send> Send for SkipListCore<T, C, A> {}
// SAFETY: see above; `Sync` additionally requires `T: Sync` since `&SkipListCore` exposes shared
// references to stored values.
unsafe impl<T: Send + Sync, C: Sync, A: NodeAllocator + Sync> Sync for SkipListCore<T, C, A> {}

impl<T: Default, C, A: NodeAllocator> SkipListCore<T, C, A> {
    pub(crate) fn new(
        comparator:     C,
        alloc:          A,
        initial_height: usize,
        seed:           u64,
    ) -> Result<Self, AllocError> {
        let initial_height = initial_height.clamp(1, MAX_HEIGHT);
        let head = Node::create(&alloc, initial_height, T::default(), true)?;
        Ok(Self {
            comparator,
            head: AtomicPtr::new(head.as_ptr()),
            size: std::sync::atomic::AtomicUsize::new(0),
            oracle: HeightOracle::new(seed),
            recycler: Recycler::new(alloc),
        })
    }
}

impl<T, C, A: NodeAllocator> SkipListCore<T, C, A> {
    #[must_use]
    pub(crate) fn alloc(&self) -> &A {
        self.recycler.alloc()
    }

    pub(crate) fn pin(&self) {
        self.recycler.add_ref();
    }

    pub(crate) fn unpin(&self) {
        self.recycler.release_ref();
    }

    pub(crate) fn head_ptr(&self) -> NonNull<Node<T>> {
        // SAFETY: the head is replaced only by `grow_height`'s CAS, which always installs a
        // non-null, fully initialized node, and the old head is only handed to the recycler (never
        // freed) while this `Accessor` pins the list.
        unsafe { NonNull::new_unchecked(self.head.load(Ordering::Acquire)) }
    }

    #[must_use]
    pub(crate) fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    #[must_use]
    pub(crate) fn empty(&self) -> bool {
        self.size() == 0
    }

    #[must_use]
    pub(crate) fn height(&self) -> usize {
        // SAFETY: head is always a live node while this list has any `Accessor`.
        unsafe { self.head_ptr().as_ref() }.height()
    }

    /// The raw level-0 successor of the head, unfiltered: per the "first() return after head
    /// replacement" design note, this may be a node whose predecessor (the old head) is itself
    /// marked for removal, but the node itself is still a legitimate candidate first element.
    #[must_use]
    pub(crate) fn first(&self) -> Option<NonNull<Node<T>>> {
        // SAFETY: see `head_ptr`.
        unsafe { self.head_ptr().as_ref() }.skip(0)
    }

    #[must_use]
    pub(crate) fn last(&self) -> Option<NonNull<Node<T>>> {
        let head = self.head_ptr();
        // SAFETY: see `head_ptr`.
        let mut level = unsafe { head.as_ref() }.max_layer();
        let mut cur = head;
        loop {
            // SAFETY: `cur` is either the head or a node reachable from it, both live.
            let next = unsafe { cur.as_ref() }.skip(level);
            match next {
                Some(node) => cur = node,
                None if level == 0 => break,
                None => level -= 1,
            }
        }
        (cur != head).then_some(cur)
    }
}

impl<T: Default, C: Comparator<T>, A: NodeAllocator> SkipListCore<T, C, A> {
    #[must_use]
    pub(crate) fn less(&self, a: &T, b: &T) -> bool {
        self.comparator.less(a, b)
    }

    /// Down-then-right search from the head, recording predecessors and successors at every level.
    fn probe(&self, key: &T) -> Probe<T> {
        let head = self.head_ptr();
        // SAFETY: see `head_ptr`.
        let height = unsafe { head.as_ref() }.height();
        self.probe_from(height, head, key)
    }

    /// Down-then-right search starting at `start` (itself a node at level `start_height - 1`),
    /// rather than always starting at the head. Used by [`Skipper`](crate::iter::Skipper) to reseek
    /// from a cached position instead of the head on every call.
    ///
    /// Levels `>= start_height` in the returned [`Probe`] are left as `None`; the caller is
    /// expected to already hold valid predecessors/successors for those from an earlier probe.
    pub(crate) fn probe_from(
        &self,
        start_height: usize,
        start:        NonNull<Node<T>>,
        key:          &T,
    ) -> Probe<T> {
        let mut preds = [None; MAX_HEIGHT];
        let mut succs = [None; MAX_HEIGHT];
        let mut found_layer = None;
        let mut cur = start;

        for level in (0..start_height).rev() {
            // SAFETY: `cur` is either the head or a node reached from it at a level it has,
            // invariant 2 of the data model; both are live nodes.
            let mut right = unsafe { cur.as_ref() }.skip(level);
            while let Some(r) = right {
                // SAFETY: `r` was just read as a live forward pointer from a live node.
                let r_ref = unsafe { r.as_ref() };
                if self.comparator.less(r_ref.value(), key) {
                    cur = r;
                    right = r_ref.skip(level);
                } else {
                    break;
                }
            }
            preds[level] = Some(cur);
            succs[level] = right;

            if found_layer.is_none() {
                if let Some(r) = right {
                    // SAFETY: see above.
                    let r_value = unsafe { r.as_ref() }.value();
                    if !self.comparator.less(r_value, key) && !self.comparator.less(key, r_value) {
                        found_layer = Some(level);
                    }
                }
            }
        }

        Probe { preds, succs, height: start_height, found_layer }
    }

    /// Lock-free. Returns the node with key equal to `key` that isn't marked for removal, if any.
    #[must_use]
    pub(crate) fn find(&self, key: &T) -> Option<NonNull<Node<T>>> {
        let probe = self.probe(key);
        let node = probe.succs[probe.found_layer?]?;
        // SAFETY: reachable node found above, hence live.
        (!unsafe { node.as_ref() }.marked_for_removal()).then_some(node)
    }

    /// Lock-free. Returns the first unmarked node whose value is not less than `key`.
    #[must_use]
    pub(crate) fn lower_bound(&self, key: &T) -> Option<NonNull<Node<T>>> {
        let probe = self.probe(key);
        let mut cur = probe.succs[0];
        while let Some(node) = cur {
            // SAFETY: reachable node, hence live.
            let node_ref = unsafe { node.as_ref() };
            if node_ref.marked_for_removal() {
                cur = node_ref.skip(0);
            } else {
                break;
            }
        }
        cur
    }

    /// Inserts `value` if no equal element exists; otherwise returns the pre-existing node.
    ///
    /// Returns `(node, new_size)` where `new_size` is `0` if `value` was already present, matching
    /// §4.E: "`inserted` is the new size (non-zero) if added, 0 if already present."
    pub(crate) fn insert(&self, value: T) -> Result<(NonNull<Node<T>>, usize), AllocError> {
        loop {
            let probe = self.probe(&value);

            if let Some(layer) = probe.found_layer {
                // SAFETY: `found_layer` is only set when `succs[layer]` is `Some`.
                let existing = probe.succs[layer].unwrap();
                // SAFETY: reachable node, hence live.
                let existing_ref = unsafe { existing.as_ref() };

                if existing_ref.marked_for_removal() {
                    // A concurrent remove is in flight for this key; restart once it's done.
                    crate::maybe_loom::spin_loop_hint();
                    continue;
                }

                // Bounded spin: a concurrent insert of the same key is still being linked.
                while !existing_ref.fully_linked() {
                    crate::maybe_loom::spin_loop_hint();
                }
                return Ok((existing, 0));
            }

            let new_height = self.oracle.draw_height(probe.height);

            let mut guards = Vec::with_capacity(new_height);
            let mut last_locked: Option<NonNull<Node<T>>> = None;
            let mut valid = true;

            for level in 0..new_height {
                // SAFETY: `level < probe.height`, and `preds` is filled for every such level.
                let pred = probe.preds[level].unwrap();
                if last_locked != Some(pred) {
                    // SAFETY: `pred` is a live node (head or reachable).
                    guards.push(unsafe { pred.as_ref() }.acquire_guard());
                    last_locked = Some(pred);
                }
                // SAFETY: see above.
                let pred_ref = unsafe { pred.as_ref() };
                let succ_unchanged = pred_ref.skip(level) == probe.succs[level];
                // SAFETY: any live `succs[level]` is a reachable node.
                let succ_live = probe.succs[level]
                    .is_none_or(|s| !unsafe { s.as_ref() }.marked_for_removal());

                if pred_ref.marked_for_removal() || !succ_unchanged || !succ_live {
                    valid = false;
                    break;
                }
            }

            if !valid {
                drop(guards);
                continue;
            }

            let new_node = match Node::create(self.alloc(), new_height, value, false) {
                Ok(node) => node,
                Err(err) => {
                    drop(guards);
                    return Err(err);
                },
            };

            for level in 0..new_height {
                // SAFETY: `new_node` was just allocated by this list's allocator, as was every
                // node reachable in `probe.succs[level]`.
                unsafe { new_node.as_ref().set_skip(level, probe.succs[level]) };
                // SAFETY: `preds[level]` and `new_node` belong to the same list/allocator.
                unsafe { probe.preds[level].unwrap().as_ref().set_skip(level, Some(new_node)) };
            }
            // SAFETY: `new_node` is reachable at level 0 at this point (and possibly higher
            // levels); publishing `fully_linked` now is what lets readers trust it.
            unsafe { new_node.as_ref() }.set_fully_linked();
            drop(guards);

            let new_size = self.size.fetch_add(1, Ordering::Relaxed) + 1;

            let cur_height = self.height();
            if cur_height < MAX_HEIGHT && new_size > height_oracle::size_limit(cur_height) {
                self.grow_height(cur_height + 1);
            }

            return Ok((new_node, new_size));
        }
    }

    /// Logically removes, then physically unlinks and recycles, an element equal to `key`.
    ///
    /// Returns `false` if no equal live element exists, or if a concurrent remover won the race to
    /// mark it first.
    pub(crate) fn remove(&self, key: &T) -> bool {
        let probe = self.probe(key);
        let Some(layer) = probe.found_layer else { return false };
        // SAFETY: `found_layer` is only set when `succs[layer]` is `Some`.
        let node = probe.succs[layer].unwrap();
        // SAFETY: reachable node, hence live.
        let node_ref = unsafe { node.as_ref() };

        {
            let _guard = node_ref.acquire_guard();
            if node_ref.marked_for_removal() {
                return false;
            }
            node_ref.set_marked_for_removal();
        }
        let node_height = node_ref.height();

        loop {
            let probe = self.probe(key);

            let mut guards = Vec::with_capacity(node_height);
            let mut last_locked: Option<NonNull<Node<T>>> = None;
            let mut valid = true;

            for level in 0..node_height {
                // SAFETY: `node` is still linked at every level below `node_height` until this
                // loop physically unlinks it, so the search above still finds a predecessor there.
                let pred = probe.preds[level].unwrap();
                if last_locked != Some(pred) {
                    // SAFETY: `pred` is a live node.
                    guards.push(unsafe { pred.as_ref() }.acquire_guard());
                    last_locked = Some(pred);
                }
                // SAFETY: see above.
                let pred_ref = unsafe { pred.as_ref() };
                if pred_ref.skip(level) != Some(node) {
                    valid = false;
                    break;
                }
            }

            if !valid {
                drop(guards);
                continue;
            }

            for level in (0..node_height).rev() {
                let pred = probe.preds[level].unwrap();
                let next = node_ref.skip(level);
                // SAFETY: `pred` and `node` belong to the same list, as does whatever `next` is.
                unsafe { pred.as_ref().set_skip(level, next) };
            }
            drop(guards);
            break;
        }

        self.size.fetch_sub(1, Ordering::Relaxed);
        // SAFETY: `node` was just unlinked at every level `< node_height == node.height()`, so it
        // is unreachable from any other node's forward pointers; it has not been handed to `add`
        // before (only one thread can win the `set_marked_for_removal` race above).
        unsafe { self.recycler.add(node) };
        true
    }

    /// Grows the head to `new_height`, unless another writer already did so first.
    fn grow_height(&self, new_height: usize) {
        let new_height = new_height.min(MAX_HEIGHT);
        let old_head = self.head_ptr();
        // SAFETY: see `head_ptr`.
        let old_ref = unsafe { old_head.as_ref() };

        if old_ref.height() >= new_height {
            return;
        }

        let Ok(new_head) = Node::create(self.alloc(), new_height, T::default(), true) else {
            // Failing to grow is non-fatal: the list just keeps its current height.
            return;
        };

        let _old_guard = old_ref.acquire_guard();
        // SAFETY: `new_head` has height `new_height >= old_ref.height()`, and is not yet reachable
        // from any reader (not yet published to `self.head`).
        unsafe { new_head.as_ref().copy_head(old_ref) };

        match self.head.compare_exchange(
            old_head.as_ptr(),
            new_head.as_ptr(),
            Ordering::Release,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                old_ref.set_marked_for_removal();
                // SAFETY: `old_head` is no longer reachable as `self.head`; any reader still
                // holding a pointer to it reaches the rest of the list via its own forward
                // pointers (copied into `new_head`), consistent with its role as a plain retired
                // node from here on.
                unsafe { self.recycler.add(old_head) };
                debug!(new_height, "grew skip list height");
            },
            Err(_) => {
                // SAFETY: `new_head` was never published, so nothing else can reference it.
                unsafe { Node::destroy(self.alloc(), new_head) };
            },
        }
    }
}

impl<T, C, A: NodeAllocator> Drop for SkipListCore<T, C, A> {
    fn drop(&mut self) {
        if A::TRIVIAL_DEALLOCATE {
            return;
        }

        // SAFETY: `&mut self` proves no other reference to this list exists, so a relaxed load
        // of `head` cannot race with anything.
        let head = unsafe { NonNull::new_unchecked(self.head.load(Ordering::Relaxed)) };
        // SAFETY: see above; nothing else can be traversing the list concurrently.
        let mut cur = unsafe { head.as_ref() }.skip(0);
        while let Some(node) = cur {
            // SAFETY: see above.
            let next = unsafe { node.as_ref() }.skip(0);
            // SAFETY: `node` is only reachable from this list, which is being torn down.
            unsafe { Node::destroy(self.alloc(), node) };
            cur = next;
        }
        // SAFETY: same reasoning as for the other nodes.
        unsafe { Node::destroy(self.alloc(), head) };
    }
}
