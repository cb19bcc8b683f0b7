#![expect(unsafe_code, reason = "hand-rolled mutex built directly on an atomic byte")]

//! A one-byte spin lock, used for fine-grained per-node locking in the skip list's write path.
//!
//! Zero-initialized memory is a valid, unlocked [`SpinLock`]; this lets a freshly allocated node
//! come out of the allocator already unlocked, with no explicit `init()` step, so long as the
//! allocator zeroes its memory (which every [`NodeAllocator`](crate::alloc::NodeAllocator) used by
//! this crate does).

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::maybe_loom::AtomicU8;

const FREE: u8 = 0;
const LOCKED: u8 = 1;

/// Number of active-spin iterations attempted before falling back to sleeping.
const MAX_ACTIVE_SPIN: u32 = 4000;
/// Sleep quantum once active spinning has been tried long enough.
const MIN_YIELDING_SLEEP: Duration = Duration::from_micros(500);

/// A tiny mutex: one atomic byte, acquire-release on lock, release on unlock.
///
/// Contended acquisition first spins for up to [`MAX_ACTIVE_SPIN`] iterations, then falls back to
/// sleeping in [`MIN_YIELDING_SLEEP`] increments. This is appropriate only for locks expected to be
/// held briefly (a handful of pointer writes), which is the only way node locks in this crate are
/// ever used.
#[derive(Debug, Default)]
pub(crate) struct SpinLock {
    state: AtomicU8,
}

impl SpinLock {
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self { state: AtomicU8::new(FREE) }
    }

    /// Attempts to acquire the lock without blocking.
    #[must_use]
    pub(crate) fn try_lock(&self) -> Option<SpinLockGuard<'_>> {
        let prev = self.state.swap(LOCKED, Ordering::AcqRel);
        (prev == FREE).then_some(SpinLockGuard { lock: self })
    }

    /// Acquires the lock, spinning then sleeping as necessary.
    #[must_use]
    pub(crate) fn lock(&self) -> SpinLockGuard<'_> {
        let mut spins: u32 = 0;
        while self.state.swap(LOCKED, Ordering::AcqRel) != FREE {
            loop {
                if spins < MAX_ACTIVE_SPIN {
                    spins += 1;
                    crate::maybe_loom::spin_loop_hint();
                } else {
                    crate::maybe_loom::yielding_sleep(MIN_YIELDING_SLEEP);
                }
                if self.state.load(Ordering::Relaxed) == FREE {
                    break;
                }
            }
        }
        SpinLockGuard { lock: self }
    }
}

/// An RAII guard releasing a [`SpinLock`] on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub(crate) struct SpinLockGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.state.store(FREE, Ordering::Release);
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::SpinLock;

    #[test]
    fn zeroed_state_is_unlocked() {
        let lock = SpinLock::new();
        let guard = lock.try_lock();
        assert!(guard.is_some());
    }

    #[test]
    fn contended_lock_blocks_until_released() {
        let lock = Arc::new(SpinLock::new());
        let guard = lock.lock();

        let lock2 = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            // Blocks until the main thread drops `guard`.
            let _guard = lock2.lock();
        });

        // Give the spawned thread a chance to start spinning before releasing.
        thread::yield_now();
        drop(guard);
        handle.join().unwrap();
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = SpinLock::new();
        let _guard = lock.lock();
        assert!(lock.try_lock().is_none());
    }
}
