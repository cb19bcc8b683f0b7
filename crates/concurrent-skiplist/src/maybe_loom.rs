#![expect(unexpected_cfgs, reason = "used for loom tests")]

//! Re-exports the atomic and synchronization primitives this crate relies on, swapped out for
//! `loom`'s instrumented equivalents when model-checking under `cfg(loom)`.

#[cfg(loom)]
pub(crate) use loom::sync::atomic::AtomicBool as AtomicBool;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::AtomicPtr as AtomicPtr;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::AtomicU8 as AtomicU8;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::AtomicUsize as AtomicUsize;
#[cfg(loom)]
pub(crate) use loom::sync::Arc as Arc;
#[cfg(loom)]
pub(crate) use loom::sync::Mutex as Mutex;
#[cfg(loom)]
pub(crate) use loom::sync::MutexGuard as MutexGuard;

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::AtomicBool as AtomicBool;
#[cfg(not(loom))]
pub(crate) use std::sync::atomic::AtomicPtr as AtomicPtr;
#[cfg(not(loom))]
pub(crate) use std::sync::atomic::AtomicU8 as AtomicU8;
#[cfg(not(loom))]
pub(crate) use std::sync::atomic::AtomicUsize as AtomicUsize;
#[cfg(not(loom))]
pub(crate) use std::sync::Arc as Arc;
#[cfg(not(loom))]
pub(crate) use std::sync::Mutex as Mutex;
#[cfg(not(loom))]
pub(crate) use std::sync::MutexGuard as MutexGuard;


/// A single active-spin pause, or a yield to the scheduler under `loom`.
///
/// Real spinning would make the model checker explore an unbounded number of interleavings for
/// no benefit, so under `loom` this just yields the simulated thread instead.
#[inline]
pub(crate) fn spin_loop_hint() {
    #[cfg(loom)]
    {
        loom::thread::yield_now();
    }
    #[cfg(not(loom))]
    {
        std::hint::spin_loop();
    }
}

/// Falls back to a real sleep outside of `loom`; under `loom`, yields instead, since sleeping
/// for a fixed duration has no meaning to the model checker and would just waste exploration time.
#[inline]
pub(crate) fn yielding_sleep(duration: std::time::Duration) {
    #[cfg(loom)]
    {
        let _ = duration;
        loom::thread::yield_now();
    }
    #[cfg(not(loom))]
    {
        std::thread::sleep(duration);
    }
}
