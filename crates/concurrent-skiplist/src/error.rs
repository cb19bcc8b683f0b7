use std::alloc::Layout;

use thiserror::Error;


/// The single fallible path in this crate: the system allocator declined to provide memory for
/// a new node or a new head sentinel.
///
/// Every other "failure" this crate can report (key not found, key already present, lost a race
/// with a concurrent writer) is an ordinary [`bool`] or [`Option`] return, not an error; see the
/// module-level documentation of [`crate::alloc`] for why allocation is singled out.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AllocError {
    /// The allocator returned a null pointer for the requested layout.
    #[error("allocation of {layout:?} failed")]
    OutOfMemory {
        /// The layout that could not be satisfied.
        layout: Layout,
    },
}
