//! Random node heights and the size thresholds that trigger growing the list's height.
//!
//! Node heights follow a geometric distribution: a new node gets height 1, and each additional
//! level is half as likely as the last (`p = 0.5`), capped at [`MAX_HEIGHT`]. `size_limit` gives
//! the doubling schedule used to decide when the list has outgrown its current height.

use oorandom::Rand32;

use crate::maybe_loom::Mutex;

/// The default seed used by constructors that don't take an explicit one.
///
/// Figured I'd use the fun default seed at <https://en.wikipedia.org/wiki/Hexspeak>.
pub(crate) const DEFAULT_SEED: u64 = 0x_dead_beef;

/// The maximum height any node (including the head sentinel) in this crate's skip lists may have.
///
/// `MAX_HEIGHT` must stay in `[2, 64)`: at least 2 so that fixed-size `[Option<_>; MAX_HEIGHT]`
/// scratch arrays used during traversal are never degenerate, and under 64 so level indices fit
/// comfortably in a `u8` hint.
pub(crate) const MAX_HEIGHT: usize = 24;

/// A source of randomness for drawing node heights.
///
/// Implemented for [`Rand32`] so that each list can own an independently seeded generator rather
/// than drawing from one process-wide generator; see `new_seeded` on the public list types.
pub(crate) trait Prng32 {
    /// Produces a random `u32` in the range `[0, u32::MAX]`.
    #[must_use]
    fn rand_u32(&mut self) -> u32;
}

impl Prng32 for Rand32 {
    #[inline]
    fn rand_u32(&mut self) -> u32 {
        Self::rand_u32(self)
    }
}

/// Draws a random height in `1..=cap.min(MAX_HEIGHT)`, geometrically distributed with `p = 0.5`.
///
/// `cap` should be the height the list is observed to have at the time of the draw (`maxLayer + 1`
/// from the insertion probe), not `MAX_HEIGHT` directly: capping against the momentarily-observed
/// height, rather than the hard ceiling, keeps the list from jumping to a much taller height than
/// its current size warrants in one insertion.
pub(crate) fn random_height<P: Prng32>(prng: &mut P, cap: usize) -> usize {
    let cap = cap.clamp(1, MAX_HEIGHT);
    let mut height = 1;
    while height < cap && prng.rand_u32() % 2 == 0 {
        height += 1;
    }
    height
}

/// The size threshold past which a list at the given `height` becomes eligible to grow by one
/// more level.
///
/// Matches the `p = 0.5` height distribution with a doubling schedule: a list has roughly `2^h`
/// entries by the time it's expected to need height `h + 1`.
pub(crate) fn size_limit(height: usize) -> usize {
    1_usize.checked_shl(height.min(usize::BITS as usize - 1) as u32).unwrap_or(usize::MAX)
}

/// A list's source of random node heights.
///
/// The spec frames the oracle as a process-wide singleton; this crate instead gives each list its
/// own seeded [`Rand32`] behind a small [`Mutex`], so that distinct lists (and tests) don't share a
/// stream and contend with each other. See the "Global random state" design note for the
/// thread-local alternative this trades away in exchange for simplicity: the critical section here
/// is a single `rand_u32` loop, so contention is brief.
#[derive(Debug)]
pub(crate) struct HeightOracle {
    prng: Mutex<Rand32>,
}

impl HeightOracle {
    #[must_use]
    pub(crate) fn new(seed: u64) -> Self {
        Self { prng: Mutex::new(Rand32::new(seed)) }
    }

    /// Draws a new node height, capped at `cap` (see [`random_height`]).
    #[must_use]
    pub(crate) fn draw_height(&self, cap: usize) -> usize {
        let mut prng = self.prng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        random_height(&mut *prng, cap)
    }
}

#[cfg(test)]
mod tests {
    use super::{random_height, size_limit, HeightOracle, MAX_HEIGHT, Prng32};

    struct AlwaysGrow;

    impl Prng32 for AlwaysGrow {
        fn rand_u32(&mut self) -> u32 {
            0
        }
    }

    struct NeverGrow;

    impl Prng32 for NeverGrow {
        fn rand_u32(&mut self) -> u32 {
            1
        }
    }

    #[test]
    fn height_is_capped() {
        let mut prng = AlwaysGrow;
        assert_eq!(random_height(&mut prng, 5), 5);
        assert_eq!(random_height(&mut prng, MAX_HEIGHT + 10), MAX_HEIGHT);
    }

    #[test]
    fn height_is_at_least_one() {
        let mut prng = NeverGrow;
        assert_eq!(random_height(&mut prng, MAX_HEIGHT), 1);
    }

    #[test]
    fn size_limit_doubles() {
        assert_eq!(size_limit(1), 2);
        assert_eq!(size_limit(2), 4);
        assert_eq!(size_limit(3), 8);
    }

    #[test]
    fn oracle_heights_stay_in_bounds() {
        let oracle = HeightOracle::new(12345);
        for _ in 0..1000 {
            let height = oracle.draw_height(MAX_HEIGHT);
            assert!((1..=MAX_HEIGHT).contains(&height));
        }
    }

    #[test]
    fn oracle_is_deterministic_given_a_seed() {
        let a = HeightOracle::new(7);
        let b = HeightOracle::new(7);
        let drawn_a: Vec<usize> = (0..50).map(|_| a.draw_height(MAX_HEIGHT)).collect();
        let drawn_b: Vec<usize> = (0..50).map(|_| b.draw_height(MAX_HEIGHT)).collect();
        assert_eq!(drawn_a, drawn_b);
    }
}
