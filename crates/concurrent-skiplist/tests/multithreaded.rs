#![allow(unused_crate_dependencies, reason = "these are tests, not the main crate")]

//! Seeded, multithreaded reader/writer harnesses exercising the concurrency guarantees from
//! the design notes: disjoint writers never lose an insert, a logical removal race has exactly
//! one winner, and a quiescent traversal is always strictly sorted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use oorandom::Rand32;

use concurrent_skiplist::Accessor;

/// T writers x K keys, each writer owning a disjoint range: the union of successful inserts
/// (every insert here is expected to succeed, since the ranges never overlap) must equal the
/// final `size()`, and a post-join traversal must be the sorted concatenation of every range.
#[test]
fn disjoint_writers_each_land_all_their_keys() {
    const WRITERS: i32 = 8;
    const KEYS_PER_WRITER: i32 = 2_000;

    let list = Accessor::<i32>::new(1).unwrap();

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let list = list.clone();
            thread::spawn(move || {
                let base = writer * KEYS_PER_WRITER;
                for offset in 0..KEYS_PER_WRITER {
                    assert!(list.insert(base + offset).unwrap());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let expected_total = (WRITERS * KEYS_PER_WRITER) as usize;
    assert_eq!(list.size(), expected_total);

    let got: Vec<i32> = list.iter().copied().collect();
    let mut expected: Vec<i32> = (0..WRITERS * KEYS_PER_WRITER).collect();
    expected.sort_unstable();
    assert_eq!(got, expected);
}

/// Two threads racing to `erase` the same key: exactly one of them can be the one to win, since
/// `remove` marks the node for removal under its own lock before ever unlinking it.
#[test]
fn concurrent_erase_of_the_same_key_has_exactly_one_winner() {
    for _ in 0..200 {
        let list = Accessor::<i32>::new(1).unwrap();
        list.insert(1).unwrap();
        list.insert(2).unwrap();
        list.insert(3).unwrap();

        let a = list.clone();
        let b = list.clone();
        let winner_a = thread::spawn(move || a.erase(&3));
        let winner_b = thread::spawn(move || b.erase(&3));

        let a_won = winner_a.join().unwrap();
        let b_won = winner_b.join().unwrap();

        assert_ne!(a_won, b_won, "exactly one racer should have removed the element");
        assert_eq!(list.find(&3), None);
        assert_eq!(list.size(), 2);
    }
}

/// `pop_back` called concurrently from two threads on a three-element list: every element that
/// disappears was removed by exactly one caller, and the list ends up empty.
#[test]
fn concurrent_pop_back_never_double_removes() {
    let list = Accessor::<i32>::new(1).unwrap();
    for x in [1, 2, 3] {
        list.insert(x).unwrap();
    }

    let a = list.clone();
    let b = list.clone();
    let t1 = thread::spawn(move || (0..2).filter(|_| a.pop_back()).count());
    let t2 = thread::spawn(move || (0..2).filter(|_| b.pop_back()).count());

    let removed_by_a = t1.join().unwrap();
    let removed_by_b = t2.join().unwrap();

    assert_eq!(removed_by_a + removed_by_b, 3);
    assert!(list.empty());
}

/// An 8-writer shuffled insert of a contiguous range, with a join acting as the quiescent
/// barrier: afterward, a fresh traversal must be exactly the sorted range, per the spec's
/// "concurrent 8-writer shuffle" scenario (scaled down from `1..100_000` for test runtime).
#[test]
fn shuffled_concurrent_insert_recovers_sorted_range() {
    const N: i32 = 20_000;
    const WRITERS: usize = 8;

    let mut keys: Vec<i32> = (0..N).collect();
    shuffle(&mut keys, 0xC0FFEE);

    let list = Accessor::<i32>::new(1).unwrap();
    let chunks: Vec<Vec<i32>> = keys
        .chunks(keys.len().div_ceil(WRITERS))
        .map(<[i32]>::to_vec)
        .collect();

    let handles: Vec<_> = chunks
        .into_iter()
        .map(|chunk| {
            let list = list.clone();
            thread::spawn(move || {
                for key in chunk {
                    list.insert(key).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let got: Vec<i32> = list.iter().copied().collect();
    let expected: Vec<i32> = (0..N).collect();
    assert_eq!(got, expected);
    assert_eq!(list.size(), N as usize);
}

/// Heavier variant of the above, matching the spec's literal `1..100_000` scenario; left
/// `#[ignore]`d by default since it takes noticeably longer than the rest of the suite.
#[test]
#[ignore = "exercises the full 100_000-key scenario from the spec; slow"]
fn shuffled_concurrent_insert_of_one_hundred_thousand() {
    const N: i32 = 100_000;
    const WRITERS: usize = 8;

    let mut keys: Vec<i32> = (0..N).collect();
    shuffle(&mut keys, 0xFACADE);

    let list = Accessor::<i32>::new(1).unwrap();
    let chunks: Vec<Vec<i32>> = keys
        .chunks(keys.len().div_ceil(WRITERS))
        .map(<[i32]>::to_vec)
        .collect();

    let handles: Vec<_> = chunks
        .into_iter()
        .map(|chunk| {
            let list = list.clone();
            thread::spawn(move || {
                for key in chunk {
                    list.insert(key).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let got: Vec<i32> = list.iter().copied().collect();
    let expected: Vec<i32> = (0..N).collect();
    assert_eq!(got, expected);
}

/// A reader thread runs concurrently with several writer/remover threads; the only invariant a
/// reader can check mid-flight (without a quiescent barrier) is that whatever it sees is always
/// strictly sorted, per invariant 1 of the data model.
#[test]
fn reader_never_observes_an_unsorted_traversal_during_concurrent_writes() {
    let list = Accessor::<i32>::new(1).unwrap();
    let continue_running = Arc::new(AtomicBool::new(true));

    let reader_list = list.clone();
    let reader_flag = Arc::clone(&continue_running);
    let reader = thread::spawn(move || {
        let mut prng = Rand32::new(7);
        while reader_flag.load(Ordering::Relaxed) {
            let got: Vec<i32> = reader_list.iter().copied().collect();
            assert!(got.windows(2).all(|pair| pair[0] < pair[1]));
            // Spend a variable amount of time between reads to vary interleavings.
            for _ in 0..(prng.rand_u32() % 64) {
                std::hint::spin_loop();
            }
        }
    });

    let writer_handles: Vec<_> = (0..4)
        .map(|writer| {
            let list = list.clone();
            thread::spawn(move || {
                let mut prng = Rand32::new(u64::from(writer) + 1);
                for _ in 0..5_000 {
                    let key = (prng.rand_u32() % 1_000) as i32;
                    if prng.rand_u32() % 2 == 0 {
                        list.insert(key).unwrap();
                    } else {
                        list.erase(&key);
                    }
                }
            })
        })
        .collect();

    for handle in writer_handles {
        handle.join().unwrap();
    }
    continue_running.store(false, Ordering::Relaxed);
    reader.join().unwrap();
}

/// Fisher-Yates, using `oorandom` so the shuffle is reproducible across runs.
fn shuffle(values: &mut [i32], seed: u64) {
    let mut prng = Rand32::new(seed);
    for i in (1..values.len()).rev() {
        let j = prng.rand_range(0..(i as u32 + 1)) as usize;
        values.swap(i, j);
    }
}
