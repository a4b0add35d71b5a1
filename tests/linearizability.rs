//! Linearizability check on short contended histories.
//!
//! Each operation is stamped with a begin and end tick from a shared
//! logical clock. A history is linearizable iff some total order of the
//! operations respects real time (an op that ended before another began
//! comes first) and replays correctly against sequential set semantics.
//! Histories are kept small enough for the exhaustive search.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_epoch::pin;
use crossbeam_utils::thread::scope;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lfset_benchmark::{ConcurrentSet, LockFreeSet, MutexSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Insert,
    Remove,
    Has,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    kind: Kind,
    key: usize,
    result: bool,
    begin: u64,
    end: u64,
}

const THREADS: usize = 3;
const OPS_PER_THREAD: usize = 6;
const KEYS: usize = 3;
const ROUNDS: u64 = 30;

fn record_history<S>(seed: u64) -> Vec<Event>
where
    S: ConcurrentSet<usize> + Send + Sync,
{
    let set = &S::new();
    let clock = &AtomicU64::new(0);

    scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                s.spawn(move |_| {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_mul(31).wrapping_add(t as u64));
                    let mut events = Vec::with_capacity(OPS_PER_THREAD);
                    for _ in 0..OPS_PER_THREAD {
                        let kind = match rng.gen_range(0..3) {
                            0 => Kind::Insert,
                            1 => Kind::Remove,
                            _ => Kind::Has,
                        };
                        let key = rng.gen_range(0..KEYS);
                        let begin = clock.fetch_add(1, Ordering::SeqCst);
                        let result = match kind {
                            Kind::Insert => set.insert(key, &pin()),
                            Kind::Remove => set.remove(&key, &pin()),
                            Kind::Has => set.has(&key, &pin()),
                        };
                        let end = clock.fetch_add(1, Ordering::SeqCst);
                        events.push(Event {
                            kind,
                            key,
                            result,
                            begin,
                            end,
                        });
                    }
                    events
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    })
    .unwrap()
}

/// Exhaustive witness search. The present-key set is a function of which
/// ops have been applied (their results are fixed), so memoizing on the
/// applied-op mask alone is sound.
fn linearizable(history: &[Event]) -> bool {
    assert!(history.len() < 32);

    fn dfs(history: &[Event], done: u32, present: u64, memo: &mut HashSet<u32>) -> bool {
        let n = history.len();
        if done == (1u32 << n) - 1 {
            return true;
        }
        if !memo.insert(done) {
            return false;
        }

        let min_pending_end = history
            .iter()
            .enumerate()
            .filter(|(i, _)| done & (1 << i) == 0)
            .map(|(_, e)| e.end)
            .min()
            .unwrap();

        for i in 0..n {
            if done & (1 << i) != 0 {
                continue;
            }
            let e = &history[i];
            // Some still-pending op finished before this one began, so this
            // one cannot linearize next.
            if e.begin > min_pending_end {
                continue;
            }

            let bit = 1u64 << e.key;
            let was_present = present & bit != 0;
            let (expected, next_present) = match e.kind {
                Kind::Insert => (!was_present, if e.result { present | bit } else { present }),
                Kind::Remove => (was_present, if e.result { present & !bit } else { present }),
                Kind::Has => (was_present, present),
            };
            if e.result != expected {
                continue;
            }
            if dfs(history, done | (1 << i), next_present, memo) {
                return true;
            }
        }
        false
    }

    dfs(history, 0, 0, &mut HashSet::new())
}

#[test]
fn checker_rejects_stale_read() {
    // has(0) observed true strictly after remove(0) succeeded: no
    // serialization explains it.
    let history = [
        Event {
            kind: Kind::Insert,
            key: 0,
            result: true,
            begin: 0,
            end: 1,
        },
        Event {
            kind: Kind::Remove,
            key: 0,
            result: true,
            begin: 2,
            end: 3,
        },
        Event {
            kind: Kind::Has,
            key: 0,
            result: true,
            begin: 4,
            end: 5,
        },
    ];
    assert!(!linearizable(&history));
}

#[test]
fn checker_accepts_overlapping_ops() {
    // The overlapping insert and has admit either order; has = false is
    // explained by linearizing it first.
    let history = [
        Event {
            kind: Kind::Insert,
            key: 0,
            result: true,
            begin: 0,
            end: 3,
        },
        Event {
            kind: Kind::Has,
            key: 0,
            result: false,
            begin: 1,
            end: 2,
        },
    ];
    assert!(linearizable(&history));
}

#[test]
fn lock_free_histories_are_linearizable() {
    for round in 0..ROUNDS {
        let history = record_history::<LockFreeSet<usize>>(round);
        assert!(
            linearizable(&history),
            "non-linearizable history in round {}: {:?}",
            round,
            history
        );
    }
}

#[test]
fn mutex_histories_are_linearizable() {
    for round in 0..ROUNDS {
        let history = record_history::<MutexSet<usize>>(round);
        assert!(
            linearizable(&history),
            "non-linearizable history in round {}: {:?}",
            round,
            history
        );
    }
}
