//! Workload benchmark for the set implementations.
//!
//! Per repetition: every worker pre-generates its key and op-tag streams,
//! parks at a barrier, then spins on a start flag. The coordinator flips
//! the flag after a warmup delay and stamps the clock; elapsed time is
//! stamped again after the last join. The reported time per cell is the
//! trimmed mean (min and max dropped) over the repetitions.

use crossbeam_utils::thread::scope;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Barrier};
use std::time::Instant;

use lfset_benchmark::config::{self, Config, OpCounts, SetImpl};
use lfset_benchmark::{tagged, ConcurrentSet, LockFreeSet, MutexSet, RwLockSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Insert,
    Delete,
    Search,
}

/// One thread's pre-generated workload for one repetition.
struct OpStream {
    inserts: Vec<usize>,
    deletes: Vec<usize>,
    searches: Vec<usize>,
    tags: Vec<OpKind>,
}

impl OpStream {
    fn generate(config: &Config, thread: usize, rep: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(
            config
                .seed
                .wrapping_add((rep as u64) << 32)
                .wrapping_add(thread as u64),
        );
        let dist = Uniform::from(0..config.key_range);
        let mut draw = |count: usize| {
            let mut keys: Vec<usize> = (0..count).map(|_| dist.sample(&mut rng)).collect();
            keys.shuffle(&mut rng);
            keys
        };
        let inserts = draw(config.inserts);
        let deletes = draw(config.deletes);
        let searches = draw(config.searches);

        let mut tags = Vec::with_capacity(config.ops_per_thread());
        tags.extend(std::iter::repeat(OpKind::Insert).take(config.inserts));
        tags.extend(std::iter::repeat(OpKind::Delete).take(config.deletes));
        tags.extend(std::iter::repeat(OpKind::Search).take(config.searches));
        tags.shuffle(&mut rng);

        OpStream {
            inserts,
            deletes,
            searches,
            tags,
        }
    }
}

fn main() {
    let (config, output) = config::setup();
    println!("{}", config);
    println!("128-bit mark/ptr/tag CAS is lock-free: {}", tagged::is_lock_free());

    let (counts, elapsed_ns) = match config.set_impl {
        SetImpl::LockFree => bench::<LockFreeSet<usize>>(&config),
        SetImpl::Mutex => bench::<MutexSet<usize>>(&config),
        SetImpl::Rwlock => bench::<RwLockSet<usize>>(&config),
    };

    println!("{}, elapsed {} ns", counts, elapsed_ns);
    output.write_record(&config, &counts, elapsed_ns);
}

fn bench<S: ConcurrentSet<usize> + Send + Sync>(config: &Config) -> (OpCounts, u128) {
    let mut totals = OpCounts::default();
    let mut elapsed = Vec::with_capacity(config.reps);
    for rep in 0..config.reps {
        let (counts, ns) = run_once::<S>(config, rep);
        totals.merge(&counts);
        elapsed.push(ns);
    }
    (totals, trimmed_mean(&mut elapsed))
}

fn run_once<S: ConcurrentSet<usize> + Send + Sync>(config: &Config, rep: usize) -> (OpCounts, u128) {
    // Fresh set per repetition: every run starts from empty.
    let set = &S::new();
    let barrier = &Barrier::new(config.threads + 1);
    let start_flag = &AtomicBool::new(false);
    let (counts_sender, counts_receiver) = mpsc::channel();

    let start = scope(|s| {
        for t in 0..config.threads {
            let counts_sender = counts_sender.clone();
            s.spawn(move |_| {
                let stream = OpStream::generate(config, t, rep);
                let mut counts = OpCounts::default();

                barrier.wait();
                while !start_flag.load(Ordering::Acquire) {
                    std::hint::spin_loop();
                }

                let mut guard = crossbeam_epoch::pin();
                let (mut ii, mut di, mut si) = (0, 0, 0);
                for (ops, tag) in stream.tags.iter().enumerate() {
                    match tag {
                        OpKind::Insert => {
                            let key = stream.inserts[ii];
                            ii += 1;
                            if set.insert(key, &guard) {
                                counts.insert_succ += 1;
                            } else {
                                counts.insert_fail += 1;
                            }
                        }
                        OpKind::Delete => {
                            let key = stream.deletes[di];
                            di += 1;
                            if set.remove(&key, &guard) {
                                counts.delete_succ += 1;
                            } else {
                                counts.delete_fail += 1;
                            }
                        }
                        OpKind::Search => {
                            let key = stream.searches[si];
                            si += 1;
                            if set.has(&key, &guard) {
                                counts.search_succ += 1;
                            } else {
                                counts.search_fail += 1;
                            }
                        }
                    }
                    if ops % 128 == 0 {
                        guard.repin();
                    }
                }
                drop(guard);

                counts_sender.send(counts).unwrap();
            });
        }

        // All streams are generated once every worker reaches the barrier;
        // only then does the measured window open.
        barrier.wait();
        std::thread::sleep(config.warmup);
        start_flag.store(true, Ordering::Release);
        Instant::now()
    })
    .unwrap();
    // `scope` joins every worker before returning, so this elapsed stamp
    // covers the full run.
    let elapsed_ns = start.elapsed().as_nanos();

    let mut counts = OpCounts::default();
    for _ in 0..config.threads {
        counts.merge(&counts_receiver.recv().unwrap());
    }
    (counts, elapsed_ns)
}

/// Mean with the minimum and maximum dropped.
fn trimmed_mean(samples: &mut [u128]) -> u128 {
    samples.sort_unstable();
    let trimmed = &samples[1..samples.len() - 1];
    trimmed.iter().sum::<u128>() / trimmed.len() as u128
}

#[cfg(test)]
mod tests {
    use super::trimmed_mean;

    #[test]
    fn trimmed_mean_drops_extremes() {
        assert_eq!(trimmed_mean(&mut [5, 1, 100]), 5);
        assert_eq!(trimmed_mean(&mut [9, 2, 4, 100, 8]), 7);
    }
}
