use crossbeam_epoch::Guard;

/// A concurrent set of totally ordered keys.
///
/// `insert` returns true iff the key was newly added, `remove` true iff the
/// key was present and is now gone, `has` true iff the key was present at
/// the operation's linearization point.
pub trait ConcurrentSet<K> {
    fn new() -> Self;
    fn insert(&self, key: K, guard: &Guard) -> bool;
    fn remove(&self, key: &K, guard: &Guard) -> bool;
    fn has(&self, key: &K, guard: &Guard) -> bool;

    /// Keys currently on the chain, in chain order. Takes `&mut self`: with
    /// exclusive access no operation is in flight, so the walk needs no
    /// synchronization. For validating quiescent state, not for iteration.
    fn keys(&mut self) -> Vec<K>
    where
        K: Clone;
}
