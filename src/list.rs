//! Lock-free ordered set: a Harris-Michael singly-linked list whose
//! successor slots are `(mark, ptr, tag)` words CAS'd as a unit.
//!
//! A node is logically deleted by setting the mark in its *own* successor
//! slot and physically unlinked by a CAS on its predecessor's slot. Every
//! traversal helps: a searcher that observes a marked node unlinks it
//! before moving on, so a stalled remover never blocks the rest.

use std::cmp::Ordering::{Equal, Greater, Less};

use crossbeam_epoch::Guard;
use crossbeam_utils::CachePadded;

use crate::set::ConcurrentSet;
use crate::tagged::{AtomicMarkPtrTag, MarkPtrTag};

struct Node<K> {
    key: K,
    next: AtomicMarkPtrTag<Node<K>>,
}

pub struct LockFreeSet<K> {
    // A successor slot, not a sentinel node. Its mark is never set.
    head: CachePadded<AtomicMarkPtrTag<Node<K>>>,
}

unsafe impl<K: Send> Send for LockFreeSet<K> {}
unsafe impl<K: Send + Sync> Sync for LockFreeSet<K> {}

/// Search window: the slot to CAS plus the snapshots that justify it.
///
/// `prev` is the address of the successor slot that points at the first
/// node with key >= the search key (or at null), `prev_view` the value of
/// that slot the search validated, `next_view` that node's own successor
/// snapshot. On a key match, `prev_view.ptr` is the matching node.
struct Cursor<'g, K> {
    prev: &'g AtomicMarkPtrTag<Node<K>>,
    prev_view: MarkPtrTag<Node<K>>,
    next_view: MarkPtrTag<Node<K>>,
}

impl<K> Default for LockFreeSet<K>
where
    K: Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> LockFreeSet<K>
where
    K: Ord,
{
    pub fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicMarkPtrTag::null()),
        }
    }

    /// One traversal attempt. `Err(())` means a validation or helping CAS
    /// lost a race and the caller must restart from the head.
    #[inline]
    fn find_inner<'g>(&'g self, key: &K, guard: &'g Guard) -> Result<(bool, Cursor<'g, K>), ()> {
        let mut cursor = Cursor {
            prev: &*self.head,
            prev_view: self.head.load(),
            next_view: MarkPtrTag::null(),
        };

        loop {
            // `prev_view` is either the head or a live node's successor; a
            // marked view can never be advanced into.
            debug_assert!(!cursor.prev_view.mark());

            let cur_ptr = cursor.prev_view.ptr();
            let cur = match unsafe { cur_ptr.as_ref() } {
                None => return Ok((false, cursor)),
                Some(c) => c,
            };
            cursor.next_view = cur.next.load();

            // `prev` must still be an unmarked link to `cur` with the tag we
            // saw; otherwise `cur` was unlinked (or the slot re-CAS'd) after
            // `prev_view` was taken and both snapshots are useless.
            if cursor.prev.load() != MarkPtrTag::new(false, cur_ptr, cursor.prev_view.tag()) {
                return Err(());
            }

            if !cursor.next_view.mark() {
                match cur.key.cmp(key) {
                    Less => cursor.prev = &cur.next,
                    Equal => return Ok((true, cursor)),
                    Greater => return Ok((false, cursor)),
                }
            } else {
                // `cur` is logically deleted: unlink it on behalf of the
                // remover. Exactly one CAS wins, so the winner is the sole
                // retirer of the node.
                let expected = MarkPtrTag::new(false, cur_ptr, cursor.prev_view.tag());
                let desired = MarkPtrTag::new(
                    false,
                    cursor.next_view.ptr(),
                    cursor.prev_view.tag().wrapping_add(1),
                );
                if cursor.prev.compare_exchange(expected, desired).is_err() {
                    return Err(());
                }
                unsafe { guard.defer_unchecked(move || drop(Box::from_raw(cur_ptr))) };
                // A winning CAS fixes the slot contents; reconstruct the
                // view instead of reloading, and retry the same slot.
                cursor.next_view = desired;
            }
            cursor.prev_view = cursor.next_view;
        }
    }

    fn find<'g>(&'g self, key: &K, guard: &'g Guard) -> (bool, Cursor<'g, K>) {
        loop {
            if let Ok(r) = self.find_inner(key, guard) {
                return r;
            }
        }
    }

    pub fn insert(&self, key: K, guard: &Guard) -> bool {
        let node = Box::into_raw(Box::new(Node {
            key,
            next: AtomicMarkPtrTag::null(),
        }));

        loop {
            let (found, cursor) = self.find(unsafe { &(*node).key }, guard);
            if found {
                // Never published; this thread still owns it.
                drop(unsafe { Box::from_raw(node) });
                return false;
            }

            unsafe { &*node }
                .next
                .store(MarkPtrTag::new(false, cursor.prev_view.ptr(), 0));

            let expected = MarkPtrTag::new(false, cursor.prev_view.ptr(), cursor.prev_view.tag());
            let desired = MarkPtrTag::new(false, node, cursor.prev_view.tag().wrapping_add(1));
            if cursor.prev.compare_exchange(expected, desired).is_ok() {
                return true;
            }
        }
    }

    pub fn remove(&self, key: &K, guard: &Guard) -> bool {
        loop {
            let (found, cursor) = self.find(key, guard);
            if !found {
                return false;
            }

            let cur_ptr = cursor.prev_view.ptr();
            let cur = unsafe { &*cur_ptr };
            let next_ptr = cursor.next_view.ptr();

            // Logical delete: mark `cur`'s own successor. This CAS decides
            // the return value; everything after only tidies the chain.
            let expected = MarkPtrTag::new(false, next_ptr, cursor.next_view.tag());
            let desired = MarkPtrTag::new(true, next_ptr, cursor.next_view.tag().wrapping_add(1));
            if cur.next.compare_exchange(expected, desired).is_err() {
                continue;
            }

            // Physical unlink. On failure the marked node is left for the
            // helping rule: one extra search completes the unlink (or finds
            // it already done), and its outcome is irrelevant here.
            let expected = MarkPtrTag::new(false, cur_ptr, cursor.prev_view.tag());
            let desired = MarkPtrTag::new(false, next_ptr, cursor.prev_view.tag().wrapping_add(1));
            if cursor.prev.compare_exchange(expected, desired).is_ok() {
                unsafe { guard.defer_unchecked(move || drop(Box::from_raw(cur_ptr))) };
            } else {
                let _ = self.find(key, guard);
            }
            return true;
        }
    }

    pub fn has(&self, key: &K, guard: &Guard) -> bool {
        self.find(key, guard).0
    }

    /// Chain keys in order; exclusive access means quiescence.
    pub fn keys(&mut self) -> Vec<K>
    where
        K: Clone,
    {
        let mut out = Vec::new();
        let mut cur = self.head.load().ptr();
        while let Some(node) = unsafe { cur.as_ref() } {
            let next = node.next.load();
            // Every remover's final search unlinks its marked node, so none
            // survive to a quiescent point.
            debug_assert!(!next.mark());
            out.push(node.key.clone());
            cur = next.ptr();
        }
        out
    }
}

impl<K> Drop for LockFreeSet<K> {
    fn drop(&mut self) {
        let mut cur = self.head.load().ptr();
        while !cur.is_null() {
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next.load().ptr();
        }
    }
}

impl<K> ConcurrentSet<K> for LockFreeSet<K>
where
    K: Ord,
{
    fn new() -> Self {
        Self::new()
    }

    #[inline]
    fn insert(&self, key: K, guard: &Guard) -> bool {
        self.insert(key, guard)
    }

    #[inline]
    fn remove(&self, key: &K, guard: &Guard) -> bool {
        self.remove(key, guard)
    }

    #[inline]
    fn has(&self, key: &K, guard: &Guard) -> bool {
        self.has(key, guard)
    }

    fn keys(&mut self) -> Vec<K>
    where
        K: Clone,
    {
        self.keys()
    }
}
