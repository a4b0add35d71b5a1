//! Reference implementations: a plain ordered singly-linked list behind a
//! single lock. `MutexSet` takes the lock exclusively for everything;
//! `RwLockSet` lets lookups share it. Correctness oracle and baseline for
//! the lock-free list.

use std::sync::{Mutex, RwLock};

use crossbeam_epoch::Guard;

use crate::set::ConcurrentSet;

struct Node<K> {
    key: K,
    next: Link<K>,
}

type Link<K> = Option<Box<Node<K>>>;

struct OrderedList<K> {
    head: Link<K>,
}

impl<K> OrderedList<K>
where
    K: Ord,
{
    fn new() -> Self {
        Self { head: None }
    }

    /// The link holding the first node with key >= `key`, or the tail link.
    fn find_link(&mut self, key: &K) -> &mut Link<K> {
        let mut link = &mut self.head;
        while link.as_ref().map_or(false, |node| node.key < *key) {
            link = &mut link.as_mut().unwrap().next;
        }
        link
    }

    fn insert(&mut self, key: K) -> bool {
        let link = self.find_link(&key);
        if link.as_ref().map_or(false, |node| node.key == key) {
            return false;
        }
        *link = Some(Box::new(Node {
            key,
            next: link.take(),
        }));
        true
    }

    fn remove(&mut self, key: &K) -> bool {
        let link = self.find_link(key);
        match link.take() {
            Some(node) if node.key == *key => {
                *link = node.next;
                true
            }
            other => {
                *link = other;
                false
            }
        }
    }

    fn has(&self, key: &K) -> bool {
        let mut cur = &self.head;
        while let Some(node) = cur {
            if node.key >= *key {
                return node.key == *key;
            }
            cur = &node.next;
        }
        false
    }

    fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut out = Vec::new();
        let mut cur = &self.head;
        while let Some(node) = cur {
            out.push(node.key.clone());
            cur = &node.next;
        }
        out
    }
}

// The derived drop would recurse once per node.
impl<K> Drop for OrderedList<K> {
    fn drop(&mut self) {
        let mut cur = self.head.take();
        while let Some(mut node) = cur {
            cur = node.next.take();
        }
    }
}

pub struct MutexSet<K> {
    inner: Mutex<OrderedList<K>>,
}

impl<K> ConcurrentSet<K> for MutexSet<K>
where
    K: Ord,
{
    fn new() -> Self {
        Self {
            inner: Mutex::new(OrderedList::new()),
        }
    }

    fn insert(&self, key: K, _: &Guard) -> bool {
        self.inner.lock().unwrap().insert(key)
    }

    fn remove(&self, key: &K, _: &Guard) -> bool {
        self.inner.lock().unwrap().remove(key)
    }

    fn has(&self, key: &K, _: &Guard) -> bool {
        self.inner.lock().unwrap().has(key)
    }

    fn keys(&mut self) -> Vec<K>
    where
        K: Clone,
    {
        self.inner.get_mut().unwrap().keys()
    }
}

pub struct RwLockSet<K> {
    inner: RwLock<OrderedList<K>>,
}

impl<K> ConcurrentSet<K> for RwLockSet<K>
where
    K: Ord,
{
    fn new() -> Self {
        Self {
            inner: RwLock::new(OrderedList::new()),
        }
    }

    fn insert(&self, key: K, _: &Guard) -> bool {
        self.inner.write().unwrap().insert(key)
    }

    fn remove(&self, key: &K, _: &Guard) -> bool {
        self.inner.write().unwrap().remove(key)
    }

    fn has(&self, key: &K, _: &Guard) -> bool {
        self.inner.read().unwrap().has(key)
    }

    fn keys(&mut self) -> Vec<K>
    where
        K: Clone,
    {
        self.inner.get_mut().unwrap().keys()
    }
}
