//! The `(mark, ptr, tag)` successor word and its atomic container.
//!
//! The triple is packed into a single `u128` so that mark, pointer and tag
//! change together in one compare-exchange: the low 64 bits hold the
//! pointer, the high 64 bits hold `(tag << 1) | mark`. The tag is a modular
//! 63-bit counter bumped on every successful CAS of the slot.

use core::fmt;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::Ordering;

use portable_atomic::AtomicU128;

/// A decoded successor word: deletion mark, successor pointer, ABA tag.
///
/// The mark belongs to the node *owning* the slot: a set mark means that
/// node is logically deleted, not its successor.
pub struct MarkPtrTag<T> {
    mark: bool,
    ptr: *mut T,
    tag: u64,
}

impl<T> MarkPtrTag<T> {
    #[inline]
    pub fn new(mark: bool, ptr: *mut T, tag: u64) -> Self {
        Self { mark, ptr, tag }
    }

    /// The empty slot: unmarked, no successor, tag zero.
    #[inline]
    pub fn null() -> Self {
        Self::new(false, ptr::null_mut(), 0)
    }

    #[inline]
    pub fn mark(&self) -> bool {
        self.mark
    }

    #[inline]
    pub fn ptr(&self) -> *mut T {
        self.ptr
    }

    #[inline]
    pub fn tag(&self) -> u64 {
        self.tag
    }

    #[inline]
    fn pack(self) -> u128 {
        let meta = (self.tag << 1) | self.mark as u64;
        ((meta as u128) << 64) | self.ptr as usize as u128
    }

    #[inline]
    fn unpack(word: u128) -> Self {
        let meta = (word >> 64) as u64;
        Self {
            mark: meta & 1 == 1,
            ptr: (word & u64::MAX as u128) as usize as *mut T,
            tag: meta >> 1,
        }
    }
}

// Manual impls; deriving would put bounds on `T`.
impl<T> Clone for MarkPtrTag<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MarkPtrTag<T> {}

impl<T> PartialEq for MarkPtrTag<T> {
    fn eq(&self, rhs: &Self) -> bool {
        self.mark == rhs.mark && self.ptr == rhs.ptr && self.tag == rhs.tag
    }
}

impl<T> Eq for MarkPtrTag<T> {}

impl<T> fmt::Debug for MarkPtrTag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkPtrTag")
            .field("mark", &self.mark)
            .field("ptr", &self.ptr)
            .field("tag", &self.tag)
            .finish()
    }
}

/// An atomic successor slot holding a [`MarkPtrTag`].
pub struct AtomicMarkPtrTag<T> {
    word: AtomicU128,
    _marker: PhantomData<*mut T>,
}

impl<T> AtomicMarkPtrTag<T> {
    /// Creates an empty slot.
    pub fn null() -> Self {
        Self {
            word: AtomicU128::new(MarkPtrTag::<T>::null().pack()),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn load(&self) -> MarkPtrTag<T> {
        MarkPtrTag::unpack(self.word.load(Ordering::Acquire))
    }

    /// Plain store. Only sound before the owning node is published.
    #[inline]
    pub fn store(&self, value: MarkPtrTag<T>) {
        self.word.store(value.pack(), Ordering::Relaxed);
    }

    /// Single-word CAS of the whole triple; acquire-release on success,
    /// acquire on failure. The failure value is the observed triple.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: MarkPtrTag<T>,
        new: MarkPtrTag<T>,
    ) -> Result<(), MarkPtrTag<T>> {
        self.word
            .compare_exchange(current.pack(), new.pack(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(MarkPtrTag::unpack)
    }
}

/// Whether the 128-bit CAS is a native instruction on this target.
pub fn is_lock_free() -> bool {
    AtomicU128::is_lock_free()
}

#[cfg(test)]
mod tests {
    use super::{AtomicMarkPtrTag, MarkPtrTag};

    #[test]
    fn pack_roundtrip() {
        let ptr = 0xdead_beef_usize as *mut u64;
        for mark in [false, true] {
            for tag in [0u64, 1, u32::MAX as u64 + 1, (1 << 63) - 1] {
                let v = MarkPtrTag::new(mark, ptr, tag);
                let back = MarkPtrTag::unpack(v.pack());
                assert_eq!(v, back);
                assert_eq!(back.mark(), mark);
                assert_eq!(back.ptr(), ptr);
                assert_eq!(back.tag(), tag);
            }
        }
    }

    #[test]
    fn null_is_empty() {
        let v = MarkPtrTag::<u64>::null();
        assert!(!v.mark());
        assert!(v.ptr().is_null());
        assert_eq!(v.tag(), 0);
    }

    #[test]
    fn equality_is_fieldwise() {
        let ptr = 0x1000_usize as *mut u64;
        let a = MarkPtrTag::new(false, ptr, 7);
        assert_eq!(a, MarkPtrTag::new(false, ptr, 7));
        assert_ne!(a, MarkPtrTag::new(true, ptr, 7));
        assert_ne!(a, MarkPtrTag::new(false, ptr, 8));
        assert_ne!(a, MarkPtrTag::new(false, 0x2000_usize as *mut u64, 7));
    }

    #[test]
    fn cas_succeeds_only_on_exact_triple() {
        let slot = AtomicMarkPtrTag::<u64>::null();
        let ptr = 0x1000_usize as *mut u64;

        // Stale tag must not win.
        let stale = MarkPtrTag::new(false, core::ptr::null_mut(), 1);
        let observed = slot
            .compare_exchange(stale, MarkPtrTag::new(false, ptr, 2))
            .unwrap_err();
        assert_eq!(observed, MarkPtrTag::null());

        slot.compare_exchange(MarkPtrTag::null(), MarkPtrTag::new(false, ptr, 1))
            .unwrap();
        let now = slot.load();
        assert_eq!(now, MarkPtrTag::new(false, ptr, 1));

        // Marking keeps pointer and bumps the tag.
        slot.compare_exchange(now, MarkPtrTag::new(true, ptr, 2))
            .unwrap();
        let now = slot.load();
        assert!(now.mark());
        assert_eq!(now.ptr(), ptr);
        assert_eq!(now.tag(), 2);
    }
}
