use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(all(not(feature = "sanitize"), target_os = "linux"))] {
        extern crate jemallocator;
        #[global_allocator]
        static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;
    }
}

pub mod config;
pub mod list;
pub mod locked;
pub mod set;
pub mod tagged;

pub use list::LockFreeSet;
pub use locked::{MutexSet, RwLockSet};
pub use set::ConcurrentSet;
