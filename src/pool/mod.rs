//! Fixed-capacity object pools owned by a single thread.
//!
//! A [`ThreadOwnedPool`] hands out [`Pooled`] boxes that may travel to other
//! threads, but only the pool that created a slot can take it back, and
//! only on its owning thread. The pool itself is `!Send`, so it cannot leave
//! the thread that built it; slots that come home to the wrong pool panic.

use crate::executor::WorkerId;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one pool instance, unique for the life of the process.
pub type PoolId = u64;

/// Where a [`Pooled`] value has to go when it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A preallocated slot of pool `pool`, owned by worker `owner` (`None`
    /// for a pool living on a non-worker thread).
    Pool {
        pool: PoolId,
        owner: Option<WorkerId>,
    },
    /// Allocated because the pool was empty, or never pooled at all.
    /// Dropped on release.
    Overflow,
}

/// A value checked out of a [`ThreadOwnedPool`].
pub struct Pooled<T> {
    value: Box<T>,
    origin: Origin,
}

impl<T> Pooled<T> {
    /// Wraps a value that belongs to no pool.
    pub fn unpooled(value: T) -> Self {
        Self {
            value: Box::new(value),
            origin: Origin::Overflow,
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// The worker whose pool this slot belongs to.
    pub fn owner(&self) -> Option<WorkerId> {
        match self.origin {
            Origin::Pool { owner, .. } => owner,
            Origin::Overflow => None,
        }
    }

    pub fn is_overflow(&self) -> bool {
        self.origin == Origin::Overflow
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("value", &self.value)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Occupancy of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    /// Preallocated slots currently checked out.
    pub outstanding: usize,
    /// Objects allocated because the pool was empty.
    pub overflow_allocations: u64,
}

/// Stack of preallocated `T` slots owned by one thread.
///
/// The pool cannot be moved to another thread:
///
/// ```compile_fail
/// use forkbound::pool::ThreadOwnedPool;
///
/// let pool = ThreadOwnedPool::new(None, 4, || 0u32);
/// std::thread::spawn(move || drop(pool));
/// ```
pub struct ThreadOwnedPool<T> {
    id: PoolId,
    owner: Option<WorkerId>,
    owner_thread: ThreadId,
    capacity: usize,
    free: Vec<Box<T>>,
    overflow_allocations: u64,
    factory: Box<dyn Fn() -> T>,
    // Pools never leave the thread that built them.
    _not_send: PhantomData<*const ()>,
}

impl<T> ThreadOwnedPool<T> {
    /// Preallocates `capacity` slots with `factory` on the calling thread,
    /// which becomes the owner.
    pub fn new<F>(owner: Option<WorkerId>, capacity: usize, factory: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let free = (0..capacity).map(|_| Box::new(factory())).collect();
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            owner,
            owner_thread: thread::current().id(),
            capacity,
            free,
            overflow_allocations: 0,
            factory: Box::new(factory),
            _not_send: PhantomData,
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn owner(&self) -> Option<WorkerId> {
        self.owner
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Takes a free slot, or allocates an overflow object if none is left.
    ///
    /// The slot keeps whatever state it had when it was released.
    pub fn get(&mut self) -> Pooled<T> {
        match self.free.pop() {
            Some(value) => Pooled {
                value,
                origin: Origin::Pool {
                    pool: self.id,
                    owner: self.owner,
                },
            },
            None => {
                self.overflow_allocations += 1;
                Pooled {
                    value: Box::new((self.factory)()),
                    origin: Origin::Overflow,
                }
            }
        }
    }

    /// Whether `item` is one of this pool's slots.
    pub fn owns(&self, item: &Pooled<T>) -> bool {
        matches!(item.origin, Origin::Pool { pool, .. } if pool == self.id)
    }

    /// Returns `item` to the pool. Overflow objects are dropped.
    ///
    /// # Panics
    ///
    /// If `item` is a slot of another pool, if the pool would hold more
    /// than its capacity, or if called off the owning thread.
    pub fn release(&mut self, item: Pooled<T>) {
        assert_eq!(
            thread::current().id(),
            self.owner_thread,
            "pool {} released off its owner thread",
            self.id
        );

        match item.origin {
            Origin::Overflow => {}
            Origin::Pool { pool, owner } => {
                assert!(
                    pool == self.id,
                    "slot of pool {} (worker {:?}) released into pool {} (worker {:?})",
                    pool,
                    owner,
                    self.id,
                    self.owner
                );
                assert!(
                    self.free.len() < self.capacity,
                    "pool {} (worker {:?}) released above its capacity {}",
                    self.id,
                    self.owner,
                    self.capacity
                );
                self.free.push(item.value);
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            available: self.free.len(),
            outstanding: self.capacity - self.free.len(),
            overflow_allocations: self.overflow_allocations,
        }
    }
}

impl<T> fmt::Debug for ThreadOwnedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadOwnedPool")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("stats", &self.stats())
            .finish()
    }
}
