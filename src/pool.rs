//! Object pool for per-request scratch objects.
//!
//! # Responsibilities
//! - Hand out reusable objects (path variable tables, filter link vectors)
//! - Reset objects on return so no state leaks between requests
//!
//! # Design Decisions
//! - Checkout returns an RAII guard; dropping it resets and returns the object
//! - The guard owns an `Arc` of the pool, so it can travel with a `'static` request
//! - Idle objects are capped; extra returns are simply dropped

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

/// Objects that can be cleared for reuse.
pub trait Recycle {
    /// Clear all per-request state, keeping allocations.
    fn reset(&mut self);
}

impl<T> Recycle for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

struct Shared<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
    make: Box<dyn Fn() -> T + Send + Sync>,
}

/// A pool of reusable `T`s.
pub struct Pool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Recycle + Send + 'static> Pool<T> {
    /// Create a pool that builds new objects with `make` when empty.
    pub fn new(max_idle: usize, make: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                idle: Mutex::new(Vec::new()),
                max_idle,
                make: Box::new(make),
            }),
        }
    }

    /// Take an object out of the pool, creating one if none is idle.
    pub fn checkout(&self) -> Pooled<T> {
        let value = self
            .shared
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| (self.shared.make)());
        Pooled {
            value: Some(value),
            pool: Some(Arc::clone(&self.shared)),
        }
    }

    /// Number of idle objects waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().len()
    }
}

/// An object checked out of a [`Pool`].
///
/// Returned to the pool, after `reset`, when dropped.
pub struct Pooled<T: Recycle> {
    value: Option<T>,
    pool: Option<Arc<Shared<T>>>,
}

impl<T: Recycle> Pooled<T> {
    /// Wrap a value that does not belong to any pool.
    pub fn detached(value: T) -> Self {
        Self {
            value: Some(value),
            pool: None,
        }
    }
}

impl<T: Recycle> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `drop` takes the value out.
        self.value.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Recycle> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Recycle> Drop for Pooled<T> {
    fn drop(&mut self) {
        let (Some(mut value), Some(pool)) = (self.value.take(), self.pool.take()) else {
            return;
        };
        value.reset();
        let mut idle = pool.idle.lock();
        if idle.len() < pool.max_idle {
            idle.push(value);
        }
    }
}

impl<T: Recycle + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returned_objects_are_reset_and_reused() {
        let pool: Pool<Vec<u32>> = Pool::new(4, || Vec::with_capacity(8));

        let mut first = pool.checkout();
        first.extend([1, 2, 3]);
        drop(first);
        assert_eq!(pool.idle_count(), 1);

        let second = pool.checkout();
        assert!(second.is_empty());
        assert!(second.capacity() >= 8);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn idle_objects_are_capped() {
        let pool: Pool<Vec<u8>> = Pool::new(1, Vec::new);
        let a = pool.checkout();
        let b = pool.checkout();
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn detached_values_are_not_pooled() {
        let mut value = Pooled::detached(vec![1]);
        value.push(2);
        assert_eq!(&*value, &[1, 2]);
    }
}
