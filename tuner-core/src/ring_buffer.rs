//! # Ring Buffer Module
//!
//! Fixed-capacity circular buffer holding the most recent samples of the
//! input stream. The buffer is always logically full: it is pre-filled with
//! `T::default()` and every write overwrites the oldest elements.
//!
//! One writer and any number of readers may use it concurrently. Writes take
//! the lock exclusively; `retrieve` and `at` share it.

use parking_lot::RwLock;

use crate::error::{ConfigError, SizeMismatch};

struct Inner<T> {
    values: Vec<T>,
    /// Index of the oldest element, which is also the next one to be overwritten.
    cursor: usize,
}

/// Thread-safe circular buffer with overwrite-oldest semantics.
pub struct RingBuffer<T> {
    inner: RwLock<Inner<T>>,
    capacity: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Creates a buffer of `capacity` elements, all set to `T::default()`.
    ///
    /// # Errors
    /// * `ConfigError::ZeroCapacity` if `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            inner: RwLock::new(Inner {
                values: vec![T::default(); capacity],
                cursor: 0,
            }),
            capacity,
        })
    }

    /// Number of elements the buffer holds. Constant for its lifetime.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `items` in order, overwriting the oldest elements.
    ///
    /// A batch at least as large as the buffer replaces its whole content with
    /// the last `capacity` items and resets the cursor to 0.
    pub fn enqueue(&self, items: &[T]) {
        let n = self.capacity;
        let count = items.len();
        if count == 0 {
            return;
        }

        let mut inner = self.inner.write();
        if count >= n {
            inner.values.copy_from_slice(&items[count - n..]);
            inner.cursor = 0;
            return;
        }

        let start = inner.cursor;
        let end = start + count;
        if end < n {
            inner.values[start..end].copy_from_slice(items);
            inner.cursor = end;
        } else {
            // Write wraps around the end of storage.
            let tail = n - start;
            let head = end - n;
            inner.values[start..n].copy_from_slice(&items[..tail]);
            inner.values[..head].copy_from_slice(&items[tail..]);
            inner.cursor = head;
        }
    }

    /// Copies the whole buffer into `out`, oldest element first.
    ///
    /// # Errors
    /// * `SizeMismatch` if `out.len()` differs from the capacity
    pub fn retrieve(&self, out: &mut [T]) -> Result<(), SizeMismatch> {
        let n = self.capacity;
        if out.len() != n {
            return Err(SizeMismatch {
                expected: n,
                actual: out.len(),
            });
        }

        let inner = self.inner.read();
        let tail = n - inner.cursor;
        out[..tail].copy_from_slice(&inner.values[inner.cursor..]);
        out[tail..].copy_from_slice(&inner.values[..inner.cursor]);
        Ok(())
    }

    /// Returns the element `offset` positions after the oldest one.
    pub fn at(&self, offset: usize) -> Option<T> {
        if offset >= self.capacity {
            return None;
        }
        let inner = self.inner.read();
        inner
            .values
            .get((inner.cursor + offset) % self.capacity)
            .copied()
    }
}
