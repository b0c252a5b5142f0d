//! Allocators for intermediate buffers held by in-flight operations.

use crate::row::Row;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Source of the row buffers an asynchronous operation fills on a worker
/// thread before handing the rows to the caller's handler.
pub trait BufferAllocator: Send + Sync + 'static {
    /// An empty buffer with room for at least `capacity` rows.
    fn row_buffer(&self, capacity: usize) -> Vec<Row>;

    /// Return a drained buffer.
    fn recycle(&self, buffer: Vec<Row>) {
        drop(buffer);
    }
}

/// Plain heap allocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl BufferAllocator for SystemAllocator {
    fn row_buffer(&self, capacity: usize) -> Vec<Row> {
        Vec::with_capacity(capacity)
    }
}

/// Cloneable, type-erased allocator handle.
#[derive(Clone)]
pub struct AnyAllocator {
    inner: Arc<dyn BufferAllocator>,
}

impl AnyAllocator {
    pub fn new<A: BufferAllocator>(allocator: A) -> Self {
        Self {
            inner: Arc::new(allocator),
        }
    }

    /// Share an allocator the caller keeps a handle to.
    pub fn from_arc<A: BufferAllocator>(allocator: Arc<A>) -> Self {
        Self { inner: allocator }
    }

    pub fn row_buffer(&self, capacity: usize) -> Vec<Row> {
        self.inner.row_buffer(capacity)
    }

    pub fn recycle(&self, buffer: Vec<Row>) {
        self.inner.recycle(buffer);
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for AnyAllocator {
    fn default() -> Self {
        Self::new(SystemAllocator)
    }
}

impl fmt::Debug for AnyAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyAllocator").finish_non_exhaustive()
    }
}

/// Keeps drained buffers on a free list and hands them out again.
#[derive(Debug, Default)]
pub struct RecyclingAllocator {
    free: Mutex<Vec<Vec<Row>>>,
    max_cached: usize,
    reused: AtomicUsize,
}

impl RecyclingAllocator {
    /// Default number of buffers kept on the free list.
    pub const DEFAULT_MAX_CACHED: usize = 8;

    pub fn new() -> Self {
        Self::with_max_cached(Self::DEFAULT_MAX_CACHED)
    }

    pub fn with_max_cached(max_cached: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_cached,
            reused: AtomicUsize::new(0),
        }
    }

    /// How many buffers were served from the free list.
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }

    /// How many buffers are currently on the free list.
    pub fn cached(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl BufferAllocator for RecyclingAllocator {
    fn row_buffer(&self, capacity: usize) -> Vec<Row> {
        let recycled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match recycled {
            Some(mut buffer) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buffer.reserve(capacity);
                buffer
            }
            None => Vec::with_capacity(capacity),
        }
    }

    fn recycle(&self, mut buffer: Vec<Row>) {
        buffer.clear();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_cached {
            free.push(buffer);
        }
    }
}
