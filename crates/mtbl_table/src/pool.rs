//! Allocation hooks for message tables.
//!
//! Every tree node, every copied string payload and the store's own control structure is
//! charged to a [`Pool`] before it is created, and handed back to it when released. The default
//! [`PagedPool`] always grants requests and only traces them. [`CountingPool`] keeps tallies and
//! can be capped, which is how exhaustion and leaks are observed.

use std::{alloc::Layout, cell::Cell, rc::Rc};

use tracing::trace;

use crate::error::{Error, Result};

/// Tag attached to allocation events when none is given.
pub const DEFAULT_TAG: &str = "MsgT";

/// Caller supplied allocate/free routines.
///
/// A pool gates and accounts for allocations; it does not provide the memory. Nodes and payloads
/// are still allocated from the global allocator once the pool has granted the request, so a pool
/// cannot move a table into a separate heap or an allocation-restricted context.
///
/// A pool must see exactly one [`Pool::free`] for every successful [`Pool::allocate`] with the
/// same layout.
pub trait Pool {
    /// Approve an allocation of `layout`. Returns [`Error::OutOfMemory`] when refused.
    fn allocate(&self, layout: Layout) -> Result<()>;

    /// Record the release of an allocation previously approved for `layout`.
    fn free(&self, layout: Layout);
}

impl<P: Pool + ?Sized> Pool for &P {
    fn allocate(&self, layout: Layout) -> Result<()> {
        (**self).allocate(layout)
    }

    fn free(&self, layout: Layout) {
        (**self).free(layout)
    }
}

impl<P: Pool + ?Sized> Pool for Rc<P> {
    fn allocate(&self, layout: Layout) -> Result<()> {
        (**self).allocate(layout)
    }

    fn free(&self, layout: Layout) {
        (**self).free(layout)
    }
}

/// Pool that grants every request.
#[derive(Debug, Clone, Copy)]
pub struct PagedPool {
    tag: &'static str,
}

impl PagedPool {
    /// Create a pool whose events carry `tag`.
    pub const fn new(tag: &'static str) -> Self {
        Self { tag }
    }

    /// Tag attached to this pool's events
    pub fn tag(&self) -> &'static str {
        self.tag
    }
}

impl Default for PagedPool {
    fn default() -> Self {
        Self::new(DEFAULT_TAG)
    }
}

impl Pool for PagedPool {
    fn allocate(&self, layout: Layout) -> Result<()> {
        trace!(tag = self.tag, size = layout.size(), "allocate");
        Ok(())
    }

    fn free(&self, layout: Layout) {
        trace!(tag = self.tag, size = layout.size(), "free");
    }
}

/// Pool that tracks outstanding allocations.
///
/// ```
/// use std::rc::Rc;
/// use mtbl_table::{pool::CountingPool, MessageTable};
///
/// let pool = Rc::new(CountingPool::new());
/// let mut table = MessageTable::new_in(pool.clone())?;
/// table.insert_str(1, "hello")?;
/// assert!(pool.outstanding() > 0);
///
/// table.destroy();
/// assert_eq!(pool.outstanding(), 0);
/// # Ok::<(), mtbl_table::error::Error>(())
/// ```
#[derive(Debug)]
pub struct CountingPool {
    tag: &'static str,
    limit: Option<usize>,
    outstanding: Cell<usize>,
    outstanding_bytes: Cell<usize>,
    granted: Cell<usize>,
}

impl CountingPool {
    /// Create a pool without a limit.
    pub fn new() -> Self {
        Self {
            tag: DEFAULT_TAG,
            limit: None,
            outstanding: Cell::new(0),
            outstanding_bytes: Cell::new(0),
            granted: Cell::new(0),
        }
    }

    /// Create a pool that refuses every request after `limit` have been granted.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Number of allocations not yet freed
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    /// Bytes not yet freed
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding_bytes.get()
    }

    /// Number of requests granted over the pool's lifetime
    pub fn granted(&self) -> usize {
        self.granted.get()
    }
}

impl Default for CountingPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool for CountingPool {
    fn allocate(&self, layout: Layout) -> Result<()> {
        if self.limit.is_some_and(|limit| self.granted.get() >= limit) {
            trace!(tag = self.tag, size = layout.size(), "allocation refused");
            return Err(Error::OutOfMemory);
        }

        self.granted.set(self.granted.get() + 1);
        self.outstanding.set(self.outstanding.get() + 1);
        self.outstanding_bytes
            .set(self.outstanding_bytes.get() + layout.size());
        trace!(tag = self.tag, size = layout.size(), "allocate");
        Ok(())
    }

    fn free(&self, layout: Layout) {
        debug_assert!(self.outstanding.get() > 0, "free without allocation");
        self.outstanding.set(self.outstanding.get().saturating_sub(1));
        self.outstanding_bytes
            .set(self.outstanding_bytes.get().saturating_sub(layout.size()));
        trace!(tag = self.tag, size = layout.size(), "free");
    }
}
