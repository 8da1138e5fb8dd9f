// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Batch tracking objects and their pool.
//!
//! One [`Batch`] records everything the harvester needs to know about one
//! enqueue call: which queue it went to, which ring span it occupies, how
//! many slots it holds and which operations it carries. Batches are
//! allocated up front and moved by value between the pool, the submitter,
//! the hand-off channel and the harvester, so exactly one side owns a batch
//! at any time.

use crate::op::CryptoOp;
use crate::wq::QueueShared;
use parking_lot::Mutex;
use std::sync::Arc;

/// Storage-block scratch space carried by a batch.
///
/// Some algorithms stage keys or intermediate state here and point their
/// descriptors at it by bus address.
pub struct ScratchArea {
    buf: Box<[u8]>,
    phys: u64,
    used: usize,
}

impl ScratchArea {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0u8; len].into_boxed_slice(),
            phys: 0,
            used: 0,
        }
    }

    /// Bus address of the first scratch byte.
    #[inline]
    pub fn phys(&self) -> u64 {
        self.phys
    }

    /// Bytes handed out so far.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Carve `len` bytes off the scratch space.
    ///
    /// Returns the bytes and their bus address, or `None` if exhausted.
    pub fn alloc(&mut self, len: usize) -> Option<(&mut [u8], u64)> {
        let start = self.used;
        let end = start.checked_add(len)?;
        if end > self.buf.len() {
            return None;
        }
        self.used = end;
        Some((&mut self.buf[start..end], self.phys + start as u64))
    }

    pub(crate) fn rewind(&mut self, used: usize) {
        self.used = used.min(self.used);
    }
}

/// Book-keeping for one enqueue call.
pub struct Batch {
    id: usize,
    pub(crate) queue: Option<Arc<QueueShared>>,
    pub(crate) ops: Vec<CryptoOp>,
    capacity: usize,
    /// Operations already harvested.
    pub(crate) op_idx: usize,
    /// Operations still waiting to be harvested.
    pub(crate) opcnt: usize,
    /// Ring slots consumed and not yet reclaimed.
    pub(crate) desccnt: usize,
    pub(crate) head_offset: u32,
    pub(crate) tail_offset: u32,
    pub(crate) scratch: ScratchArea,
}

impl Batch {
    fn new(id: usize, capacity: usize, scratch_bytes: usize) -> Self {
        Self {
            id,
            queue: None,
            ops: Vec::with_capacity(capacity),
            capacity,
            op_idx: 0,
            opcnt: 0,
            desccnt: 0,
            head_offset: 0,
            tail_offset: 0,
            scratch: ScratchArea::new(scratch_bytes),
        }
    }

    /// Reset counters and bind the batch to `queue`.
    pub(crate) fn reset(&mut self, queue: Arc<QueueShared>) {
        self.op_idx = 0;
        self.opcnt = 0;
        self.desccnt = 0;
        self.head_offset = 0;
        self.tail_offset = 0;
        self.ops.clear();
        self.scratch.used = 0;
        self.scratch.phys = queue.device().iova(self.scratch.buf.as_ptr());
        self.queue = Some(queue);
    }

    /// Pool index of this batch, for logging.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Maximum operations this batch can carry.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn op_idx(&self) -> usize {
        self.op_idx
    }

    #[inline]
    pub fn opcnt(&self) -> usize {
        self.opcnt
    }

    #[inline]
    pub fn desccnt(&self) -> usize {
        self.desccnt
    }

    #[inline]
    pub fn head_offset(&self) -> u32 {
        self.head_offset
    }

    #[inline]
    pub fn tail_offset(&self) -> u32 {
        self.tail_offset
    }

    /// Operations admitted at enqueue time.
    #[inline]
    pub fn admitted(&self) -> usize {
        self.op_idx + self.opcnt
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("op_idx", &self.op_idx)
            .field("opcnt", &self.opcnt)
            .field("desccnt", &self.desccnt)
            .field("head_offset", &format_args!("{:#010x}", self.head_offset))
            .field("tail_offset", &format_args!("{:#010x}", self.tail_offset))
            .finish()
    }
}

/// Fixed set of pre-allocated batches.
pub struct BatchPool {
    free: Mutex<Vec<Box<Batch>>>,
    size: usize,
}

impl BatchPool {
    /// Allocate `size` batches of `capacity` operations each.
    pub fn new(size: usize, capacity: usize, scratch_bytes: usize) -> Self {
        let free = (0..size)
            .rev()
            .map(|id| Box::new(Batch::new(id, capacity, scratch_bytes)))
            .collect();
        Self {
            free: Mutex::new(free),
            size,
        }
    }

    /// Take a batch, or `None` if all are in flight.
    pub fn acquire(&self) -> Option<Box<Batch>> {
        self.free.lock().pop()
    }

    /// Return a batch to the pool.
    pub fn release(&self, mut batch: Box<Batch>) {
        debug_assert_eq!(batch.opcnt, 0, "batch {} released with ops", batch.id);
        batch.queue = None;
        batch.ops.clear();
        self.free.lock().push(batch);
    }

    /// Batches currently in the pool.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Total batches owned by the pool.
    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::mock_queue;
    use crate::wq::QueueConfig;

    #[test]
    fn test_pool_acquire_release() {
        let pool = BatchPool::new(2, 4, 64);
        assert_eq!(pool.available(), 2);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a.id(), 0);
        assert_eq!(b.id(), 1);
        assert!(pool.acquire().is_none());

        pool.release(a);
        assert_eq!(pool.available(), 1);
        pool.release(b);
        assert_eq!(pool.available(), pool.size());
    }

    #[test]
    fn test_reset_binds_queue() {
        let (queue, _regs) = mock_queue(QueueConfig::default().with_ring_size(8));
        let pool = BatchPool::new(1, 4, 64);
        let mut batch = pool.acquire().unwrap();
        batch.opcnt = 3;
        batch.desccnt = 5;

        batch.reset(Arc::clone(queue.shared()));
        assert_eq!(batch.opcnt(), 0);
        assert_eq!(batch.desccnt(), 0);
        assert_eq!(batch.admitted(), 0);
        assert_ne!(batch.scratch.phys(), 0);
        assert!(batch.queue.is_some());

        pool.release(batch);
        let batch = pool.acquire().unwrap();
        assert!(batch.queue.is_none());
    }

    #[test]
    fn test_scratch_alloc() {
        let mut scratch = ScratchArea::new(64);
        scratch.phys = 0x1000;

        let (buf, phys) = scratch.alloc(32).unwrap();
        assert_eq!(buf.len(), 32);
        assert_eq!(phys, 0x1000);

        let mark = scratch.used();
        let (_, phys) = scratch.alloc(16).unwrap();
        assert_eq!(phys, 0x1020);
        assert!(scratch.alloc(32).is_none());

        scratch.rewind(mark);
        assert_eq!(scratch.used(), 32);
        assert_eq!(scratch.capacity(), 64);
    }
}
