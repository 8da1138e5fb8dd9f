// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Command queue management.
//!
//! A command queue is split in two halves:
//!
//! - [`CommandQueue`] is the producer side. It owns the descriptor ring
//!   memory and the write index, and is borrowed mutably by the submitter.
//! - [`QueueShared`] is reachable from every in-flight batch. It holds the
//!   register window and the free-slot counter, which the submitter
//!   decrements and the harvester increments from possibly different
//!   threads.

use crate::descriptor::{CcpDesc, Q_DESC_SIZE};
use crate::device::{
    QueueDevice, CMD_Q_BASE_HI_SHIFT, CMD_Q_CONTROL_BASE, CMD_Q_HEAD_LO_BASE, CMD_Q_SHIFT,
    CMD_Q_SIZE_MASK, CMD_Q_TAIL_LO_BASE,
};
use crate::error::{CcpError, CcpResult};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Default number of descriptors per command queue.
pub const COMMANDS_PER_QUEUE: u32 = 2048;

/// Default maximum operations admitted into one batch.
pub const DEFAULT_MAX_BURST: usize = 64;

/// Default number of batch objects per queue pair.
pub const DEFAULT_BATCH_POOL_SIZE: usize = 512;

/// Bytes of storage-block scratch reserved per operation in a batch.
pub const SB_BYTES: usize = 32;

/// Sizing of a command queue and its queue pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Descriptors in the ring (power of two).
    pub ring_size: u32,
    /// Maximum operations per batch.
    pub max_burst: usize,
    /// Batch objects available to the submitter.
    pub batch_pool_size: usize,
    /// Scratch bytes per batch.
    pub scratch_bytes: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ring_size: COMMANDS_PER_QUEUE,
            max_burst: DEFAULT_MAX_BURST,
            batch_pool_size: DEFAULT_BATCH_POOL_SIZE,
            scratch_bytes: SB_BYTES * DEFAULT_MAX_BURST,
        }
    }
}

impl QueueConfig {
    /// Set the number of ring descriptors.
    pub fn with_ring_size(mut self, ring_size: u32) -> Self {
        self.ring_size = ring_size;
        self
    }

    /// Set the per-batch operation limit; scratch space follows it.
    pub fn with_max_burst(mut self, max_burst: usize) -> Self {
        self.max_burst = max_burst;
        self.scratch_bytes = SB_BYTES * max_burst;
        self
    }

    /// Set the number of batch objects.
    pub fn with_batch_pool_size(mut self, size: usize) -> Self {
        self.batch_pool_size = size;
        self
    }

    /// Check the configuration against hardware limits.
    pub fn validate(&self) -> CcpResult<()> {
        if self.ring_size < 2 || !self.ring_size.is_power_of_two() {
            return Err(CcpError::InvalidArgument(format!(
                "ring size {} is not a power of two >= 2",
                self.ring_size
            )));
        }
        if self.ring_size.trailing_zeros() - 1 > CMD_Q_SIZE_MASK {
            return Err(CcpError::InvalidArgument(format!(
                "ring size {} exceeds the control register encoding",
                self.ring_size
            )));
        }
        if self.max_burst == 0 || self.batch_pool_size == 0 {
            return Err(CcpError::InvalidArgument(
                "max_burst and batch_pool_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// State of a command queue shared between submitter and harvester.
pub struct QueueShared {
    device: Box<dyn QueueDevice>,
    free_slots: AtomicI64,
    capacity: usize,
    qbase: u32,
    qcontrol: u32,
}

impl QueueShared {
    /// Register window of this queue.
    #[inline]
    pub fn device(&self) -> &dyn QueueDevice {
        self.device.as_ref()
    }

    /// Cached control word (size and base-high fields, RUN clear).
    #[inline]
    pub fn qcontrol(&self) -> u32 {
        self.qcontrol
    }

    /// Bus address of descriptor 0, low 32 bits.
    #[inline]
    pub fn base(&self) -> u32 {
        self.qbase
    }

    /// Total descriptor slots the free-slot counter accounts for.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current free-slot counter.
    ///
    /// Can be transiently negative: reservation is an unconditional
    /// pre-decrement and is corrected afterwards.
    #[inline]
    pub fn free_slots(&self) -> i64 {
        self.free_slots.load(Ordering::Acquire)
    }

    /// Take `n` slots.
    #[inline]
    pub fn reserve_slots(&self, n: usize) {
        self.free_slots.fetch_sub(n as i64, Ordering::AcqRel);
    }

    /// Give back `n` slots.
    #[inline]
    pub fn release_slots(&self, n: usize) {
        self.free_slots.fetch_add(n as i64, Ordering::AcqRel);
    }

    /// Read the device's head cursor.
    #[inline]
    pub fn read_head(&self) -> u32 {
        self.device.read_reg(CMD_Q_HEAD_LO_BASE)
    }
}

impl std::fmt::Debug for QueueShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueShared")
            .field("free_slots", &self.free_slots())
            .field("capacity", &self.capacity)
            .field("qbase", &format_args!("{:#010x}", self.qbase))
            .field("qcontrol", &format_args!("{:#010x}", self.qcontrol))
            .finish()
    }
}

/// Producer side of a hardware command queue.
pub struct CommandQueue {
    shared: Arc<QueueShared>,
    ring: Box<[CcpDesc]>,
    qidx: u32,
    ring_size: u32,
}

impl CommandQueue {
    /// Allocate the descriptor ring and program the queue registers.
    ///
    /// Head and tail are both pointed at descriptor 0 and the queue is left
    /// stopped; the first kick sets RUN. One slot is held back from the
    /// free-slot counter so that a full ring is never confused with an
    /// empty one.
    ///
    /// # Errors
    ///
    /// Returns `CcpError::InvalidArgument` if the configuration is invalid.
    pub fn new(device: Box<dyn QueueDevice>, config: &QueueConfig) -> CcpResult<Self> {
        config.validate()?;

        let ring = vec![CcpDesc::new(); config.ring_size as usize].into_boxed_slice();
        let bus = device.iova(ring.as_ptr() as *const u8);
        let qbase = bus as u32;

        let size_field = (config.ring_size.trailing_zeros() - 1) & CMD_Q_SIZE_MASK;
        let qcontrol =
            (size_field << CMD_Q_SHIFT) | ((((bus >> 32) as u32) & 0xFFFF) << CMD_Q_BASE_HI_SHIFT);

        device.write_reg(CMD_Q_TAIL_LO_BASE, qbase);
        device.write_reg(CMD_Q_HEAD_LO_BASE, qbase);
        device.write_reg(CMD_Q_CONTROL_BASE, qcontrol);

        let capacity = config.ring_size as usize - 1;
        log::debug!(
            "command queue ring at {:#x}, {} descriptors, control {:#010x}",
            bus,
            config.ring_size,
            qcontrol
        );

        Ok(Self {
            shared: Arc::new(QueueShared {
                device,
                free_slots: AtomicI64::new(capacity as i64),
                capacity,
                qbase,
                qcontrol,
            }),
            ring,
            qidx: 0,
            ring_size: config.ring_size,
        })
    }

    /// State shared with in-flight batches.
    #[inline]
    pub fn shared(&self) -> &Arc<QueueShared> {
        &self.shared
    }

    /// Index of the next descriptor to write.
    #[inline]
    pub fn write_index(&self) -> u32 {
        self.qidx
    }

    /// Bus offset of the next descriptor to write, as the head/tail
    /// registers express it.
    #[inline]
    pub fn write_offset(&self) -> u32 {
        self.shared
            .qbase
            .wrapping_add(self.qidx.wrapping_mul(Q_DESC_SIZE))
    }

    /// Number of descriptors in the ring.
    #[inline]
    pub fn ring_size(&self) -> u32 {
        self.ring_size
    }

    /// Store a descriptor at the write index and advance it.
    #[inline]
    pub fn push(&mut self, desc: CcpDesc) {
        let slot = &mut self.ring[self.qidx as usize];
        // SAFETY: `slot` is a valid, aligned element of the ring; the device
        // reads it by DMA, so the store must not be elided.
        unsafe { std::ptr::write_volatile(slot, desc) };
        self.qidx = (self.qidx + 1) & (self.ring_size - 1);
    }

    /// Move the write index back to `index`, discarding descriptors written
    /// after it. Only valid before the tail register has been advanced past
    /// them.
    #[inline]
    pub(crate) fn rewind(&mut self, index: u32) {
        self.qidx = index & (self.ring_size - 1);
    }

    /// Descriptor currently stored at `index`.
    pub fn descriptor(&self, index: u32) -> &CcpDesc {
        &self.ring[(index & (self.ring_size - 1)) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::mock_queue;

    #[test]
    fn test_config_validation() {
        assert!(QueueConfig::default().validate().is_ok());
        assert!(QueueConfig::default().with_ring_size(0).validate().is_err());
        assert!(QueueConfig::default().with_ring_size(1).validate().is_err());
        assert!(QueueConfig::default().with_ring_size(100).validate().is_err());
        assert!(QueueConfig::default().with_max_burst(0).validate().is_err());
        assert!(QueueConfig::default()
            .with_batch_pool_size(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_max_burst_sizes_scratch() {
        let config = QueueConfig::default().with_max_burst(8);
        assert_eq!(config.scratch_bytes, 8 * SB_BYTES);
    }

    #[test]
    fn test_queue_init_programs_registers() {
        let (queue, regs) = mock_queue(QueueConfig::default().with_ring_size(16));
        let shared = queue.shared();

        assert_eq!(regs.get(CMD_Q_TAIL_LO_BASE), shared.base());
        assert_eq!(regs.get(CMD_Q_HEAD_LO_BASE), shared.base());
        // log2(16) - 1 = 3 in the size field
        assert_eq!(regs.get(CMD_Q_CONTROL_BASE) & (CMD_Q_SIZE_MASK << CMD_Q_SHIFT), 3 << 3);
        assert_eq!(shared.capacity(), 15);
        assert_eq!(shared.free_slots(), 15);
        assert_eq!(queue.write_offset(), shared.base());
    }

    #[test]
    fn test_push_wraps() {
        let (mut queue, _regs) = mock_queue(QueueConfig::default().with_ring_size(4));
        let base = queue.shared().base();

        for i in 0..3 {
            queue.push(CcpDesc::passthru(i, i, 1));
        }
        assert_eq!(queue.write_index(), 3);
        assert_eq!(queue.write_offset(), base + 3 * Q_DESC_SIZE);

        queue.push(CcpDesc::passthru(3, 3, 1));
        assert_eq!(queue.write_index(), 0);
        assert_eq!(queue.write_offset(), base);
        assert_eq!(queue.descriptor(2).src_addr(), 2);
    }

    #[test]
    fn test_rewind() {
        let (mut queue, _regs) = mock_queue(QueueConfig::default().with_ring_size(8));
        queue.push(CcpDesc::new());
        let mark = queue.write_index();
        queue.push(CcpDesc::new());
        queue.push(CcpDesc::new());
        queue.rewind(mark);
        assert_eq!(queue.write_index(), 1);
    }

    #[test]
    fn test_slot_counter() {
        let (queue, _regs) = mock_queue(QueueConfig::default().with_ring_size(8));
        let shared = queue.shared();
        shared.reserve_slots(10);
        assert_eq!(shared.free_slots(), -3);
        shared.release_slots(10);
        assert_eq!(shared.free_slots(), 7);
    }
}
