// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Low-level ordering primitives and the queue kick sequence.
//!
//! Descriptors are plain stores into DMA-visible memory. Before the tail
//! register is advanced, every one of those stores must be globally visible,
//! otherwise the device can fetch a half-written descriptor. On x86_64 that
//! takes an `SFENCE` between the last descriptor store and the MMIO write.
//!
//! # Safety
//!
//! The fences themselves are always safe to execute; they are wrapped in
//! `unsafe` only because they are emitted with inline assembly.

use crate::device::{QueueControl, CMD_Q_CONTROL_BASE, CMD_Q_TAIL_LO_BASE};
use crate::wq::QueueShared;

/// Write memory barrier: orders all prior stores before later stores.
#[inline]
#[cfg(target_arch = "x86_64")]
pub fn wmb() {
    // SAFETY: SFENCE has no operands and touches no memory.
    unsafe {
        core::arch::asm!("sfence", options(nostack, preserves_flags));
    }
}

/// Full memory barrier: orders all prior loads and stores.
#[inline]
#[cfg(target_arch = "x86_64")]
pub fn mb() {
    // SAFETY: MFENCE has no operands and touches no memory.
    unsafe {
        core::arch::asm!("mfence", options(nostack, preserves_flags));
    }
}

/// Hand the ring up to `tail` to the device.
///
/// Issues a write barrier, writes the tail register and then rewrites the
/// cached control word with [`QueueControl::RUN`] set. The control write is
/// unconditional: re-asserting RUN on a running queue is harmless and it
/// restarts a queue that halted after draining.
#[inline]
pub fn kick(queue: &QueueShared, tail: u32) {
    wmb();
    let device = queue.device();
    device.write_reg(CMD_Q_TAIL_LO_BASE, tail);
    device.write_reg(CMD_Q_CONTROL_BASE, queue.qcontrol() | QueueControl::RUN.bits());
}
