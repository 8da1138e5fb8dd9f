// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Completion detection and result harvesting.
//!
//! The device gives no per-descriptor completion record. A batch is done
//! once the queue's head cursor has left the ring span `[head, tail)` the
//! batch occupies. Batches are harvested in submission order; a batch can
//! be drained across several calls, in which case it stays parked in the
//! harvester until its last operation has been handed out.

use crate::batch::{Batch, BatchPool};
use crate::op::{CryptoOp, DataRange, OpStatus};
use crate::session::{AuthOp, CommandOrder, DigestParams, MAX_DIGEST_SIZE};
use crate::submit::mb;
use crossbeam_channel::Receiver;
use std::sync::Arc;

/// Whether a batch spanning `[head, tail)` has been consumed by a device
/// whose head cursor is at `cursor`.
///
/// All three values are ring offsets in bus address space. `head == tail`
/// is a batch without descriptors and is always ready.
#[inline]
pub fn is_ready(head: u32, tail: u32, cursor: u32) -> bool {
    if head == tail {
        true
    } else if head < tail {
        !(head <= cursor && cursor < tail)
    } else {
        // wrapped around the end of the ring
        !(cursor >= head || cursor < tail)
    }
}

impl Batch {
    /// Check the live head register of this batch's queue.
    pub fn is_ready(&self) -> bool {
        match &self.queue {
            Some(queue) => is_ready(self.head_offset, self.tail_offset, queue.read_head()),
            None => true,
        }
    }
}

/// Consumer half of a queue pair.
pub struct Harvester {
    pool: Arc<BatchPool>,
    rx: Receiver<Box<Batch>>,
    pending: Option<Box<Batch>>,
    dequeued: u64,
}

impl Harvester {
    pub(crate) fn new(pool: Arc<BatchPool>, rx: Receiver<Box<Batch>>) -> Self {
        Self {
            pool,
            rx,
            pending: None,
            dequeued: 0,
        }
    }

    /// Harvest up to `requested` completed operations into `out`.
    ///
    /// Only the oldest batch is looked at. If the device has not finished
    /// it, nothing is returned and the batch is kept for the next call. A
    /// batch that was already partly harvested is known to be complete and
    /// is drained without looking at the device again.
    ///
    /// Never fails: per-operation problems are reported through
    /// [`CryptoOp::status`].
    pub fn dequeue(&mut self, out: &mut Vec<CryptoOp>, requested: usize) -> usize {
        if requested == 0 {
            return 0;
        }
        loop {
            let batch = match self.pending.take() {
                Some(batch) => batch,
                None => match self.rx.try_recv() {
                    Ok(batch) => batch,
                    Err(_) => return 0,
                },
            };

            if batch.op_idx == 0 && !batch.is_ready() {
                log::trace!("batch {} still in flight", batch.id());
                self.pending = Some(batch);
                return 0;
            }

            if batch.opcnt == 0 {
                // Nothing was admitted; recycle and look at the next one.
                self.finish(batch);
                continue;
            }

            return self.harvest(batch, out, requested);
        }
    }

    fn harvest(
        &mut self,
        mut batch: Box<Batch>,
        out: &mut Vec<CryptoOp>,
        requested: usize,
    ) -> usize {
        let n = requested.min(batch.opcnt);

        // Contexts were written by DMA; read them only after the head load.
        mb();
        for mut op in batch.ops.drain(..n) {
            let status = complete_op(&mut op);
            op.set_status(status);
            out.push(op);
        }

        batch.opcnt -= n;
        batch.op_idx += n;
        self.reclaim_slots(&mut batch);
        self.dequeued += n as u64;

        if batch.opcnt == 0 {
            self.finish(batch);
        } else {
            self.pending = Some(batch);
        }
        n
    }

    /// Return the batch's ring slots to its queue, once.
    fn reclaim_slots(&self, batch: &mut Batch) {
        if batch.desccnt == 0 {
            return;
        }
        match &batch.queue {
            Some(queue) => queue.release_slots(batch.desccnt),
            None => log::error!(
                "batch {} holds {} slot(s) but no queue",
                batch.id(),
                batch.desccnt
            ),
        }
        batch.desccnt = 0;
    }

    fn finish(&self, mut batch: Box<Batch>) {
        self.reclaim_slots(&mut batch);
        self.pool.release(batch);
    }

    /// Batches handed over but not yet fully harvested.
    pub fn in_flight(&self) -> usize {
        self.rx.len() + usize::from(self.pending.is_some())
    }

    /// The partly harvested or not yet complete batch, if any.
    pub fn pending(&self) -> Option<&Batch> {
        self.pending.as_deref()
    }

    /// Operations harvested over the lifetime of this harvester.
    pub fn dequeued(&self) -> u64 {
        self.dequeued
    }
}

/// Status of one finished operation, extracting its digest if it has one.
fn complete_op(op: &mut CryptoOp) -> OpStatus {
    let session = Arc::clone(op.session());
    match session.command_order() {
        CommandOrder::Cipher => OpStatus::Success,
        CommandOrder::Auth | CommandOrder::CipherHash | CommandOrder::HashCipher => {
            let range = op.auth_range();
            match session.digest() {
                Some(digest) => harvest_digest(op, digest, range),
                None => missing_digest(session.command_order()),
            }
        }
        CommandOrder::Combined => {
            let range = op.aead_range();
            match session.digest() {
                Some(digest) => harvest_digest(op, digest, range),
                None => missing_digest(CommandOrder::Combined),
            }
        }
        CommandOrder::NotSupported => {
            log::error!("harvested an operation without a command order");
            OpStatus::Error
        }
    }
}

fn missing_digest(order: CommandOrder) -> OpStatus {
    log::error!("{:?} session has no digest parameters", order);
    OpStatus::Error
}

/// Pull the digest out of the device context at the end of the source
/// packet, verify or store it, then strip the context.
fn harvest_digest(op: &mut CryptoOp, params: &DigestParams, range: DataRange) -> OpStatus {
    let len = params.digest_length;
    let mut digest = [0u8; MAX_DIGEST_SIZE];

    {
        let last = op.src().last_segment();
        if last.len() < params.ctx_len {
            log::error!(
                "device context of {} bytes missing from a {} byte segment",
                params.ctx_len,
                last.len()
            );
            return OpStatus::Error;
        }
        let ctx = &last[last.len() - params.ctx_len..];
        if params.is_natural_order() {
            digest[..len].copy_from_slice(&ctx[params.offset..params.offset + len]);
        } else if len > 0 {
            // Engine leaves the digest byte-swapped at the end of the context.
            let top = params.ctx_len - params.offset - 1;
            for (i, b) in digest[..len].iter_mut().enumerate() {
                *b = ctx[top - i];
            }
        }
    }

    let status = match params.op {
        AuthOp::Verify => match op.digest() {
            Some(expected) if expected.get(..len) == Some(&digest[..len]) => OpStatus::Success,
            _ => OpStatus::AuthFailed,
        },
        AuthOp::Generate => match op.digest_mut() {
            Some(out) => {
                if out.len() < len {
                    out.resize(len, 0);
                }
                out[..len].copy_from_slice(&digest[..len]);
                OpStatus::Success
            }
            None => match op.out_mut().write_at(range.end(), &digest[..len]) {
                Ok(()) => OpStatus::Success,
                Err(e) => {
                    log::error!("digest does not fit the destination: {}", e);
                    OpStatus::Error
                }
            },
        },
    };

    op.src_mut().trim(params.ctx_len);
    status
}
