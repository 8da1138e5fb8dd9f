// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Batched submission onto a command queue.
//!
//! # Protocol
//!
//! One [`Submitter::enqueue`] call turns a burst of operations into one
//! batch:
//!
//! 1. take a batch from the pool and bind it to the queue
//! 2. reserve the caller's slot estimate from the free-slot counter
//! 3. record the ring position as the batch head
//! 4. let each operation's hooks write descriptors, in order
//! 5. record the ring position as the batch tail and kick the queue
//! 6. move the batch onto the hand-off channel for the harvester
//!
//! An operation whose descriptors cannot all be written is rolled back off
//! the ring and admission stops there. Slots reserved but not consumed are
//! handed back before the queue is kicked.

use crate::batch::{Batch, BatchPool, ScratchArea};
use crate::descriptor::CcpDesc;
use crate::error::{CcpError, CcpResult};
use crate::op::CryptoOp;
use crate::session::{Session, Stages};
use crate::submit::kick;
use crate::wq::CommandQueue;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;

/// Everything an [`AlgorithmOps`](crate::caps::AlgorithmOps) hook may touch
/// while writing the descriptors of one operation.
pub struct BuildContext<'a> {
    session: &'a Session,
    op: &'a mut CryptoOp,
    queue: &'a mut CommandQueue,
    scratch: &'a mut ScratchArea,
    budget: usize,
    pushed: usize,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(
        session: &'a Session,
        op: &'a mut CryptoOp,
        queue: &'a mut CommandQueue,
        scratch: &'a mut ScratchArea,
        budget: usize,
    ) -> Self {
        Self {
            session,
            op,
            queue,
            scratch,
            budget,
            pushed: 0,
        }
    }

    #[inline]
    pub fn session(&self) -> &Session {
        self.session
    }

    #[inline]
    pub fn op(&self) -> &CryptoOp {
        self.op
    }

    /// Mutable access, e.g. to append the device context to the source.
    #[inline]
    pub fn op_mut(&mut self) -> &mut CryptoOp {
        self.op
    }

    /// Bus address of host memory, as the device sees it.
    #[inline]
    pub fn iova(&self, ptr: *const u8) -> u64 {
        self.queue.shared().device().iova(ptr)
    }

    /// Append one descriptor to the ring.
    ///
    /// # Errors
    ///
    /// Returns `CcpError::RingFull` once the slots reserved for this batch
    /// are used up.
    pub fn push(&mut self, desc: CcpDesc) -> CcpResult<()> {
        if self.pushed >= self.budget {
            return Err(CcpError::RingFull);
        }
        self.queue.push(desc);
        self.pushed += 1;
        Ok(())
    }

    /// Carve `len` bytes of scratch space off the batch.
    pub fn scratch(&mut self, len: usize) -> CcpResult<(&mut [u8], u64)> {
        self.scratch.alloc(len).ok_or_else(|| {
            CcpError::InvalidArgument(format!("scratch space exhausted ({} bytes)", len))
        })
    }

    /// Descriptors written so far.
    #[inline]
    pub fn pushed(&self) -> usize {
        self.pushed
    }
}

/// Run the hooks of every stage of `session`, in execution order.
fn build_stages(session: &Session, ctx: &mut BuildContext<'_>) -> CcpResult<()> {
    match session.stages() {
        Stages::Cipher(c) => {
            c.hook().ops().build(ctx)?;
        }
        Stages::Auth(a) => {
            a.hook().ops().build(ctx)?;
        }
        Stages::CipherHash(c, a) => {
            c.hook().ops().build(ctx)?;
            a.hook().ops().build(ctx)?;
        }
        Stages::HashCipher(a, c) => {
            a.hook().ops().build(ctx)?;
            c.hook().ops().build(ctx)?;
        }
        Stages::Combined(x) => {
            x.hook().ops().build(ctx)?;
        }
    }
    Ok(())
}

/// Producer half of a queue pair.
pub struct Submitter {
    pool: Arc<BatchPool>,
    tx: Sender<Box<Batch>>,
    enqueued: u64,
    enqueue_errors: u64,
}

impl Submitter {
    pub(crate) fn new(pool: Arc<BatchPool>, tx: Sender<Box<Batch>>) -> Self {
        Self {
            pool,
            tx,
            enqueued: 0,
            enqueue_errors: 0,
        }
    }

    /// Submit a burst of operations as one batch.
    ///
    /// `slots_required` is the summed slot estimate of the operations in
    /// `ops` and is reserved up front, capped at the queue's capacity.
    /// Admitted operations are drained from the front of `ops`; the first
    /// operation that fails to build and everything after it stay behind
    /// for the caller.
    ///
    /// # Returns
    ///
    /// The number of operations admitted, which may be zero.
    ///
    /// # Errors
    ///
    /// - `BatchPoolExhausted` if every batch is in flight; nothing is
    ///   admitted and no slots are taken
    /// - `HandoffDisconnected` if the harvester has been dropped. The
    ///   operations are put back at the front of `ops` and the batch and its
    ///   slots are returned, but the descriptors have already been handed to
    ///   the device: the queue pair is unusable from here on.
    pub fn enqueue(
        &mut self,
        queue: &mut CommandQueue,
        ops: &mut Vec<CryptoOp>,
        slots_required: usize,
    ) -> CcpResult<usize> {
        let Some(mut batch) = self.pool.acquire() else {
            log::error!("batch info allocation failed");
            self.enqueue_errors += 1;
            return Err(CcpError::BatchPoolExhausted);
        };

        let shared = Arc::clone(queue.shared());
        batch.reset(Arc::clone(&shared));
        // A batch spanning the whole ring would end on its own head.
        let reserved = slots_required.min(shared.capacity());
        shared.reserve_slots(reserved);
        batch.head_offset = queue.write_offset();

        let limit = ops.len().min(batch.capacity());
        let mut admitted = 0;
        for op in ops.iter_mut().take(limit) {
            let ring_mark = queue.write_index();
            let scratch_mark = batch.scratch.used();
            let session = Arc::clone(op.session());
            let budget = reserved - batch.desccnt;

            let mut ctx = BuildContext::new(&session, op, queue, &mut batch.scratch, budget);
            let result = build_stages(&session, &mut ctx);
            let pushed = ctx.pushed();

            if let Err(e) = result {
                log::debug!(
                    "op {} of batch {} rejected after {} descriptor(s): {}",
                    admitted,
                    batch.id(),
                    pushed,
                    e
                );
                queue.rewind(ring_mark);
                batch.scratch.rewind(scratch_mark);
                self.enqueue_errors += 1;
                break;
            }
            batch.desccnt += pushed;
            admitted += 1;
        }

        if batch.desccnt < reserved {
            shared.release_slots(reserved - batch.desccnt);
        }

        batch.ops.extend(ops.drain(..admitted));
        batch.opcnt = admitted;
        batch.tail_offset = queue.write_offset();

        kick(&shared, batch.tail_offset);

        log::trace!(
            "batch {}: {} op(s), {} slot(s), head {:#010x} tail {:#010x}",
            batch.id(),
            batch.opcnt,
            batch.desccnt,
            batch.head_offset,
            batch.tail_offset
        );

        match self.tx.try_send(batch) {
            Ok(()) => {}
            Err(TrySendError::Disconnected(mut batch)) | Err(TrySendError::Full(mut batch)) => {
                log::error!("batch {} could not be handed to the harvester", batch.id());
                let mut returned: Vec<CryptoOp> = batch.ops.drain(..).collect();
                returned.append(ops);
                *ops = returned;
                batch.opcnt = 0;
                shared.release_slots(batch.desccnt);
                batch.desccnt = 0;
                self.pool.release(batch);
                self.enqueue_errors += 1;
                return Err(CcpError::HandoffDisconnected);
            }
        }

        self.enqueued += admitted as u64;
        Ok(admitted)
    }

    /// Batch pool shared with the harvester.
    pub fn pool(&self) -> &Arc<BatchPool> {
        &self.pool
    }

    /// Operations admitted over the lifetime of this submitter.
    pub fn enqueued(&self) -> u64 {
        self.enqueued
    }

    /// Rejected operations and failed enqueue calls.
    pub fn enqueue_errors(&self) -> u64 {
        self.enqueue_errors
    }

    pub(crate) fn record_error(&mut self) {
        self.enqueue_errors += 1;
    }
}
