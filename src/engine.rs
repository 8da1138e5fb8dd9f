// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! High-level queue-pair API.

use crate::batch::BatchPool;
use crate::caps::Capabilities;
use crate::dequeue::Harvester;
use crate::device::{MmioDevice, QueueDevice};
use crate::enqueue::Submitter;
use crate::error::{CcpError, CcpResult};
use crate::op::CryptoOp;
use crate::session::{Session, Xform};
use crate::slots::estimate_slots;
use crate::wq::{CommandQueue, QueueConfig};
use std::path::Path;
use std::sync::Arc;

/// Create the two halves of a queue pair sharing one batch pool.
///
/// The hand-off channel holds as many batches as the pool, so a submitter
/// holding a batch can always publish it.
pub fn queue_pair(config: &QueueConfig) -> (Submitter, Harvester) {
    let pool = Arc::new(BatchPool::new(
        config.batch_pool_size,
        config.max_burst,
        config.scratch_bytes,
    ));
    let (tx, rx) = crossbeam_channel::bounded(config.batch_pool_size);
    (
        Submitter::new(Arc::clone(&pool), tx),
        Harvester::new(pool, rx),
    )
}

/// Counters of one queue pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueuePairStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub enqueue_errors: u64,
}

/// One CCP command queue with its submitter and harvester.
///
/// `CcpEngine` is the single-threaded convenience wrapper. To enqueue and
/// dequeue from different threads, split it with [`CcpEngine::into_parts`].
///
/// # Example
///
/// ```rust,no_run
/// use ccp_crypto::{CcpEngine, CcpError, Capabilities, QueueConfig};
/// use std::path::Path;
///
/// fn main() -> Result<(), CcpError> {
///     let mut engine = CcpEngine::open(
///         Path::new("/sys/bus/pci/devices/0000:03:00.2/resource2"),
///         0,
///         Capabilities::with_builtin(),
///         QueueConfig::default(),
///     )?;
///
///     let mut done = Vec::new();
///     let n = engine.dequeue_burst(&mut done, 32);
///     println!("{} operation(s) completed", n);
///     Ok(())
/// }
/// ```
pub struct CcpEngine {
    caps: Capabilities,
    queue: CommandQueue,
    submitter: Submitter,
    harvester: Harvester,
    max_burst: usize,
}

impl CcpEngine {
    /// Build an engine on an already opened queue register window.
    ///
    /// # Errors
    ///
    /// Returns `CcpError::InvalidArgument` if the configuration is invalid.
    pub fn new(
        device: Box<dyn QueueDevice>,
        caps: Capabilities,
        config: QueueConfig,
    ) -> CcpResult<Self> {
        let queue = CommandQueue::new(device, &config)?;
        let (submitter, harvester) = queue_pair(&config);
        log::info!(
            "CCP queue pair up: {} ring slots, burst {}, {} batches",
            queue.shared().capacity(),
            config.max_burst,
            config.batch_pool_size
        );
        Ok(Self {
            caps,
            queue,
            submitter,
            harvester,
            max_burst: config.max_burst,
        })
    }

    /// Map command queue `queue` of the CCP whose register BAR is exposed
    /// at `resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if the BAR cannot be mapped (see
    /// [`MmioDevice::open`]) or the configuration is invalid.
    pub fn open(
        resource: &Path,
        queue: usize,
        caps: Capabilities,
        config: QueueConfig,
    ) -> CcpResult<Self> {
        let device = MmioDevice::open(resource, queue)?;
        Self::new(Box::new(device), caps, config)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Configure a session for `chain` against this engine's capabilities.
    pub fn configure_session(&self, chain: &[Xform]) -> CcpResult<Arc<Session>> {
        Session::configure(chain, &self.caps).map(Arc::new)
    }

    /// Ring slots one operation of `session` costs.
    pub fn estimate_slots(&self, session: &Session) -> CcpResult<usize> {
        estimate_slots(session)
    }

    /// Submit as many of `ops` as the ring and burst limit allow.
    ///
    /// Operations are taken from the front while their summed slot cost
    /// fits the free-slot count. Submitted operations are drained from
    /// `ops`; the rest stay for a later call.
    ///
    /// # Errors
    ///
    /// - `InsufficientSlots` if not even the first operation fits
    /// - any costing error of the first operation's session
    /// - errors of [`Submitter::enqueue`]
    pub fn enqueue_burst(&mut self, ops: &mut Vec<CryptoOp>) -> CcpResult<usize> {
        if ops.is_empty() {
            return Ok(0);
        }

        let available = self.queue.shared().free_slots();
        let mut required = 0usize;
        let mut count = 0usize;
        for op in ops.iter().take(self.max_burst) {
            let cost = match estimate_slots(op.session()) {
                Ok(cost) => cost,
                Err(e) if count == 0 => {
                    self.submitter.record_error();
                    return Err(e);
                }
                Err(_) => break,
            };
            if (required + cost) as i64 > available {
                if count == 0 {
                    log::debug!("{} slot(s) needed, {} free", cost, available);
                    self.submitter.record_error();
                    return Err(CcpError::InsufficientSlots {
                        required: cost,
                        available,
                    });
                }
                break;
            }
            required += cost;
            count += 1;
        }

        let mut burst: Vec<CryptoOp> = ops.drain(..count).collect();
        let result = self.submitter.enqueue(&mut self.queue, &mut burst, required);
        // Whatever was not admitted goes back in front of the rest.
        burst.append(ops);
        *ops = burst;
        result
    }

    /// Harvest up to `requested` completed operations into `out`.
    pub fn dequeue_burst(&mut self, out: &mut Vec<CryptoOp>, requested: usize) -> usize {
        self.harvester.dequeue(out, requested)
    }

    pub fn stats(&self) -> QueuePairStats {
        QueuePairStats {
            enqueued: self.submitter.enqueued(),
            dequeued: self.harvester.dequeued(),
            enqueue_errors: self.submitter.enqueue_errors(),
        }
    }

    /// Split into the producer state and the consumer.
    ///
    /// The command queue and submitter stay together on the enqueue side;
    /// the harvester can be moved to another thread.
    pub fn into_parts(self) -> (CommandQueue, Submitter, Harvester) {
        (self.queue, self.submitter, self.harvester)
    }
}
