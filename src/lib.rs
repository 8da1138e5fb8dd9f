// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! # AMD CCP (Cryptographic Co-Processor) Offload Engine
//!
//! This crate drives the command queues of AMD's Cryptographic Co-Processor
//! from user space: it turns bursts of symmetric crypto operations into
//! hardware descriptors, publishes them on a queue's descriptor ring and
//! later detects completion and harvests the results.
//!
//! ## Pieces
//!
//! - **Sessions**: a transform chain (cipher, auth, cipher+auth in either
//!   order, or AEAD) is configured once into an immutable [`Session`].
//! - **Capabilities**: per-algorithm descriptor builders
//!   ([`AlgorithmOps`]) are registered in a [`Capabilities`] table and
//!   resolved when a session is configured.
//! - **Submission**: [`Submitter::enqueue`] reserves ring slots, writes one
//!   batch of descriptors and kicks the queue.
//! - **Completion**: [`Harvester::dequeue`] checks the device head cursor,
//!   extracts digests and hands finished operations back in order.
//!
//! ## Platform Support
//!
//! | Platform | Register access |
//! |----------|-----------------|
//! | Linux    | BAR resource file mapped with `mmap` |
//! | Other    | `CcpError::PlatformNotSupported` |
//!
//! Any other register window (a VFIO region, a simulator) can be plugged in
//! through the [`QueueDevice`] trait.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ccp_crypto::{
//!     Capabilities, CcpEngine, CcpError, CipherAlgo, CipherDir, CipherXform, CryptoOp,
//!     DataRange, IvParams, PacketBuf, QueueConfig, Xform,
//! };
//! use std::path::Path;
//!
//! fn main() -> Result<(), CcpError> {
//!     let mut engine = CcpEngine::open(
//!         Path::new("/sys/bus/pci/devices/0000:03:00.2/resource2"),
//!         0,
//!         Capabilities::with_builtin(),
//!         QueueConfig::default(),
//!     )?;
//!
//!     let session = engine.configure_session(&[Xform::Cipher(CipherXform {
//!         dir: CipherDir::Encrypt,
//!         algo: CipherAlgo::Null,
//!         key: Vec::new(),
//!         iv: IvParams::default(),
//!     })])?;
//!
//!     let mut ops = vec![CryptoOp::new(session, PacketBuf::new(vec![0u8; 4096]))
//!         .with_cipher_range(DataRange::new(0, 4096))];
//!     engine.enqueue_burst(&mut ops)?;
//!
//!     let mut done = Vec::new();
//!     while engine.dequeue_burst(&mut done, 1) == 0 {}
//!     println!("status: {:?}", done[0].status());
//!     Ok(())
//! }
//! ```
//!
//! ## Requirements
//!
//! - AMD EPYC or Ryzen with a CCP function (PCI class 0x1080)
//! - The CCP function unbound from the `ccp` kernel driver and its BAR
//!   reachable from user space (sysfs resource file, UIO or VFIO)
//! - An IOMMU in pass-through mode, or a [`QueueDevice::iova`]
//!   implementation that translates buffer addresses

#![cfg(target_arch = "x86_64")]

// Module declarations
pub mod batch;
pub mod caps;
pub mod dequeue;
pub mod descriptor;
pub mod device;
pub mod engine;
pub mod enqueue;
pub mod error;
pub mod op;
pub mod opcode;
pub mod session;
pub mod slots;
pub mod submit;
pub mod wq;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports for convenient access
pub use batch::{Batch, BatchPool};
pub use caps::{
    AeadAlgo, AlgorithmOps, AuthAlgo, Capabilities, CipherAlgo, ContextLayout, Hook, NullCipher,
};
pub use dequeue::{is_ready, Harvester};
pub use descriptor::{CcpDesc, DescriptorFlags, MemType};
pub use device::{MmioDevice, QueueDevice};
pub use engine::{queue_pair, CcpEngine, QueuePairStats};
pub use enqueue::{BuildContext, Submitter};
pub use error::{CcpError, CcpResult, ErrorKind};
pub use op::{CryptoOp, DataRange, OpStatus, PacketBuf};
pub use opcode::{EngineType, ShaType};
pub use session::{
    classify, AeadXform, AuthOp, AuthXform, CipherDir, CipherXform, CommandOrder, IvParams,
    Session, Xform,
};
pub use slots::estimate_slots;
pub use wq::{CommandQueue, QueueConfig, QueueShared};
