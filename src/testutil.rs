// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Test doubles: a register-file device and scriptable algorithm hooks.

use crate::caps::{
    AeadAlgo, AlgorithmOps, AuthAlgo, Capabilities, CipherAlgo, ContextLayout,
};
use crate::descriptor::CcpDesc;
use crate::device::{QueueDevice, CMD_Q_HEAD_LO_BASE, CMD_Q_STATUS_BASE};
use crate::enqueue::BuildContext;
use crate::error::{CcpError, CcpResult};
use crate::opcode::{EngineType, ShaType};
use crate::session::{
    AeadXform, AuthOp, AuthXform, CipherDir, CipherXform, IvParams, Session, Xform,
};
use crate::wq::{CommandQueue, QueueConfig};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

const REG_COUNT: usize = CMD_Q_STATUS_BASE as usize / 4 + 1;

/// Queue register file with per-register write counters.
pub struct MockRegs {
    regs: [AtomicU32; REG_COUNT],
    writes: [AtomicUsize; REG_COUNT],
}

impl MockRegs {
    fn new() -> Self {
        Self {
            regs: std::array::from_fn(|_| AtomicU32::new(0)),
            writes: std::array::from_fn(|_| AtomicUsize::new(0)),
        }
    }

    pub fn get(&self, offset: u32) -> u32 {
        self.regs[offset as usize / 4].load(Ordering::SeqCst)
    }

    /// Set a register as the device would, without counting a write.
    pub fn set(&self, offset: u32, value: u32) {
        self.regs[offset as usize / 4].store(value, Ordering::SeqCst);
    }

    /// Number of host writes to a register.
    pub fn writes(&self, offset: u32) -> usize {
        self.writes[offset as usize / 4].load(Ordering::SeqCst)
    }

    pub fn set_head(&self, value: u32) {
        self.set(CMD_Q_HEAD_LO_BASE, value);
    }
}

/// Device backed by a [`MockRegs`] register file.
pub struct MockDevice(Arc<MockRegs>);

impl MockDevice {
    pub fn new() -> (Self, Arc<MockRegs>) {
        let regs = Arc::new(MockRegs::new());
        (Self(Arc::clone(&regs)), regs)
    }
}

impl QueueDevice for MockDevice {
    fn read_reg(&self, offset: u32) -> u32 {
        self.0.get(offset)
    }

    fn write_reg(&self, offset: u32, value: u32) {
        self.0.set(offset, value);
        self.0.writes[offset as usize / 4].fetch_add(1, Ordering::SeqCst);
    }
}

/// Command queue on a fresh mock device.
pub fn mock_queue(config: QueueConfig) -> (CommandQueue, Arc<MockRegs>) {
    let (device, regs) = MockDevice::new();
    let queue = CommandQueue::new(Box::new(device), &config).unwrap();
    (queue, regs)
}

/// Algorithm hook with a fixed slot cost.
///
/// Digest hooks append their context to the source packet, filled with
/// `0, 1, 2, ...` as if the device had written it.
pub struct MockOps {
    engine: EngineType,
    slots: usize,
    layout: Option<ContextLayout>,
    costable: bool,
    appends_context: bool,
    fail_after: Option<usize>,
    builds: AtomicUsize,
}

impl MockOps {
    fn with_engine(engine: EngineType, slots: usize, layout: Option<ContextLayout>) -> Self {
        Self {
            engine,
            slots,
            layout,
            costable: true,
            appends_context: true,
            fail_after: None,
            builds: AtomicUsize::new(0),
        }
    }

    /// AES cipher costing `slots` descriptors.
    pub fn cipher(slots: usize) -> Self {
        Self::with_engine(EngineType::Aes, slots, None)
    }

    /// SHA hook with a `ctx_len` byte context.
    pub fn sha(slots: usize, sha_type: ShaType, ctx_len: usize, offset: usize) -> Self {
        Self::with_engine(
            EngineType::Sha,
            slots,
            Some(ContextLayout {
                ctx_len,
                digest_offset: offset,
                sha_type: Some(sha_type),
            }),
        )
    }

    /// AES-GCM style hook: AES engine, 32 byte context.
    pub fn aead(slots: usize) -> Self {
        Self::with_engine(
            EngineType::Aes,
            slots,
            Some(ContextLayout {
                ctx_len: 32,
                digest_offset: 0,
                sha_type: None,
            }),
        )
    }

    /// `slot_count` reports the session's cipher as unsupported.
    pub fn uncostable(mut self) -> Self {
        self.costable = false;
        self
    }

    /// The first `n` builds succeed; later ones push a descriptor and fail.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Report a context layout but never append the context.
    pub fn without_context(mut self) -> Self {
        self.appends_context = false;
        self
    }
}

impl AlgorithmOps for MockOps {
    fn engine(&self) -> EngineType {
        self.engine
    }

    fn slot_count(&self, session: &Session) -> CcpResult<usize> {
        if !self.costable {
            let algo = session.cipher().map_or(CipherAlgo::Null, |c| c.algo);
            return Err(CcpError::UnsupportedCipher(algo));
        }
        Ok(self.slots)
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> CcpResult<usize> {
        let mut desc = CcpDesc::new();
        desc.set_engine(self.engine);

        let n = self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| n >= limit) {
            ctx.push(desc)?;
            return Err(CcpError::InvalidArgument("mock build failure".to_string()));
        }

        for _ in 0..self.slots {
            ctx.push(desc)?;
        }

        if let (Some(layout), true) = (self.layout, self.appends_context) {
            let area = ctx.op_mut().src_mut().append(layout.ctx_len);
            for (i, b) in area.iter_mut().enumerate() {
                *b = i as u8;
            }
        }
        Ok(self.slots)
    }

    fn context_layout(&self) -> Option<ContextLayout> {
        self.layout
    }
}

/// AES-128 encrypt transform with a 16 byte IV at offset 0.
pub fn cipher_xform(algo: CipherAlgo) -> Xform {
    Xform::Cipher(CipherXform {
        dir: CipherDir::Encrypt,
        algo,
        key: vec![0x2B; 16],
        iv: IvParams {
            offset: 0,
            length: 16,
        },
    })
}

/// Auth transform with a 32 byte digest.
pub fn auth_xform(algo: AuthAlgo, op: AuthOp) -> Xform {
    Xform::Auth(AuthXform {
        op,
        algo,
        key: vec![0x0B; 20],
        digest_length: 32,
    })
}

/// AES-GCM transform: 12 byte IV, 8 byte AAD, 16 byte tag.
pub fn aead_xform(dir: CipherDir) -> Xform {
    Xform::Aead(AeadXform {
        dir,
        algo: AeadAlgo::AesGcm,
        key: vec![0x2B; 16],
        iv: IvParams {
            offset: 0,
            length: 12,
        },
        aad_length: 8,
        digest_length: 16,
    })
}

/// Capability table used throughout the tests.
///
/// | algorithm | engine | slots |
/// |-----------|--------|-------|
/// | AES-CBC   | AES    | 1     |
/// | SHA-256 HMAC | SHA, 32 byte context | 1 |
/// | SHA-512   | SHA, 64 byte context | 2 |
/// | AES-GCM   | AES, 32 byte context | 3 |
pub fn mock_caps() -> Capabilities {
    let mut caps = Capabilities::with_builtin();
    caps.register_cipher(CipherAlgo::AesCbc, MockOps::cipher(1))
        .register_auth(AuthAlgo::Sha256Hmac, MockOps::sha(1, ShaType::Sha256, 32, 0))
        .register_auth(AuthAlgo::Sha512, MockOps::sha(2, ShaType::Sha512, 64, 0))
        .register_aead(AeadAlgo::AesGcm, MockOps::aead(3));
    caps
}
