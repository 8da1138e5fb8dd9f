// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Algorithm capability table.
//!
//! The engine itself knows nothing about individual algorithms. Each one is
//! an [`AlgorithmOps`] hook that reports which CCP engine runs it, how many
//! descriptor slots one operation costs, and how to write those descriptors.
//! Hooks are looked up once, when a session is configured, and the session
//! keeps the resolved [`Hook`] for the rest of its life.

use crate::descriptor::CcpDesc;
use crate::enqueue::BuildContext;
use crate::error::{CcpError, CcpResult};
use crate::opcode::{EngineType, ShaType};
use crate::session::Session;
use std::collections::HashMap;
use std::sync::Arc;

/// Cipher algorithm tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgo {
    Null,
    AesEcb,
    AesCbc,
    AesCtr,
    AesXts,
    Des3Cbc,
}

/// Authentication algorithm tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthAlgo {
    Sha1,
    Sha1Hmac,
    Sha224,
    Sha224Hmac,
    Sha256,
    Sha256Hmac,
    Sha384,
    Sha384Hmac,
    Sha512,
    Sha512Hmac,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
    AesCmac,
}

/// AEAD algorithm tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeadAlgo {
    AesGcm,
}

/// Where a digest-producing engine leaves its result.
///
/// The device appends `ctx_len` bytes of context after the payload of the
/// last source segment; the digest starts `digest_offset` bytes into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLayout {
    pub ctx_len: usize,
    pub digest_offset: usize,
    pub sha_type: Option<ShaType>,
}

/// Descriptor builder for one algorithm.
pub trait AlgorithmOps: Send + Sync {
    /// Engine that executes the descriptors.
    fn engine(&self) -> EngineType;

    /// Descriptor slots one operation of `session` consumes.
    fn slot_count(&self, session: &Session) -> CcpResult<usize>;

    /// Write the descriptors for the operation in `ctx` onto the ring.
    ///
    /// Returns the number of slots written. On error the caller discards
    /// anything this call pushed.
    fn build(&self, ctx: &mut BuildContext<'_>) -> CcpResult<usize>;

    /// Context layout for digest-producing algorithms.
    fn context_layout(&self) -> Option<ContextLayout> {
        None
    }
}

/// Resolved reference to an [`AlgorithmOps`] implementation.
#[derive(Clone)]
pub struct Hook(Arc<dyn AlgorithmOps>);

impl Hook {
    pub fn new(ops: impl AlgorithmOps + 'static) -> Self {
        Self(Arc::new(ops))
    }

    #[inline]
    pub fn ops(&self) -> &dyn AlgorithmOps {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hook({})", self.0.engine())
    }
}

/// Map from algorithm tag to descriptor builder.
#[derive(Clone, Default)]
pub struct Capabilities {
    cipher: HashMap<CipherAlgo, Hook>,
    auth: HashMap<AuthAlgo, Hook>,
    aead: HashMap<AeadAlgo, Hook>,
}

impl Capabilities {
    /// Empty table: every algorithm is unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the built-in hooks registered.
    pub fn with_builtin() -> Self {
        let mut caps = Self::new();
        caps.register_cipher(CipherAlgo::Null, NullCipher);
        caps
    }

    pub fn register_cipher(
        &mut self,
        algo: CipherAlgo,
        ops: impl AlgorithmOps + 'static,
    ) -> &mut Self {
        self.cipher.insert(algo, Hook::new(ops));
        self
    }

    pub fn register_auth(&mut self, algo: AuthAlgo, ops: impl AlgorithmOps + 'static) -> &mut Self {
        self.auth.insert(algo, Hook::new(ops));
        self
    }

    pub fn register_aead(&mut self, algo: AeadAlgo, ops: impl AlgorithmOps + 'static) -> &mut Self {
        self.aead.insert(algo, Hook::new(ops));
        self
    }

    pub fn cipher(&self, algo: CipherAlgo) -> Option<&Hook> {
        self.cipher.get(&algo)
    }

    pub fn auth(&self, algo: AuthAlgo) -> Option<&Hook> {
        self.auth.get(&algo)
    }

    pub fn aead(&self, algo: AeadAlgo) -> Option<&Hook> {
        self.aead.get(&algo)
    }
}

/// NULL cipher: the payload is moved to the destination unchanged by the
/// pass-through engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCipher;

impl AlgorithmOps for NullCipher {
    fn engine(&self) -> EngineType {
        EngineType::Passthru
    }

    fn slot_count(&self, _session: &Session) -> CcpResult<usize> {
        Ok(1)
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> CcpResult<usize> {
        let range = ctx.op().cipher_range();
        if range.length == 0 {
            return Ok(0);
        }
        let length = u32::try_from(range.length).map_err(|_| {
            CcpError::InvalidArgument(format!(
                "cipher range of {} bytes exceeds one descriptor",
                range.length
            ))
        })?;
        let src = ctx
            .op()
            .src()
            .contiguous(range.offset, range.length)
            .ok_or_else(|| {
                CcpError::InvalidArgument("cipher range spans segments".to_string())
            })?
            .as_ptr();
        let dst = match ctx.op().dst() {
            Some(dst) => dst
                .contiguous(range.offset, range.length)
                .ok_or(CcpError::BufferSizeMismatch {
                    expected: range.offset + range.length,
                    actual: dst.len(),
                })?
                .as_ptr(),
            None => src,
        };

        let desc = CcpDesc::passthru(ctx.iova(src), ctx.iova(dst), length);
        ctx.push(desc)?;
        Ok(1)
    }
}
