// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Session configuration.
//!
//! A transform chain (one cipher, one auth, cipher+auth in either order, or
//! one AEAD stage) is classified into a [`CommandOrder`] and turned into an
//! immutable [`Session`]. The session records the keys, IV placement and
//! digest layout every operation on it needs, together with the algorithm
//! hooks resolved from the [`Capabilities`] table.

use crate::caps::{AeadAlgo, AuthAlgo, Capabilities, CipherAlgo, ContextLayout, Hook};
use crate::error::{CcpError, CcpResult};
use crate::opcode::{EngineType, ShaType};

/// Largest cipher key a session can hold.
pub const MAX_KEY_SIZE: usize = 64;

/// Largest auth (HMAC) key a session can hold.
pub const MAX_AUTH_KEY_SIZE: usize = 128;

/// Largest digest the harvester extracts.
pub const MAX_DIGEST_SIZE: usize = 64;

/// Execution order of a session's stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandOrder {
    Cipher,
    Auth,
    CipherHash,
    HashCipher,
    Combined,
    NotSupported,
}

/// Cipher direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherDir {
    Encrypt,
    Decrypt,
}

/// Digest operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOp {
    Generate,
    Verify,
}

/// Location of the IV inside each operation's IV buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IvParams {
    pub offset: usize,
    pub length: usize,
}

/// Cipher stage of a transform chain.
#[derive(Debug, Clone)]
pub struct CipherXform {
    pub dir: CipherDir,
    pub algo: CipherAlgo,
    pub key: Vec<u8>,
    pub iv: IvParams,
}

/// Authentication stage of a transform chain.
#[derive(Debug, Clone)]
pub struct AuthXform {
    pub op: AuthOp,
    pub algo: AuthAlgo,
    pub key: Vec<u8>,
    pub digest_length: usize,
}

/// AEAD stage of a transform chain.
#[derive(Debug, Clone)]
pub struct AeadXform {
    pub dir: CipherDir,
    pub algo: AeadAlgo,
    pub key: Vec<u8>,
    pub iv: IvParams,
    pub aad_length: usize,
    pub digest_length: usize,
}

/// One stage of a transform chain.
#[derive(Debug, Clone)]
pub enum Xform {
    Cipher(CipherXform),
    Auth(AuthXform),
    Aead(AeadXform),
}

/// Classify a transform chain by its shape.
pub fn classify(chain: &[Xform]) -> CommandOrder {
    match chain {
        [Xform::Cipher(_)] => CommandOrder::Cipher,
        [Xform::Auth(_)] => CommandOrder::Auth,
        [Xform::Cipher(_), Xform::Auth(_)] => CommandOrder::CipherHash,
        [Xform::Auth(_), Xform::Cipher(_)] => CommandOrder::HashCipher,
        [Xform::Aead(_)] => CommandOrder::Combined,
        _ => CommandOrder::NotSupported,
    }
}

/// Fixed-capacity key storage.
#[derive(Clone, PartialEq, Eq)]
pub struct Key<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> Key<N> {
    fn copy_from(key: &[u8]) -> CcpResult<Self> {
        if key.len() > N {
            return Err(CcpError::KeyTooLong {
                len: key.len(),
                max: N,
            });
        }
        let mut bytes = [0u8; N];
        bytes[..key.len()].copy_from_slice(key);
        Ok(Self {
            bytes,
            len: key.len(),
        })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> std::fmt::Debug for Key<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key({} bytes)", self.len)
    }
}

/// Configured cipher stage.
#[derive(Debug, Clone)]
pub struct CipherParams {
    pub dir: CipherDir,
    pub algo: CipherAlgo,
    pub engine: EngineType,
    pub key: Key<MAX_KEY_SIZE>,
    hook: Hook,
}

impl CipherParams {
    #[inline]
    pub fn hook(&self) -> &Hook {
        &self.hook
    }
}

/// Digest handling shared by auth and AEAD stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestParams {
    pub op: AuthOp,
    pub digest_length: usize,
    pub aad_length: usize,
    /// Bytes of context the device appends to the source packet.
    pub ctx_len: usize,
    /// Offset of the digest within that context.
    pub offset: usize,
    pub engine: EngineType,
    pub sha_type: Option<ShaType>,
}

impl DigestParams {
    fn new(
        op: AuthOp,
        digest_length: usize,
        aad_length: usize,
        engine: EngineType,
        layout: ContextLayout,
    ) -> CcpResult<Self> {
        if digest_length > MAX_DIGEST_SIZE
            || layout.digest_offset + digest_length > layout.ctx_len
        {
            return Err(CcpError::InvalidArgument(format!(
                "digest of {} bytes at offset {} does not fit a {} byte context",
                digest_length, layout.digest_offset, layout.ctx_len
            )));
        }
        Ok(Self {
            op,
            digest_length,
            aad_length,
            ctx_len: layout.ctx_len,
            offset: layout.digest_offset,
            engine,
            sha_type: layout.sha_type,
        })
    }

    /// The device leaves this digest in host byte order.
    #[inline]
    pub fn is_natural_order(&self) -> bool {
        self.engine == EngineType::Sha && self.sha_type.is_some_and(ShaType::is_natural_order)
    }
}

/// Configured authentication stage.
#[derive(Debug, Clone)]
pub struct AuthParams {
    pub algo: AuthAlgo,
    pub key: Key<MAX_AUTH_KEY_SIZE>,
    pub digest: DigestParams,
    hook: Hook,
}

impl AuthParams {
    #[inline]
    pub fn hook(&self) -> &Hook {
        &self.hook
    }
}

/// Configured AEAD stage.
#[derive(Debug, Clone)]
pub struct AeadParams {
    pub algo: AeadAlgo,
    pub dir: CipherDir,
    pub key: Key<MAX_KEY_SIZE>,
    pub digest: DigestParams,
    hook: Hook,
}

impl AeadParams {
    #[inline]
    pub fn hook(&self) -> &Hook {
        &self.hook
    }
}

/// Populated stages of a session, in execution order.
#[derive(Debug, Clone)]
pub enum Stages {
    Cipher(CipherParams),
    Auth(AuthParams),
    CipherHash(CipherParams, AuthParams),
    HashCipher(AuthParams, CipherParams),
    Combined(AeadParams),
}

/// Immutable per-context configuration shared by all its operations.
#[derive(Debug, Clone)]
pub struct Session {
    stages: Stages,
    iv: IvParams,
}

impl Session {
    /// Build a session from a transform chain.
    ///
    /// Stages are configured cipher first, then auth, then AEAD; the first
    /// failure is returned and no session is produced.
    ///
    /// # Errors
    ///
    /// - `UnsupportedChain` if the chain has no command order
    /// - `UnsupportedCipher`/`UnsupportedAuth`/`UnsupportedAead` if no hook
    ///   is registered for an algorithm
    /// - `InvalidEngine` if a hook names an engine that cannot run its stage
    /// - `KeyTooLong` if a key exceeds the session key storage
    /// - `InvalidArgument` if the digest does not fit the device context
    pub fn configure(chain: &[Xform], caps: &Capabilities) -> CcpResult<Self> {
        let order = classify(chain);
        // Default IV length = 0
        let mut iv = IvParams::default();

        let stages = match (order, chain) {
            (CommandOrder::Cipher, [Xform::Cipher(c)]) => {
                Stages::Cipher(configure_cipher(c, caps, &mut iv)?)
            }
            (CommandOrder::Auth, [Xform::Auth(a)]) => Stages::Auth(configure_auth(a, caps)?),
            (CommandOrder::CipherHash, [Xform::Cipher(c), Xform::Auth(a)]) => {
                let cipher = configure_cipher(c, caps, &mut iv)?;
                Stages::CipherHash(cipher, configure_auth(a, caps)?)
            }
            (CommandOrder::HashCipher, [Xform::Auth(a), Xform::Cipher(c)]) => {
                let cipher = configure_cipher(c, caps, &mut iv)?;
                Stages::HashCipher(configure_auth(a, caps)?, cipher)
            }
            (CommandOrder::Combined, [Xform::Aead(x)]) => {
                Stages::Combined(configure_aead(x, caps, &mut iv)?)
            }
            _ => {
                log::error!("Unsupported transform chain of {} stage(s)", chain.len());
                return Err(CcpError::UnsupportedChain);
            }
        };

        Ok(Self { stages, iv })
    }

    /// Command order of this session. Never `NotSupported`.
    pub fn command_order(&self) -> CommandOrder {
        match self.stages {
            Stages::Cipher(_) => CommandOrder::Cipher,
            Stages::Auth(_) => CommandOrder::Auth,
            Stages::CipherHash(..) => CommandOrder::CipherHash,
            Stages::HashCipher(..) => CommandOrder::HashCipher,
            Stages::Combined(_) => CommandOrder::Combined,
        }
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    pub fn cipher(&self) -> Option<&CipherParams> {
        match &self.stages {
            Stages::Cipher(c) | Stages::CipherHash(c, _) | Stages::HashCipher(_, c) => Some(c),
            _ => None,
        }
    }

    pub fn auth(&self) -> Option<&AuthParams> {
        match &self.stages {
            Stages::Auth(a) | Stages::CipherHash(_, a) | Stages::HashCipher(a, _) => Some(a),
            _ => None,
        }
    }

    pub fn aead(&self) -> Option<&AeadParams> {
        match &self.stages {
            Stages::Combined(x) => Some(x),
            _ => None,
        }
    }

    /// Digest handling of the auth or AEAD stage, if any.
    pub fn digest(&self) -> Option<&DigestParams> {
        self.auth()
            .map(|a| &a.digest)
            .or_else(|| self.aead().map(|x| &x.digest))
    }

    pub fn iv(&self) -> IvParams {
        self.iv
    }
}

fn configure_cipher(
    xform: &CipherXform,
    caps: &Capabilities,
    iv: &mut IvParams,
) -> CcpResult<CipherParams> {
    let params = cipher_params(xform, caps).map_err(|e| {
        log::error!("Invalid/unsupported cipher parameters: {}", e);
        e
    })?;
    *iv = xform.iv;
    Ok(params)
}

fn cipher_params(xform: &CipherXform, caps: &Capabilities) -> CcpResult<CipherParams> {
    let key = Key::copy_from(&xform.key)?;
    let hook = caps
        .cipher(xform.algo)
        .ok_or(CcpError::UnsupportedCipher(xform.algo))?
        .clone();
    let engine = hook.ops().engine();
    if !engine.is_cipher_engine() {
        return Err(CcpError::InvalidEngine {
            engine,
            stage: "cipher",
        });
    }
    Ok(CipherParams {
        dir: xform.dir,
        algo: xform.algo,
        engine,
        key,
        hook,
    })
}

fn configure_auth(xform: &AuthXform, caps: &Capabilities) -> CcpResult<AuthParams> {
    auth_params(xform, caps).map_err(|e| {
        log::error!("Invalid/unsupported auth parameters: {}", e);
        e
    })
}

fn auth_params(xform: &AuthXform, caps: &Capabilities) -> CcpResult<AuthParams> {
    let key = Key::copy_from(&xform.key)?;
    let hook = caps
        .auth(xform.algo)
        .ok_or(CcpError::UnsupportedAuth(xform.algo))?
        .clone();
    let engine = hook.ops().engine();
    if !engine.is_auth_engine() {
        return Err(CcpError::InvalidEngine {
            engine,
            stage: "auth",
        });
    }
    let layout = hook
        .ops()
        .context_layout()
        .ok_or(CcpError::UnsupportedAuth(xform.algo))?;
    let digest = DigestParams::new(xform.op, xform.digest_length, 0, engine, layout)?;
    Ok(AuthParams {
        algo: xform.algo,
        key,
        digest,
        hook,
    })
}

fn configure_aead(
    xform: &AeadXform,
    caps: &Capabilities,
    iv: &mut IvParams,
) -> CcpResult<AeadParams> {
    let params = aead_params(xform, caps).map_err(|e| {
        log::error!("Invalid/unsupported aead parameters: {}", e);
        e
    })?;
    *iv = xform.iv;
    Ok(params)
}

fn aead_params(xform: &AeadXform, caps: &Capabilities) -> CcpResult<AeadParams> {
    let key = Key::copy_from(&xform.key)?;
    // The single AEAD direction also fixes the digest operation.
    let op = match xform.dir {
        CipherDir::Encrypt => AuthOp::Generate,
        CipherDir::Decrypt => AuthOp::Verify,
    };
    let hook = caps
        .aead(xform.algo)
        .ok_or(CcpError::UnsupportedAead(xform.algo))?
        .clone();
    let engine = hook.ops().engine();
    let layout = hook
        .ops()
        .context_layout()
        .ok_or(CcpError::UnsupportedAead(xform.algo))?;
    let digest = DigestParams::new(op, xform.digest_length, xform.aad_length, engine, layout)?;
    Ok(AeadParams {
        algo: xform.algo,
        dir: xform.dir,
        key,
        digest,
        hook,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{aead_xform, auth_xform, cipher_xform, mock_caps};

    #[test]
    fn test_classify_shapes() {
        let c = cipher_xform(CipherAlgo::AesCbc);
        let a = auth_xform(AuthAlgo::Sha256Hmac, AuthOp::Generate);
        let x = aead_xform(CipherDir::Encrypt);

        assert_eq!(classify(&[c.clone()]), CommandOrder::Cipher);
        assert_eq!(classify(&[a.clone()]), CommandOrder::Auth);
        assert_eq!(classify(&[c.clone(), a.clone()]), CommandOrder::CipherHash);
        assert_eq!(classify(&[a.clone(), c.clone()]), CommandOrder::HashCipher);
        assert_eq!(classify(&[x.clone()]), CommandOrder::Combined);
    }

    #[test]
    fn test_classify_unsupported() {
        let c = cipher_xform(CipherAlgo::AesCbc);
        let a = auth_xform(AuthAlgo::Sha256Hmac, AuthOp::Generate);
        let x = aead_xform(CipherDir::Encrypt);

        assert_eq!(classify(&[]), CommandOrder::NotSupported);
        assert_eq!(classify(&[c.clone(), c.clone()]), CommandOrder::NotSupported);
        assert_eq!(classify(&[a.clone(), a.clone()]), CommandOrder::NotSupported);
        assert_eq!(classify(&[x.clone(), a.clone()]), CommandOrder::NotSupported);
        assert_eq!(classify(&[c.clone(), x]), CommandOrder::NotSupported);
        assert_eq!(classify(&[c.clone(), a, c]), CommandOrder::NotSupported);
    }

    #[test]
    fn test_configure_not_supported_fails() {
        let caps = mock_caps();
        let c = cipher_xform(CipherAlgo::AesCbc);
        assert!(matches!(
            Session::configure(&[], &caps),
            Err(CcpError::UnsupportedChain)
        ));
        assert!(matches!(
            Session::configure(&[c.clone(), c], &caps),
            Err(CcpError::UnsupportedChain)
        ));
    }

    #[test]
    fn test_configure_cipher() {
        let caps = mock_caps();
        let session = Session::configure(&[cipher_xform(CipherAlgo::AesCbc)], &caps).unwrap();

        assert_eq!(session.command_order(), CommandOrder::Cipher);
        let cipher = session.cipher().unwrap();
        assert_eq!(cipher.dir, CipherDir::Encrypt);
        assert_eq!(cipher.key.as_bytes(), &[0x2B; 16]);
        assert_eq!(cipher.engine, EngineType::Aes);
        assert_eq!(session.iv(), IvParams { offset: 0, length: 16 });
        assert!(session.auth().is_none());
        assert!(session.digest().is_none());
    }

    #[test]
    fn test_configure_chain_orders() {
        let caps = mock_caps();
        let c = cipher_xform(CipherAlgo::AesCbc);
        let a = auth_xform(AuthAlgo::Sha256Hmac, AuthOp::Verify);

        let s = Session::configure(&[c.clone(), a.clone()], &caps).unwrap();
        assert_eq!(s.command_order(), CommandOrder::CipherHash);
        assert!(matches!(s.stages(), Stages::CipherHash(..)));
        assert_eq!(s.digest().unwrap().op, AuthOp::Verify);

        let s = Session::configure(&[a, c], &caps).unwrap();
        assert_eq!(s.command_order(), CommandOrder::HashCipher);
        assert!(matches!(s.stages(), Stages::HashCipher(..)));
        assert_eq!(s.iv().length, 16);
    }

    #[test]
    fn test_configure_auth_only_keeps_default_iv() {
        let caps = mock_caps();
        let s = Session::configure(&[auth_xform(AuthAlgo::Sha256Hmac, AuthOp::Generate)], &caps)
            .unwrap();
        assert_eq!(s.iv(), IvParams::default());
        let digest = s.digest().unwrap();
        assert_eq!(digest.digest_length, 32);
        assert_eq!(digest.ctx_len, 32);
        assert!(digest.is_natural_order());
    }

    #[test]
    fn test_configure_aead_derives_auth_op() {
        let caps = mock_caps();
        let s = Session::configure(&[aead_xform(CipherDir::Encrypt)], &caps).unwrap();
        let aead = s.aead().unwrap();
        assert_eq!(s.command_order(), CommandOrder::Combined);
        assert_eq!(aead.dir, CipherDir::Encrypt);
        assert_eq!(aead.digest.op, AuthOp::Generate);
        assert_eq!(aead.digest.aad_length, 8);
        assert_eq!(s.iv(), IvParams { offset: 0, length: 12 });
        assert!(!aead.digest.is_natural_order());

        let s = Session::configure(&[aead_xform(CipherDir::Decrypt)], &caps).unwrap();
        assert_eq!(s.digest().unwrap().op, AuthOp::Verify);
    }

    #[test]
    fn test_unknown_algorithm_stops_configuration() {
        let caps = mock_caps();
        let c = cipher_xform(CipherAlgo::Des3Cbc);
        let a = auth_xform(AuthAlgo::Sha256Hmac, AuthOp::Generate);
        assert!(matches!(
            Session::configure(&[c], &caps),
            Err(CcpError::UnsupportedCipher(CipherAlgo::Des3Cbc))
        ));

        // Cipher is fine, auth fails: no session.
        let bad = auth_xform(AuthAlgo::AesCmac, AuthOp::Generate);
        assert!(matches!(
            Session::configure(&[cipher_xform(CipherAlgo::AesCbc), bad], &caps),
            Err(CcpError::UnsupportedAuth(AuthAlgo::AesCmac))
        ));

        let empty = Capabilities::new();
        assert!(matches!(
            Session::configure(&[a], &empty),
            Err(CcpError::UnsupportedAuth(AuthAlgo::Sha256Hmac))
        ));
        assert!(matches!(
            Session::configure(&[aead_xform(CipherDir::Encrypt)], &empty),
            Err(CcpError::UnsupportedAead(AeadAlgo::AesGcm))
        ));
    }

    #[test]
    fn test_key_too_long() {
        let caps = mock_caps();
        let mut c = cipher_xform(CipherAlgo::AesCbc);
        if let Xform::Cipher(x) = &mut c {
            x.key = vec![0; MAX_KEY_SIZE + 1];
        }
        assert!(matches!(
            Session::configure(&[c], &caps),
            Err(CcpError::KeyTooLong { len: 65, max: 64 })
        ));
    }

    #[test]
    fn test_digest_must_fit_context() {
        let caps = mock_caps();
        let mut a = auth_xform(AuthAlgo::Sha256Hmac, AuthOp::Generate);
        if let Xform::Auth(x) = &mut a {
            x.digest_length = 33;
        }
        assert!(matches!(
            Session::configure(&[a], &caps),
            Err(CcpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_wrong_engine_rejected() {
        let mut caps = mock_caps();
        caps.register_cipher(
            CipherAlgo::AesCtr,
            crate::testutil::MockOps::sha(1, ShaType::Sha1, 20, 0),
        );
        assert!(matches!(
            Session::configure(&[cipher_xform(CipherAlgo::AesCtr)], &caps),
            Err(CcpError::InvalidEngine {
                engine: EngineType::Sha,
                stage: "cipher"
            })
        ));
    }
}
