// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Descriptor slot estimation.

use crate::error::CcpResult;
use crate::session::{Session, Stages};

/// Number of ring descriptors one operation on `session` consumes.
///
/// Run before committing queue capacity. An error from a hook means the
/// algorithm cannot be costed and the session must not be used.
pub fn estimate_slots(session: &Session) -> CcpResult<usize> {
    let count = match session.stages() {
        Stages::Cipher(c) => c.hook().ops().slot_count(session)?,
        Stages::Auth(a) => a.hook().ops().slot_count(session)?,
        Stages::CipherHash(c, a) | Stages::HashCipher(a, c) => {
            c.hook().ops().slot_count(session)? + a.hook().ops().slot_count(session)?
        }
        Stages::Combined(x) => x.hook().ops().slot_count(session)?,
    };
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{AuthAlgo, CipherAlgo};
    use crate::error::CcpError;
    use crate::session::{AuthOp, CipherDir};
    use crate::testutil::{aead_xform, auth_xform, cipher_xform, mock_caps, MockOps};

    #[test]
    fn test_single_stage_costs() {
        let caps = mock_caps();
        let cipher = Session::configure(&[cipher_xform(CipherAlgo::AesCbc)], &caps).unwrap();
        let auth = Session::configure(&[auth_xform(AuthAlgo::Sha256Hmac, AuthOp::Generate)], &caps)
            .unwrap();
        let aead = Session::configure(&[aead_xform(CipherDir::Encrypt)], &caps).unwrap();

        assert_eq!(estimate_slots(&cipher).unwrap(), 1);
        assert_eq!(estimate_slots(&auth).unwrap(), 1);
        assert_eq!(estimate_slots(&aead).unwrap(), 3);
    }

    #[test]
    fn test_chained_cost_is_sum() {
        let mut caps = mock_caps();
        caps.register_cipher(CipherAlgo::AesCtr, MockOps::cipher(2));
        let c = cipher_xform(CipherAlgo::AesCtr);
        let a = auth_xform(AuthAlgo::Sha512, AuthOp::Generate);

        let cipher_only = Session::configure(&[c.clone()], &caps).unwrap();
        let auth_only = Session::configure(&[a.clone()], &caps).unwrap();
        let expected = estimate_slots(&cipher_only).unwrap() + estimate_slots(&auth_only).unwrap();

        let ch = Session::configure(&[c.clone(), a.clone()], &caps).unwrap();
        let hc = Session::configure(&[a, c], &caps).unwrap();
        assert_eq!(estimate_slots(&ch).unwrap(), expected);
        assert_eq!(estimate_slots(&hc).unwrap(), expected);
        assert_eq!(expected, 4);
    }

    #[test]
    fn test_uncostable_algorithm() {
        let mut caps = mock_caps();
        caps.register_cipher(CipherAlgo::AesEcb, MockOps::cipher(1).uncostable());
        let s = Session::configure(&[cipher_xform(CipherAlgo::AesEcb)], &caps).unwrap();
        assert!(matches!(
            estimate_slots(&s),
            Err(CcpError::UnsupportedCipher(CipherAlgo::AesEcb))
        ));
    }
}
