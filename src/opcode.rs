// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! CCP engine identifiers.
//!
//! Every descriptor names the fixed-function engine that executes it in
//! bits [23:20] of dword 0. The values match the `ccp_engine` numbering used
//! by the CCP v5 command queue.

/// CCP execution engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EngineType {
    /// AES (ECB/CBC/CTR/CFB/GCM/CMAC).
    Aes = 0,

    /// XTS-AES with 128-bit keys.
    XtsAes128 = 1,

    /// Triple DES.
    Des3 = 2,

    /// SHA-1, SHA-2 and SHA-3 family hashing.
    Sha = 3,

    /// RSA modular exponentiation.
    Rsa = 4,

    /// Pass-through (copy, bit-wise ops, byte swap).
    Passthru = 5,

    /// Zlib decompression.
    ZlibDecompress = 6,

    /// Elliptic curve operations.
    Ecc = 7,
}

impl EngineType {
    /// Returns the engine as a u8 value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns a human-readable name for the engine.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aes => "AES",
            Self::XtsAes128 => "XTS_AES_128",
            Self::Des3 => "DES3",
            Self::Sha => "SHA",
            Self::Rsa => "RSA",
            Self::Passthru => "PASSTHRU",
            Self::ZlibDecompress => "ZLIB_DECOMPRESS",
            Self::Ecc => "ECC",
        }
    }

    /// Engines that can run the cipher stage of a session.
    pub const fn is_cipher_engine(self) -> bool {
        matches!(self, Self::Aes | Self::XtsAes128 | Self::Des3 | Self::Passthru)
    }

    /// Engines that can produce a digest into the hardware context.
    pub const fn is_auth_engine(self) -> bool {
        matches!(self, Self::Sha | Self::Aes)
    }
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#03x})", self.name(), self.as_u8())
    }
}

/// Digest variants run by the SHA engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShaType {
    Sha1 = 1,
    Sha224 = 2,
    Sha256 = 3,
    Sha384 = 4,
    Sha512 = 5,
    Sha3_224 = 6,
    Sha3_256 = 7,
    Sha3_384 = 8,
    Sha3_512 = 9,
}

impl ShaType {
    /// The engine writes these digests into the context in host byte order.
    ///
    /// Every other variant, and every non-SHA engine, leaves the result
    /// byte-reversed.
    #[inline]
    pub const fn is_natural_order(self) -> bool {
        matches!(self, Self::Sha1 | Self::Sha224 | Self::Sha256)
    }
}
