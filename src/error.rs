// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Error types for CCP session setup and queue operations.

use crate::caps::{AeadAlgo, AuthAlgo, CipherAlgo};
use crate::opcode::EngineType;
use thiserror::Error;

/// Errors that can occur while configuring sessions or driving a command queue.
#[derive(Debug, Error)]
pub enum CcpError {
    /// Transform chain shape has no command order.
    #[error("unsupported transform chain")]
    UnsupportedChain,

    /// No descriptor builder registered for the cipher algorithm.
    #[error("unsupported cipher algorithm: {0:?}")]
    UnsupportedCipher(CipherAlgo),

    /// No descriptor builder registered for the auth algorithm.
    #[error("unsupported auth algorithm: {0:?}")]
    UnsupportedAuth(AuthAlgo),

    /// No descriptor builder registered for the AEAD algorithm.
    #[error("unsupported aead algorithm: {0:?}")]
    UnsupportedAead(AeadAlgo),

    /// Algorithm hook reported an engine that cannot serve the stage.
    #[error("invalid CCP engine {engine} for {stage} stage")]
    InvalidEngine {
        engine: EngineType,
        stage: &'static str,
    },

    /// Key does not fit the session key buffer.
    #[error("key too long: {len} bytes, maximum {max}")]
    KeyTooLong { len: usize, max: usize },

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Every batch object is in flight.
    #[error("batch pool exhausted")]
    BatchPoolExhausted,

    /// Not enough free descriptor slots on the command queue.
    #[error("insufficient ring slots: required {required}, available {available}")]
    InsufficientSlots { required: usize, available: i64 },

    /// A descriptor builder tried to write past the reserved ring space.
    #[error("command ring full")]
    RingFull,

    /// The harvesting side of the queue pair was dropped.
    #[error("batch hand-off channel disconnected")]
    HandoffDisconnected,

    /// Buffer size mismatch.
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// I/O error from system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Platform not supported.
    #[error("platform not supported: CCP register access requires Linux")]
    PlatformNotSupported,

    /// Permission denied accessing the device.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Memory mapping failed.
    #[error("mmap failed: {0}")]
    MmapFailed(String),
}

/// Broad classes of [`CcpError`], used by callers to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Session or queue setup is invalid; do not submit on it.
    Configuration,
    /// Out of batches or ring slots; retry later.
    Capacity,
    /// The engine reached a state it should never reach.
    Internal,
    /// Device access failed.
    Platform,
}

impl CcpError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedChain
            | Self::UnsupportedCipher(_)
            | Self::UnsupportedAuth(_)
            | Self::UnsupportedAead(_)
            | Self::InvalidEngine { .. }
            | Self::KeyTooLong { .. }
            | Self::InvalidArgument(_)
            | Self::BufferSizeMismatch { .. } => ErrorKind::Configuration,
            Self::BatchPoolExhausted | Self::InsufficientSlots { .. } | Self::RingFull => {
                ErrorKind::Capacity
            }
            Self::HandoffDisconnected => ErrorKind::Internal,
            Self::Io(_)
            | Self::PlatformNotSupported
            | Self::PermissionDenied(_)
            | Self::MmapFailed(_) => ErrorKind::Platform,
        }
    }

    /// Returns true if retrying the same request later may succeed.
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Capacity
    }
}

/// Result type alias for CCP operations.
pub type CcpResult<T> = Result<T, CcpError>;
