// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Crypto operations and their data buffers.

use crate::error::{CcpError, CcpResult};
use crate::session::Session;
use std::sync::Arc;

/// Per-operation result reported by the harvester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// Not yet harvested.
    NotProcessed,
    /// Operation completed successfully.
    Success,
    /// Verify-mode digest did not match.
    AuthFailed,
    /// Result could not be extracted.
    Error,
}

impl OpStatus {
    /// Returns true if this status indicates success.
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Byte range of an operation's payload inside its packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataRange {
    pub offset: usize,
    pub length: usize,
}

impl DataRange {
    pub const fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// First byte past the range.
    #[inline]
    pub const fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Chain of data segments making up one packet.
///
/// The device appends its context after the payload of the last segment,
/// so growth and trimming happen there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketBuf {
    segments: Vec<Vec<u8>>,
}

impl PacketBuf {
    /// Single-segment packet.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            segments: vec![data],
        }
    }

    /// Multi-segment packet. An empty list yields one empty segment.
    pub fn from_segments(mut segments: Vec<Vec<u8>>) -> Self {
        if segments.is_empty() {
            segments.push(Vec::new());
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    /// Total payload length.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_segment(&self) -> &[u8] {
        self.segments.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Grow the last segment by `len` zeroed bytes and return them.
    pub fn append(&mut self, len: usize) -> &mut [u8] {
        if self.segments.is_empty() {
            self.segments.push(Vec::new());
        }
        let last = self.segments.len() - 1;
        let seg = &mut self.segments[last];
        let start = seg.len();
        seg.resize(start + len, 0);
        &mut seg[start..]
    }

    /// Drop `len` bytes from the end of the last segment.
    ///
    /// Returns false, leaving the packet untouched, if the last segment is
    /// shorter than `len`.
    pub fn trim(&mut self, len: usize) -> bool {
        match self.segments.last_mut() {
            Some(seg) if seg.len() >= len => {
                seg.truncate(seg.len() - len);
                true
            }
            _ => false,
        }
    }

    /// `len` bytes at packet offset `offset`, if they lie in one segment.
    pub fn contiguous(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let mut start = offset;
        for seg in &self.segments {
            if start < seg.len() || (start == seg.len() && len == 0) {
                return seg.get(start..start + len);
            }
            start -= seg.len();
        }
        None
    }

    /// Copy `data` into the packet at `offset`, crossing segments as needed.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> CcpResult<()> {
        if offset + data.len() > self.len() {
            return Err(CcpError::BufferSizeMismatch {
                expected: offset + data.len(),
                actual: self.len(),
            });
        }
        let mut skip = offset;
        let mut rest = data;
        for seg in &mut self.segments {
            if rest.is_empty() {
                break;
            }
            if skip >= seg.len() {
                skip -= seg.len();
                continue;
            }
            let n = (seg.len() - skip).min(rest.len());
            seg[skip..skip + n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            skip = 0;
        }
        Ok(())
    }

    /// Flatten the packet.
    pub fn to_vec(&self) -> Vec<u8> {
        self.segments.concat()
    }
}

/// One symmetric crypto operation.
#[derive(Debug, Clone)]
pub struct CryptoOp {
    session: Arc<Session>,
    src: PacketBuf,
    dst: Option<PacketBuf>,
    cipher: DataRange,
    auth: DataRange,
    aead: DataRange,
    iv: Vec<u8>,
    aad: Vec<u8>,
    digest: Option<Vec<u8>>,
    status: OpStatus,
}

impl CryptoOp {
    /// In-place operation over `src`.
    pub fn new(session: Arc<Session>, src: PacketBuf) -> Self {
        Self {
            session,
            src,
            dst: None,
            cipher: DataRange::default(),
            auth: DataRange::default(),
            aead: DataRange::default(),
            iv: Vec::new(),
            aad: Vec::new(),
            digest: None,
            status: OpStatus::NotProcessed,
        }
    }

    /// Write output to a separate packet.
    pub fn with_dst(mut self, dst: PacketBuf) -> Self {
        self.dst = Some(dst);
        self
    }

    pub fn with_cipher_range(mut self, range: DataRange) -> Self {
        self.cipher = range;
        self
    }

    pub fn with_auth_range(mut self, range: DataRange) -> Self {
        self.auth = range;
        self
    }

    pub fn with_aead_range(mut self, range: DataRange) -> Self {
        self.aead = range;
        self
    }

    /// Per-operation IV buffer; the session's IV offset indexes into it.
    pub fn with_iv(mut self, iv: Vec<u8>) -> Self {
        self.iv = iv;
        self
    }

    pub fn with_aad(mut self, aad: Vec<u8>) -> Self {
        self.aad = aad;
        self
    }

    /// Expected digest (verify) or destination for the digest (generate).
    pub fn with_digest(mut self, digest: Vec<u8>) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn src(&self) -> &PacketBuf {
        &self.src
    }

    pub fn src_mut(&mut self) -> &mut PacketBuf {
        &mut self.src
    }

    pub fn dst(&self) -> Option<&PacketBuf> {
        self.dst.as_ref()
    }

    /// Packet receiving output: the destination, or the source when in-place.
    pub fn out_mut(&mut self) -> &mut PacketBuf {
        self.dst.as_mut().unwrap_or(&mut self.src)
    }

    pub fn cipher_range(&self) -> DataRange {
        self.cipher
    }

    pub fn auth_range(&self) -> DataRange {
        self.auth
    }

    pub fn aead_range(&self) -> DataRange {
        self.aead
    }

    /// IV bytes selected by the session's IV offset and length.
    pub fn iv(&self) -> Option<&[u8]> {
        let iv = self.session.iv();
        self.iv.get(iv.offset..iv.offset + iv.length)
    }

    pub fn aad(&self) -> &[u8] {
        &self.aad
    }

    pub fn digest(&self) -> Option<&[u8]> {
        self.digest.as_deref()
    }

    pub(crate) fn digest_mut(&mut self) -> Option<&mut Vec<u8>> {
        self.digest.as_mut()
    }

    pub fn status(&self) -> OpStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: OpStatus) {
        self.status = status;
    }
}
