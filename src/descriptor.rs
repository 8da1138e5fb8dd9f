// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! CCP v5 hardware descriptor layout.
//!
//! A command queue is a ring of 32-byte descriptors. The device consumes
//! them in order, advancing its head register, and never writes them back.

use crate::opcode::EngineType;
use bitflags::bitflags;

/// Size of one descriptor slot in the command ring.
pub const Q_DESC_SIZE: u32 = 32;

bitflags! {
    /// Single-bit controls in dword 0.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescriptorFlags: u32 {
        /// Stop the queue when this descriptor completes.
        const STOP_ON_COMPLETION = 1 << 0;
        /// Raise an interrupt when this descriptor completes.
        const INTERRUPT_ON_COMPLETION = 1 << 1;
        /// First descriptor of a multi-descriptor operation.
        const INIT = 1 << 3;
        /// Last descriptor of a multi-descriptor operation.
        const EOM = 1 << 4;
        /// Protected (secure) mode.
        const PROT = 1 << 24;
    }
}

const DW0_FLAG_MASK: u32 = 0x0100_001B;
const DW0_FUNCTION_SHIFT: u32 = 5;
const DW0_FUNCTION_MASK: u32 = 0x7FFF;
const DW0_ENGINE_SHIFT: u32 = 20;
const DW0_ENGINE_MASK: u32 = 0xF;

const HI_ADDR_MASK: u32 = 0xFFFF;
const MEM_TYPE_SHIFT: u32 = 16;
const LSB_CTX_SHIFT: u32 = 18;

/// Where an address field of a descriptor points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MemType {
    /// Host memory (bus address).
    System = 0,
    /// Local storage block inside the device.
    StorageBlock = 1,
    /// Device-local memory.
    Local = 2,
}

/// 32-byte CCP v5 descriptor.
///
/// | Dword | Content |
/// |-------|---------|
/// | 0 | flags, function [19:5], engine [23:20] |
/// | 1 | length |
/// | 2 | source address [31:0] |
/// | 3 | source address [47:32], source memory type, LSB context id |
/// | 4 | destination address [31:0] |
/// | 5 | destination address [47:32], destination memory type |
/// | 6 | key address [31:0] |
/// | 7 | key address [47:32], key memory type |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(32))]
pub struct CcpDesc {
    pub dw0: u32,
    pub length: u32,
    pub src_lo: u32,
    pub dw3: u32,
    pub dst_lo: u32,
    pub dw5: u32,
    pub key_lo: u32,
    pub dw7: u32,
}

impl CcpDesc {
    /// Create a new zeroed descriptor.
    #[inline]
    pub const fn new() -> Self {
        Self {
            dw0: 0,
            length: 0,
            src_lo: 0,
            dw3: 0,
            dst_lo: 0,
            dw5: 0,
            key_lo: 0,
            dw7: 0,
        }
    }

    /// Set the executing engine.
    #[inline]
    pub fn set_engine(&mut self, engine: EngineType) {
        self.dw0 = (self.dw0 & !(DW0_ENGINE_MASK << DW0_ENGINE_SHIFT))
            | ((engine.as_u8() as u32 & DW0_ENGINE_MASK) << DW0_ENGINE_SHIFT);
    }

    /// Get the raw engine field.
    #[inline]
    pub fn engine(&self) -> u8 {
        ((self.dw0 >> DW0_ENGINE_SHIFT) & DW0_ENGINE_MASK) as u8
    }

    /// Set the engine-specific function word.
    #[inline]
    pub fn set_function(&mut self, function: u16) {
        self.dw0 = (self.dw0 & !(DW0_FUNCTION_MASK << DW0_FUNCTION_SHIFT))
            | ((function as u32 & DW0_FUNCTION_MASK) << DW0_FUNCTION_SHIFT);
    }

    /// Get the function word.
    #[inline]
    pub fn function(&self) -> u16 {
        ((self.dw0 >> DW0_FUNCTION_SHIFT) & DW0_FUNCTION_MASK) as u16
    }

    /// Replace the dword 0 flags.
    #[inline]
    pub fn set_flags(&mut self, flags: DescriptorFlags) {
        self.dw0 = (self.dw0 & !DW0_FLAG_MASK) | (flags.bits() & DW0_FLAG_MASK);
    }

    /// Current dword 0 flags.
    #[inline]
    pub fn flags(&self) -> DescriptorFlags {
        DescriptorFlags::from_bits_truncate(self.dw0 & DW0_FLAG_MASK)
    }

    /// Set the source address.
    #[inline]
    pub fn set_src(&mut self, addr: u64, mem: MemType) {
        self.src_lo = addr as u32;
        self.dw3 = (self.dw3 & !(HI_ADDR_MASK | (0x3 << MEM_TYPE_SHIFT)))
            | ((addr >> 32) as u32 & HI_ADDR_MASK)
            | ((mem as u32) << MEM_TYPE_SHIFT);
    }

    /// Select the storage-block slot holding the engine context.
    #[inline]
    pub fn set_lsb_ctx_id(&mut self, id: u8) {
        self.dw3 = (self.dw3 & !(0xFF << LSB_CTX_SHIFT)) | ((id as u32) << LSB_CTX_SHIFT);
    }

    /// Set the destination address.
    #[inline]
    pub fn set_dst(&mut self, addr: u64, mem: MemType) {
        self.dst_lo = addr as u32;
        self.dw5 = ((addr >> 32) as u32 & HI_ADDR_MASK) | ((mem as u32) << MEM_TYPE_SHIFT);
    }

    /// Set the key address.
    #[inline]
    pub fn set_key(&mut self, addr: u64, mem: MemType) {
        self.key_lo = addr as u32;
        self.dw7 = ((addr >> 32) as u32 & HI_ADDR_MASK) | ((mem as u32) << MEM_TYPE_SHIFT);
    }

    /// Full 48-bit source address.
    #[inline]
    pub fn src_addr(&self) -> u64 {
        ((self.dw3 & HI_ADDR_MASK) as u64) << 32 | self.src_lo as u64
    }

    /// Full 48-bit destination address.
    #[inline]
    pub fn dst_addr(&self) -> u64 {
        ((self.dw5 & HI_ADDR_MASK) as u64) << 32 | self.dst_lo as u64
    }

    /// Create a pass-through copy descriptor between two host buffers.
    pub fn passthru(src: u64, dst: u64, len: u32) -> Self {
        let mut desc = Self::new();
        desc.set_engine(EngineType::Passthru);
        desc.set_flags(DescriptorFlags::INIT | DescriptorFlags::EOM);
        desc.length = len;
        desc.set_src(src, MemType::System);
        desc.set_dst(dst, MemType::System);
        desc
    }
}

impl Default for CcpDesc {
    fn default() -> Self {
        Self::new()
    }
}

const _: () = assert!(std::mem::size_of::<CcpDesc>() == Q_DESC_SIZE as usize);
const _: () = assert!(std::mem::align_of::<CcpDesc>() == 32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_size_and_alignment() {
        assert_eq!(std::mem::size_of::<CcpDesc>(), 32);
        assert_eq!(std::mem::align_of::<CcpDesc>(), 32);
    }

    #[test]
    fn test_engine_and_function_fields() {
        let mut desc = CcpDesc::new();
        desc.set_engine(EngineType::Sha);
        desc.set_function(0x1234);
        assert_eq!(desc.engine(), 3);
        assert_eq!(desc.function(), 0x1234);

        desc.set_engine(EngineType::Aes);
        assert_eq!(desc.engine(), 0);
        assert_eq!(desc.function(), 0x1234);
    }

    #[test]
    fn test_set_flags() {
        let mut desc = CcpDesc::new();
        desc.set_engine(EngineType::Passthru);
        desc.set_flags(DescriptorFlags::INIT | DescriptorFlags::EOM);

        assert_eq!(desc.engine(), 5);
        assert!(desc.flags().contains(DescriptorFlags::INIT));
        assert!(desc.flags().contains(DescriptorFlags::EOM));
        assert!(!desc.flags().contains(DescriptorFlags::INTERRUPT_ON_COMPLETION));
    }

    #[test]
    fn test_addresses() {
        let mut desc = CcpDesc::new();
        desc.set_src(0x0000_1234_5678_9ABC, MemType::System);
        desc.set_lsb_ctx_id(7);
        desc.set_dst(0x0000_0001_0000_0040, MemType::StorageBlock);

        assert_eq!(desc.src_addr(), 0x1234_5678_9ABC);
        assert_eq!(desc.dst_addr(), 0x1_0000_0040);
        assert_eq!((desc.dw3 >> 18) & 0xFF, 7);
        assert_eq!((desc.dw5 >> 16) & 0x3, MemType::StorageBlock as u32);
    }

    #[test]
    fn test_passthru() {
        let desc = CcpDesc::passthru(0x1000, 0x2000, 64);
        assert_eq!(desc.engine(), EngineType::Passthru.as_u8());
        assert_eq!(desc.length, 64);
        assert_eq!(desc.src_addr(), 0x1000);
        assert_eq!(desc.dst_addr(), 0x2000);
    }
}
