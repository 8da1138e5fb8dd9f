// AMD CCP Crypto Offload Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Command queue register access.
//!
//! The engine only needs three registers per command queue: control, tail
//! and head. They are reached through the [`QueueDevice`] trait so that the
//! submission logic does not care whether the window is a real PCI BAR
//! mapping or a register file in a test.
//!
//! # Platform Support
//!
//! [`MmioDevice`] maps the BAR resource file exposed under
//! `/sys/bus/pci/devices/<bdf>/resource<N>` (or a UIO/VFIO equivalent) on
//! Linux. Elsewhere it returns `CcpError::PlatformNotSupported`.

use crate::error::CcpError;
use bitflags::bitflags;
use std::path::Path;

/// Queue control register.
pub const CMD_Q_CONTROL_BASE: u32 = 0x0000;
/// Tail address register, low 32 bits.
pub const CMD_Q_TAIL_LO_BASE: u32 = 0x0004;
/// Head address register, low 32 bits.
pub const CMD_Q_HEAD_LO_BASE: u32 = 0x0008;
/// Interrupt enable register.
pub const CMD_Q_INT_ENABLE_BASE: u32 = 0x000C;
/// Queue status register.
pub const CMD_Q_STATUS_BASE: u32 = 0x0100;

/// Offset of the first command queue window inside the BAR.
pub const CMD_Q_WINDOW_BASE: usize = 0x1000;
/// Distance between consecutive command queue windows.
pub const CMD_Q_WINDOW_STRIDE: usize = 0x1000;

/// Bit position of the queue size field in the control register.
pub const CMD_Q_SHIFT: u32 = 3;
/// Width mask of the queue size field.
pub const CMD_Q_SIZE_MASK: u32 = 0x1F;
/// Shift applied to bits [47:32] of the ring base in the control register.
pub const CMD_Q_BASE_HI_SHIFT: u32 = 16;

bitflags! {
    /// Control register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueueControl: u32 {
        /// Queue is allowed to fetch descriptors.
        const RUN = 1 << 0;
        /// Queue halted (read-only, set by hardware).
        const HALT = 1 << 1;
        /// Ring lives in device-local memory.
        const MEM_LOCAL = 1 << 2;
    }
}

/// Register window of one hardware command queue.
///
/// Implementations must make every access observable by the device in
/// program order; `write_reg` is never reordered before prior descriptor
/// stores once the caller has issued a write barrier.
pub trait QueueDevice: Send + Sync {
    /// Read a 32-bit queue register.
    fn read_reg(&self, offset: u32) -> u32;

    /// Write a 32-bit queue register.
    fn write_reg(&self, offset: u32, value: u32);

    /// Translate a host virtual address into the bus address the device uses.
    ///
    /// The default assumes IOVA-as-VA (IOMMU in pass-through or SVA mode).
    fn iova(&self, va: *const u8) -> u64 {
        va as u64
    }
}

// ============================================================================
// Linux Implementation
// ============================================================================

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    /// Memory-mapped register window of one command queue.
    pub struct MmioDevice {
        /// Base of the whole BAR mapping.
        mapping: *mut u8,
        /// Length of the BAR mapping.
        mapping_len: usize,
        /// Offset of this queue's window inside the mapping.
        window: usize,
    }

    // SAFETY: the mapping is owned by this struct, and register accesses are
    // single volatile 32-bit loads and stores which the device serializes.
    unsafe impl Send for MmioDevice {}

    // SAFETY: see above; no method hands out references into the mapping.
    unsafe impl Sync for MmioDevice {}

    impl MmioDevice {
        /// Map a BAR resource file and select command queue `queue`.
        ///
        /// # Errors
        ///
        /// Returns an error if:
        /// - The resource file cannot be opened (permissions, not found)
        /// - The BAR is too small to contain the queue window
        /// - Memory mapping fails
        pub fn open(path: &Path, queue: usize) -> Result<Self, CcpError> {
            let file = File::options()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        CcpError::PermissionDenied(path.display().to_string())
                    } else {
                        CcpError::Io(e)
                    }
                })?;

            let mapping_len = file.metadata()?.len() as usize;
            let window = CMD_Q_WINDOW_BASE + queue * CMD_Q_WINDOW_STRIDE;
            if window + CMD_Q_STATUS_BASE as usize + 4 > mapping_len {
                return Err(CcpError::InvalidArgument(format!(
                    "queue {} outside BAR of {} bytes",
                    queue, mapping_len
                )));
            }

            let mapping = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    mapping_len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    file.as_raw_fd(),
                    0,
                )
            };

            if mapping == libc::MAP_FAILED {
                return Err(CcpError::MmapFailed(format!(
                    "mmap failed for {}",
                    path.display()
                )));
            }

            // Unmap again if the queue turns out to be unusable.
            let guard = scopeguard::guard(mapping, |m| unsafe {
                libc::munmap(m, mapping_len);
            });

            // A window of all-ones means the function is in D3 or was removed.
            let status = unsafe {
                std::ptr::read_volatile(
                    (*guard as *const u8).add(window + CMD_Q_STATUS_BASE as usize) as *const u32,
                )
            };
            if status == u32::MAX {
                return Err(CcpError::InvalidArgument(format!(
                    "queue {} of {} does not respond",
                    queue,
                    path.display()
                )));
            }

            let mapping = scopeguard::ScopeGuard::into_inner(guard);
            log::info!("Mapped CCP command queue {} from {}", queue, path.display());
            Ok(Self {
                mapping: mapping as *mut u8,
                mapping_len,
                window,
            })
        }

        #[inline]
        fn reg_ptr(&self, offset: u32) -> *mut u32 {
            unsafe { self.mapping.add(self.window + offset as usize) as *mut u32 }
        }
    }

    impl QueueDevice for MmioDevice {
        fn read_reg(&self, offset: u32) -> u32 {
            unsafe { std::ptr::read_volatile(self.reg_ptr(offset)) }
        }

        fn write_reg(&self, offset: u32, value: u32) {
            unsafe { std::ptr::write_volatile(self.reg_ptr(offset), value) }
        }
    }

    impl Drop for MmioDevice {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.mapping as *mut libc::c_void, self.mapping_len);
            }
        }
    }
}

// ============================================================================
// Non-Linux Stub Implementation
// ============================================================================

#[cfg(not(target_os = "linux"))]
mod stub_impl {
    use super::*;

    /// Stub register window for non-Linux platforms.
    pub struct MmioDevice {
        _private: (),
    }

    impl MmioDevice {
        /// Attempting to map a queue on non-Linux returns an error.
        pub fn open(_path: &Path, _queue: usize) -> Result<Self, CcpError> {
            Err(CcpError::PlatformNotSupported)
        }
    }

    impl QueueDevice for MmioDevice {
        fn read_reg(&self, _offset: u32) -> u32 {
            u32::MAX
        }

        fn write_reg(&self, _offset: u32, _value: u32) {}
    }
}

#[cfg(target_os = "linux")]
pub use linux_impl::MmioDevice;

#[cfg(not(target_os = "linux"))]
pub use stub_impl::MmioDevice;
