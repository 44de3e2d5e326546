// This file is part of afu-dma, a host driver for FPGA DMA accelerators exposed through the Linux DFL subsystem.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// afu-dma is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// afu-dma is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! MMIO register map of the DMA accelerator and access to a mapped MMIO region.
//!
//! The RTL addresses its registers in 32-bit words. Software accesses the AFU region by
//! byte offset, so every register's byte offset is its word index times
//! [`MMIO_WORD_BYTES`]. The DMA registers are 64 bits wide and therefore sit on even word
//! indices.
//!
//! | Register      | Word   | Byte  | Access |
//! |---------------|--------|-------|--------|
//! | `go`          | 0x0050 | 0x140 | write 1 to start |
//! | `rd_addr`     | 0x0052 | 0x148 | source address |
//! | `wr_addr`     | 0x0054 | 0x150 | destination address |
//! | `size`        | 0x0056 | 0x158 | transfer length in cache lines |
//! | `done`        | 0x0058 | 0x160 | non-zero once the transfer finished |
//! | `reset_count` | 0x0060 | 0x180 | number of resets seen by the AFU |

// MMIO registers are naturally aligned by hardware; offsets are checked before every cast
#![allow(clippy::cast_ptr_alignment)]

use crate::error::AfuError;
use log::{debug, trace};
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Bytes in one cache line, the unit the DMA engine transfers.
pub const CL_BYTES: usize = 64;

/// Bytes per register address unit of the RTL.
pub const MMIO_WORD_BYTES: u64 = 4;

/// Byte offsets of the device feature header every AFU exposes at the start of its region.
pub mod dfh {
    /// Device feature header
    pub const AFU_DFH: u64 = 0x0000;
    /// Lower 64 bits of the AFU id
    pub const AFU_ID_L: u64 = 0x0008;
    /// Upper 64 bits of the AFU id
    pub const AFU_ID_H: u64 = 0x0010;
}

/// Default word indices of the DMA registers.
pub mod defaults {
    pub const GO: u64 = 0x0050;
    pub const RD_ADDR: u64 = 0x0052;
    pub const WR_ADDR: u64 = 0x0054;
    pub const SIZE: u64 = 0x0056;
    pub const DONE: u64 = 0x0058;
    pub const RESET_COUNT: u64 = 0x0060;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaRegister {
    Go,
    RdAddr,
    WrAddr,
    Size,
    Done,
    ResetCount,
}

impl DmaRegister {
    pub const ALL: [DmaRegister; 6] = [
        DmaRegister::Go,
        DmaRegister::RdAddr,
        DmaRegister::WrAddr,
        DmaRegister::Size,
        DmaRegister::Done,
        DmaRegister::ResetCount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DmaRegister::Go => "go",
            DmaRegister::RdAddr => "rd_addr",
            DmaRegister::WrAddr => "wr_addr",
            DmaRegister::Size => "size",
            DmaRegister::Done => "done",
            DmaRegister::ResetCount => "reset_count",
        }
    }
}

/// Word indices of the DMA registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMap {
    pub go: u64,
    pub rd_addr: u64,
    pub wr_addr: u64,
    pub size: u64,
    pub done: u64,
    pub reset_count: u64,
}

impl Default for RegisterMap {
    fn default() -> Self {
        RegisterMap {
            go: defaults::GO,
            rd_addr: defaults::RD_ADDR,
            wr_addr: defaults::WR_ADDR,
            size: defaults::SIZE,
            done: defaults::DONE,
            reset_count: defaults::RESET_COUNT,
        }
    }
}

impl RegisterMap {
    pub fn word(&self, register: DmaRegister) -> u64 {
        match register {
            DmaRegister::Go => self.go,
            DmaRegister::RdAddr => self.rd_addr,
            DmaRegister::WrAddr => self.wr_addr,
            DmaRegister::Size => self.size,
            DmaRegister::Done => self.done,
            DmaRegister::ResetCount => self.reset_count,
        }
    }

    /// Byte offset of `register` inside the AFU MMIO region. Saturates for word indices
    /// that [`validate`](Self::validate) rejects.
    pub fn offset(&self, register: DmaRegister) -> u64 {
        self.word(register).saturating_mul(MMIO_WORD_BYTES)
    }

    /// Which register, if any, lives at `byte_offset`.
    pub fn identify(&self, byte_offset: u64) -> Option<DmaRegister> {
        DmaRegister::ALL
            .into_iter()
            .find(|register| self.offset(*register) == byte_offset)
    }

    /// Registers must be 64-bit aligned, distinct and clear of the feature header.
    pub fn validate(&self) -> Result<(), AfuError> {
        if let Some(register) = DmaRegister::ALL
            .into_iter()
            .find(|register| self.word(*register).checked_mul(MMIO_WORD_BYTES).is_none())
        {
            return Err(AfuError::Argument(format!(
                "register {} at word {:#x} is beyond the MMIO address space",
                register.name(),
                self.word(register)
            )));
        }
        for (i, register) in DmaRegister::ALL.into_iter().enumerate() {
            let offset = self.offset(register);
            if offset % 8 != 0 {
                return Err(AfuError::Argument(format!(
                    "register {} at word {:#x} is not 64-bit aligned",
                    register.name(),
                    self.word(register)
                )));
            }
            if offset <= dfh::AFU_ID_H {
                return Err(AfuError::Argument(format!(
                    "register {} at word {:#x} overlaps the device feature header",
                    register.name(),
                    self.word(register)
                )));
            }
            if let Some(other) = DmaRegister::ALL[i + 1..]
                .iter()
                .find(|other| self.offset(**other) == offset)
            {
                return Err(AfuError::Argument(format!(
                    "registers {} and {} share word {:#x}",
                    register.name(),
                    other.name(),
                    self.word(register)
                )));
            }
        }
        Ok(())
    }
}

/// Number of cache lines needed to hold `bytes`.
pub fn cache_lines(bytes: usize) -> u64 {
    bytes.div_ceil(CL_BYTES) as u64
}

/// Check that an access of `width` bytes at `offset` is aligned and inside a region of
/// `region_len` bytes.
pub fn check_access(offset: u64, width: u64, region_len: u64) -> Result<(), AfuError> {
    if offset % width != 0 {
        return Err(AfuError::Mmio {
            offset,
            reason: format!("not aligned to {width} bytes"),
        });
    }
    match offset.checked_add(width) {
        Some(end) if end <= region_len => Ok(()),
        _ => Err(AfuError::Mmio {
            offset,
            reason: format!("outside the {region_len:#x} byte MMIO region"),
        }),
    }
}

/// A mapped MMIO region.
pub struct MmioRegion {
    ptr: *mut u8,
    len: usize,
}

impl std::fmt::Debug for MmioRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmioRegion")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("len", &self.len)
            .finish()
    }
}

// SAFETY: the region is owned exclusively and only accessed through volatile reads and
// writes of naturally aligned words; the mapping is valid in every thread of the process.
unsafe impl Send for MmioRegion {}
// SAFETY: see above; register accesses do not create references into the mapping.
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Map `len` bytes of `device` starting at `offset`.
    pub fn map(device: &File, device_path: &Path, offset: u64, len: usize) -> Result<Self, AfuError> {
        // SAFETY: a fresh shared mapping of a device file; the kernel validates offset and
        // length and returns MAP_FAILED on error.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                device.as_raw_fd(),
                offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(AfuError::Mmap {
                len,
                e: std::io::Error::last_os_error(),
            });
        }
        debug!("Mapped {len:#x} bytes of MMIO from {device_path:?} at {ptr:p}");
        Ok(MmioRegion {
            ptr: ptr.cast::<u8>(),
            len,
        })
    }

    /// Anonymous read/write mapping standing in for a device in tests.
    #[cfg(test)]
    pub(crate) fn anonymous(len: usize) -> Result<Self, AfuError> {
        // SAFETY: anonymous private mapping, no file involved.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(AfuError::Mmap {
                len,
                e: std::io::Error::last_os_error(),
            });
        }
        Ok(MmioRegion {
            ptr: ptr.cast::<u8>(),
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read32(&self, offset: u64) -> Result<u32, AfuError> {
        check_access(offset, 4, self.len as u64)?;
        // SAFETY: offset checked to be 4-byte aligned and inside the mapping
        let value = unsafe { std::ptr::read_volatile(self.ptr.add(offset as usize).cast::<u32>()) };
        trace!("mmio read32 {offset:#x} -> {value:#x}");
        Ok(value)
    }

    pub fn write32(&self, offset: u64, value: u32) -> Result<(), AfuError> {
        check_access(offset, 4, self.len as u64)?;
        trace!("mmio write32 {offset:#x} <- {value:#x}");
        // SAFETY: offset checked to be 4-byte aligned and inside the mapping
        unsafe { std::ptr::write_volatile(self.ptr.add(offset as usize).cast::<u32>(), value) };
        Ok(())
    }

    pub fn read64(&self, offset: u64) -> Result<u64, AfuError> {
        check_access(offset, 8, self.len as u64)?;
        // SAFETY: offset checked to be 8-byte aligned and inside the mapping
        let value = unsafe { std::ptr::read_volatile(self.ptr.add(offset as usize).cast::<u64>()) };
        trace!("mmio read64 {offset:#x} -> {value:#x}");
        Ok(value)
    }

    pub fn write64(&self, offset: u64, value: u64) -> Result<(), AfuError> {
        check_access(offset, 8, self.len as u64)?;
        trace!("mmio write64 {offset:#x} <- {value:#x}");
        // SAFETY: offset checked to be 8-byte aligned and inside the mapping
        unsafe { std::ptr::write_volatile(self.ptr.add(offset as usize).cast::<u64>(), value) };
        Ok(())
    }
}

impl Drop for MmioRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe the mapping created in map()
        unsafe {
            libc::munmap(self.ptr.cast::<libc::c_void>(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_byte_offsets() {
        let map = RegisterMap::default();
        assert_eq!(map.offset(DmaRegister::Go), 0x140);
        assert_eq!(map.offset(DmaRegister::RdAddr), 0x148);
        assert_eq!(map.offset(DmaRegister::WrAddr), 0x150);
        assert_eq!(map.offset(DmaRegister::Size), 0x158);
        assert_eq!(map.offset(DmaRegister::Done), 0x160);
        assert_eq!(map.offset(DmaRegister::ResetCount), 0x180);
        assert!(map.validate().is_ok());
    }

    #[test]
    fn test_identify() {
        let map = RegisterMap::default();
        assert_eq!(map.identify(0x160), Some(DmaRegister::Done));
        assert_eq!(map.identify(0x164), None);
    }

    #[test]
    fn test_validate_rejects_odd_word() {
        let map = RegisterMap {
            go: 0x51,
            ..RegisterMap::default()
        };
        assert!(matches!(map.validate(), Err(AfuError::Argument(_))));
    }

    #[test]
    fn test_validate_rejects_shared_word() {
        let map = RegisterMap {
            done: defaults::GO,
            ..RegisterMap::default()
        };
        assert!(matches!(map.validate(), Err(AfuError::Argument(_))));
    }

    #[test]
    fn test_validate_rejects_header_overlap() {
        let map = RegisterMap {
            go: 0x2,
            ..RegisterMap::default()
        };
        assert!(matches!(map.validate(), Err(AfuError::Argument(_))));
    }

    #[test]
    fn test_validate_rejects_word_past_address_space() {
        let map = RegisterMap {
            size: 0x4000_0000_0000_0000,
            ..RegisterMap::default()
        };
        assert_eq!(map.offset(DmaRegister::Size), u64::MAX);
        assert!(matches!(map.validate(), Err(AfuError::Argument(_))));
    }

    #[test]
    fn test_cache_lines_rounds_up() {
        assert_eq!(cache_lines(0), 0);
        assert_eq!(cache_lines(1), 1);
        assert_eq!(cache_lines(64), 1);
        assert_eq!(cache_lines(65), 2);
        assert_eq!(cache_lines(8192 * 4), 512);
    }

    #[test]
    fn test_check_access() {
        assert!(check_access(0x140, 8, 0x1000).is_ok());
        assert!(check_access(0x144, 8, 0x1000).is_err());
        assert!(check_access(0xff8, 8, 0x1000).is_ok());
        assert!(check_access(0x1000, 8, 0x1000).is_err());
        assert!(check_access(u64::MAX - 3, 4, u64::MAX).is_err());
    }

    #[test]
    fn test_region_round_trip_and_bounds() {
        let region = MmioRegion::anonymous(0x1000).unwrap();
        region.write64(0x148, 0xdead_beef_0000_0040).unwrap();
        assert_eq!(region.read64(0x148).unwrap(), 0xdead_beef_0000_0040);
        region.write32(0x10, 7).unwrap();
        assert_eq!(region.read32(0x10).unwrap(), 7);
        assert!(matches!(region.read64(0x1000), Err(AfuError::Mmio { .. })));
        assert!(matches!(region.write32(0x3, 1), Err(AfuError::Mmio { .. })));
    }
}
