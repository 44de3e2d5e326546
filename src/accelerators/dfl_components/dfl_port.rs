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

//! User API of a DFL port character device (`/dev/dfl-port.N`).
//!
//! The structures and request numbers mirror `include/uapi/linux/fpga-dfl.h`. All
//! requests are `_IO(DFL_FPGA_MAGIC, nr)`, so the number encodes neither direction nor
//! size; the `argsz` field of each structure carries the size instead.
//!
//! | Request | Purpose |
//! |---------|---------|
//! | `DFL_FPGA_GET_API_VERSION` | driver API version, must be 0 |
//! | `DFL_FPGA_PORT_RESET` | reset the port and its AFU |
//! | `DFL_FPGA_PORT_GET_INFO` | number of MMIO regions |
//! | `DFL_FPGA_PORT_GET_REGION_INFO` | size, offset and flags of one MMIO region |
//! | `DFL_FPGA_PORT_DMA_MAP` | pin a user buffer and return its IOVA |
//! | `DFL_FPGA_PORT_DMA_UNMAP` | undo a DMA map |

// ioctl request numbers are narrowed to the platform's request type
#![allow(clippy::cast_possible_truncation)]

use crate::error::AfuError;
use crate::shared_memory::DmaRelease;
use crate::system_io::{DeviceAccess, fs_open_device};
use log::{debug, trace};
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DFL_FPGA_MAGIC: u64 = 0xB6;
const DFL_FPGA_BASE: u64 = 0;
const DFL_PORT_BASE: u64 = 0x40;

/// `_IO(type, nr)` from `asm-generic/ioctl.h`
const fn io(nr: u64) -> u64 {
    (DFL_FPGA_MAGIC << 8) | nr
}

pub const DFL_FPGA_API_VERSION: i32 = 0;

pub const DFL_FPGA_GET_API_VERSION: u64 = io(DFL_FPGA_BASE);
pub const DFL_FPGA_PORT_RESET: u64 = io(DFL_PORT_BASE);
pub const DFL_FPGA_PORT_GET_INFO: u64 = io(DFL_PORT_BASE + 1);
pub const DFL_FPGA_PORT_GET_REGION_INFO: u64 = io(DFL_PORT_BASE + 2);
pub const DFL_FPGA_PORT_DMA_MAP: u64 = io(DFL_PORT_BASE + 3);
pub const DFL_FPGA_PORT_DMA_UNMAP: u64 = io(DFL_PORT_BASE + 4);

/// A port belongs to one process at a time, as with OPAE's default `fpgaOpen`.
pub const PORT_ACCESS: DeviceAccess = DeviceAccess::Exclusive;

/// Region index of the AFU MMIO space.
pub const DFL_PORT_REGION_INDEX_AFU: u32 = 0;

pub const DFL_PORT_REGION_READ: u32 = 1 << 0;
pub const DFL_PORT_REGION_WRITE: u32 = 1 << 1;
pub const DFL_PORT_REGION_MMAP: u32 = 1 << 2;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DflFpgaPortInfo {
    pub argsz: u32,
    pub flags: u32,
    pub num_regions: u32,
    pub num_umsgs: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DflFpgaPortRegionInfo {
    pub argsz: u32,
    pub flags: u32,
    pub index: u32,
    pub padding: u32,
    pub size: u64,
    pub offset: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DflFpgaPortDmaMap {
    pub argsz: u32,
    pub flags: u32,
    pub user_addr: u64,
    pub length: u64,
    pub iova: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DflFpgaPortDmaUnmap {
    pub argsz: u32,
    pub flags: u32,
    pub iova: u64,
}

/// An open port device.
#[derive(Debug)]
pub struct DflPort {
    file: File,
    path: PathBuf,
}

impl DflPort {
    /// Open the port device exclusively. `EBUSY` from the driver becomes
    /// [`AfuError::Busy`].
    pub fn open(path: &Path) -> Result<Self, AfuError> {
        let file = fs_open_device(path, PORT_ACCESS).map_err(busy_on_ebusy)?;
        Ok(DflPort {
            file,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    fn ioctl<T>(&self, request_name: &'static str, request: u64, arg: *mut T) -> Result<i32, AfuError> {
        trace!("ioctl {request_name} ({request:#x}) on {:?}", self.path);
        // SAFETY: `request` is one of the DFL port requests and `arg` is either null (for
        // requests without an argument) or points to the repr(C) structure the kernel
        // expects for it, with argsz set to its size.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg) };
        if ret < 0 {
            return Err(AfuError::Ioctl {
                request: request_name,
                device: self.path.clone(),
                e: std::io::Error::last_os_error(),
            });
        }
        Ok(ret)
    }

    pub fn api_version(&self) -> Result<i32, AfuError> {
        self.ioctl::<libc::c_void>(
            "DFL_FPGA_GET_API_VERSION",
            DFL_FPGA_GET_API_VERSION,
            std::ptr::null_mut(),
        )
    }

    /// Check that the driver speaks the API this crate was written for.
    pub fn check_api_version(&self) -> Result<(), AfuError> {
        let version = self.api_version()?;
        if version != DFL_FPGA_API_VERSION {
            return Err(AfuError::NoDriver(format!(
                "{:?} reports DFL API version {version}, expected {DFL_FPGA_API_VERSION}",
                self.path
            )));
        }
        Ok(())
    }

    pub fn reset(&self) -> Result<(), AfuError> {
        self.ioctl::<libc::c_void>("DFL_FPGA_PORT_RESET", DFL_FPGA_PORT_RESET, std::ptr::null_mut())?;
        debug!("Reset {:?}", self.path);
        Ok(())
    }

    pub fn info(&self) -> Result<DflFpgaPortInfo, AfuError> {
        let mut info = DflFpgaPortInfo {
            argsz: size_of::<DflFpgaPortInfo>() as u32,
            ..Default::default()
        };
        self.ioctl("DFL_FPGA_PORT_GET_INFO", DFL_FPGA_PORT_GET_INFO, &raw mut info)?;
        Ok(info)
    }

    pub fn region_info(&self, index: u32) -> Result<DflFpgaPortRegionInfo, AfuError> {
        let mut region = DflFpgaPortRegionInfo {
            argsz: size_of::<DflFpgaPortRegionInfo>() as u32,
            index,
            ..Default::default()
        };
        self.ioctl(
            "DFL_FPGA_PORT_GET_REGION_INFO",
            DFL_FPGA_PORT_GET_REGION_INFO,
            &raw mut region,
        )?;
        debug!(
            "Region {index} of {:?}: size={:#x} offset={:#x} flags={:#x}",
            self.path, region.size, region.offset, region.flags
        );
        Ok(region)
    }

    /// Pin `length` bytes at `user_addr` and return the IOVA the device must use.
    pub fn dma_map(&self, user_addr: u64, length: u64) -> Result<u64, AfuError> {
        let mut map = DflFpgaPortDmaMap {
            argsz: size_of::<DflFpgaPortDmaMap>() as u32,
            user_addr,
            length,
            ..Default::default()
        };
        self.ioctl("DFL_FPGA_PORT_DMA_MAP", DFL_FPGA_PORT_DMA_MAP, &raw mut map)?;
        trace!("DMA map va={user_addr:#x} len={length:#x} -> iova={:#x}", map.iova);
        Ok(map.iova)
    }

    pub fn dma_unmap(&self, iova: u64) -> Result<(), AfuError> {
        let mut unmap = DflFpgaPortDmaUnmap {
            argsz: size_of::<DflFpgaPortDmaUnmap>() as u32,
            iova,
            ..Default::default()
        };
        self.ioctl("DFL_FPGA_PORT_DMA_UNMAP", DFL_FPGA_PORT_DMA_UNMAP, &raw mut unmap)?;
        trace!("DMA unmap iova={iova:#x}");
        Ok(())
    }
}

fn busy_on_ebusy(error: AfuError) -> AfuError {
    match error {
        AfuError::IOOpen { file, e } if e.raw_os_error() == Some(libc::EBUSY) => {
            AfuError::Busy(format!("{file:?} is in use"))
        }
        other => other,
    }
}

/// Releases a DMA mapping through the port that created it.
#[derive(Debug)]
pub struct DflDmaRelease {
    pub(crate) port: Arc<DflPort>,
}

impl DmaRelease for DflDmaRelease {
    fn release(&self, io_address: u64) -> Result<(), AfuError> {
        self.port.dma_unmap(io_address)
    }
}
