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

//! DFL backend: accelerators driven by the Linux Device Feature List framework.
//!
//! This is the backend for PCIe FPGA cards whose accelerators appear as
//! `/dev/dfl-port.N`. It needs no vendor userspace library; everything goes through
//! sysfs and the port's character device.
//!
//! # Opening an accelerator
//!
//! 1. Scan `<fpga_region_dir>/region*/dfl-port.*/afu_id` for the configured AFU id
//! 2. Open `<device_dir>/<port>` read/write with `O_EXCL`; a port that answers `EBUSY`
//!    is skipped
//! 3. Check the driver API version
//! 4. Query region 0 (the AFU MMIO space) and map it
//!
//! If every matching port is busy the result is [`AfuError::Busy`].
//!
//! # Shared buffers
//!
//! [`Afu::prepare_buffer`] allocates host memory (see
//! [`shared_memory`](crate::shared_memory)) and pins it with `DFL_FPGA_PORT_DMA_MAP`. The
//! returned buffer unmaps itself through the same port when released or dropped.

use crate::accelerators::accelerator::Afu;
use crate::accelerators::dfl_components::dfl_discovery::find_ports;
use crate::accelerators::dfl_components::dfl_port::{
    DFL_PORT_REGION_INDEX_AFU, DFL_PORT_REGION_MMAP, DFL_PORT_REGION_READ, DFL_PORT_REGION_WRITE,
    DflDmaRelease, DflPort,
};
use crate::config::{self, AcceleratorConfig};
use crate::error::AfuError;
use crate::mmio::MmioRegion;
use crate::shared_memory::{HostMemory, SharedBuffer};
use afu_dma_macros::backend;
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

#[backend(name = "dfl")]
#[derive(Debug)]
pub struct DflAccelerator {
    handle: String,
    afu_id: String,
    port: Arc<DflPort>,
    mmio: MmioRegion,
    use_hugepages: bool,
}

impl DflAccelerator {
    /// Find and open the accelerator described by `config` using the configured system
    /// paths.
    pub fn open(config: &AcceleratorConfig) -> Result<Self, AfuError> {
        let region_dir = config::fpga_region_dir()?;
        let device_dir = config::device_dir()?;
        Self::open_in(Path::new(&region_dir), Path::new(&device_dir), config)
    }

    /// Find and open an accelerator below explicit sysfs and device directories.
    pub fn open_in(
        region_dir: &Path,
        device_dir: &Path,
        config: &AcceleratorConfig,
    ) -> Result<Self, AfuError> {
        Self::open_with(region_dir, device_dir, config, DflPort::open)
    }

    /// Like [`open_in`](Self::open_in), with `open_port` opening each candidate device.
    fn open_with(
        region_dir: &Path,
        device_dir: &Path,
        config: &AcceleratorConfig,
        open_port: impl Fn(&Path) -> Result<DflPort, AfuError>,
    ) -> Result<Self, AfuError> {
        let candidates = find_ports(region_dir, &config.uuid)?;
        let mut busy = Vec::new();

        for candidate in candidates {
            let device_path = device_dir.join(&candidate.handle);
            let port = match open_port(&device_path) {
                Ok(port) => port,
                Err(AfuError::Busy(reason)) => {
                    warn!("Skipping {}: {reason}", candidate.handle);
                    busy.push(candidate.handle);
                    continue;
                }
                Err(e) => return Err(e),
            };
            port.check_api_version()?;

            let region = port.region_info(DFL_PORT_REGION_INDEX_AFU)?;
            let required = DFL_PORT_REGION_READ | DFL_PORT_REGION_WRITE | DFL_PORT_REGION_MMAP;
            if region.flags & required != required {
                return Err(AfuError::Internal(format!(
                    "AFU region of {device_path:?} cannot be mapped for read/write (flags {:#x})",
                    region.flags
                )));
            }
            let mmio = MmioRegion::map(port.file(), &device_path, region.offset, region.size as usize)?;

            info!(
                "Opened accelerator {} ({}) in {}",
                candidate.handle, config.uuid, candidate.region
            );
            return Ok(DflAccelerator {
                handle: candidate.handle,
                afu_id: config.uuid.clone(),
                port: Arc::new(port),
                mmio,
                use_hugepages: config.use_hugepages,
            });
        }

        Err(AfuError::Busy(format!(
            "every port with accelerator {} is in use: {}",
            config.uuid,
            busy.join(", ")
        )))
    }
}

impl Afu for DflAccelerator {
    fn handle(&self) -> &str {
        &self.handle
    }

    fn afu_id(&self) -> Result<String, AfuError> {
        Ok(self.afu_id.clone())
    }

    fn reset(&self) -> Result<(), AfuError> {
        self.port.reset()
    }

    fn read_mmio64(&self, offset: u64) -> Result<u64, AfuError> {
        self.mmio.read64(offset)
    }

    fn write_mmio64(&self, offset: u64, value: u64) -> Result<(), AfuError> {
        self.mmio.write64(offset, value)
    }

    fn read_mmio32(&self, offset: u64) -> Result<u32, AfuError> {
        self.mmio.read32(offset)
    }

    fn write_mmio32(&self, offset: u64, value: u32) -> Result<(), AfuError> {
        self.mmio.write32(offset, value)
    }

    fn prepare_buffer(&self, len: usize) -> Result<SharedBuffer, AfuError> {
        let memory = Arc::new(HostMemory::allocate(len, self.use_hugepages)?);
        let iova = self
            .port
            .dma_map(memory.virtual_address(), memory.len() as u64)?;
        Ok(SharedBuffer::new(
            memory,
            iova,
            Some(Box::new(DflDmaRelease {
                port: self.port.clone(),
            })),
        ))
    }
}
