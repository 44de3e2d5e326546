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

//! Simulated backend: a software model of the DMA loopback accelerator.
//!
//! The model keeps its registers in memory and performs transfers with plain memory
//! copies between the shared buffers it handed out. It behaves like the RTL as far as
//! the host can observe:
//!
//! * `AFU_DFH`, `AFU_ID_L` and `AFU_ID_H` describe an AFU carrying the configured id
//! * writing a non-zero value to `go` clears `done` and starts a transfer of `size`
//!   cache lines from `rd_addr` to `wr_addr`
//! * `done` reads 0 for `completion_polls` reads, then the copy happens and it reads 1
//! * a transfer touching memory outside the handed out buffers is dropped and `done`
//!   never asserts
//! * a reset clears the DMA registers and increments `reset_count`
//!
//! Addresses are resolved against each buffer's IOVA or virtual address, following the
//! configured [`AddressMode`].

use crate::accelerators::accelerator::{Afu, format_afu_id, parse_afu_id};
use crate::config::{AcceleratorConfig, AddressMode};
use crate::error::AfuError;
use crate::mmio::{CL_BYTES, DmaRegister, RegisterMap, check_access, dfh};
use crate::shared_memory::{DmaRelease, HostMemory, SharedBuffer};
use afu_dma_macros::backend;
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Size of the simulated AFU MMIO region.
pub const SIM_MMIO_BYTES: u64 = 256 * 1024;

/// First IOVA handed out.
pub const SIM_IOVA_BASE: u64 = 0x1_0000_0000;

pub static SIM_HANDLE: &str = "sim-port.0";

/// Feature type AFU (bits 63:60) with the end-of-list bit (40) set.
const SIM_AFU_DFH: u64 = (1 << 60) | (1 << 40);

struct SimBuffer {
    iova: u64,
    memory: Arc<HostMemory>,
}

struct Transfer {
    source: u64,
    destination: u64,
    bytes: usize,
    polls_left: u32,
}

struct SimState {
    registers: HashMap<u64, u64>,
    buffers: Vec<SimBuffer>,
    next_iova: u64,
    pending: Option<Transfer>,
    fault: Option<String>,
}

/// Where an address range lands inside one of the handed out buffers.
struct Resolved {
    memory: Arc<HostMemory>,
    offset: usize,
}

impl SimState {
    fn resolve(&self, address: u64, bytes: usize, mode: AddressMode) -> Option<Resolved> {
        self.buffers.iter().find_map(|buffer| {
            let base = match mode {
                AddressMode::Iova => buffer.iova,
                AddressMode::Virtual => buffer.memory.virtual_address(),
            };
            let offset = address.checked_sub(base)?;
            let end = offset.checked_add(bytes as u64)?;
            (end <= buffer.memory.len() as u64).then(|| Resolved {
                memory: buffer.memory.clone(),
                offset: offset as usize,
            })
        })
    }
}

#[backend(name = "simulated")]
pub struct SimulatedAccelerator {
    registers: RegisterMap,
    address_mode: AddressMode,
    use_hugepages: bool,
    completion_polls: u32,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedAccelerator {
    pub fn open(config: &AcceleratorConfig) -> Result<Self, AfuError> {
        config.registers.validate()?;
        let afu_id = parse_afu_id(&config.uuid)?;
        let mut registers = HashMap::new();
        registers.insert(dfh::AFU_DFH, SIM_AFU_DFH);
        registers.insert(dfh::AFU_ID_L, afu_id as u64);
        registers.insert(dfh::AFU_ID_H, (afu_id >> 64) as u64);

        info!(
            "Simulating accelerator {} as {SIM_HANDLE}",
            format_afu_id(afu_id)
        );
        Ok(SimulatedAccelerator {
            registers: config.registers.clone(),
            address_mode: config.address_mode,
            use_hugepages: config.use_hugepages,
            completion_polls: config.completion_polls,
            state: Arc::new(Mutex::new(SimState {
                registers,
                buffers: Vec::new(),
                next_iova: SIM_IOVA_BASE,
                pending: None,
                fault: None,
            })),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>, AfuError> {
        self.state
            .lock()
            .map_err(|_| AfuError::Internal("simulated accelerator state poisoned".into()))
    }

    /// Description of the last transfer the model had to drop, if any.
    pub fn last_fault(&self) -> Result<Option<String>, AfuError> {
        Ok(self.lock()?.fault.clone())
    }

    /// Number of shared buffers currently handed out.
    pub fn buffers_in_use(&self) -> Result<usize, AfuError> {
        Ok(self.lock()?.buffers.len())
    }

    fn is_header(offset: u64) -> bool {
        offset <= dfh::AFU_ID_H
    }

    fn start_transfer(&self, state: &mut SimState) {
        let rd_addr = self.register_value(state, DmaRegister::RdAddr);
        let wr_addr = self.register_value(state, DmaRegister::WrAddr);
        let cache_lines = self.register_value(state, DmaRegister::Size);
        state
            .registers
            .insert(self.registers.offset(DmaRegister::Done), 0);

        let Some(bytes) = usize::try_from(cache_lines)
            .ok()
            .and_then(|lines| lines.checked_mul(CL_BYTES))
        else {
            warn!("Simulated DMA dropped: size of {cache_lines} cache lines is not addressable");
            state.pending = None;
            state.fault = Some(format!(
                "transfer of {cache_lines} cache lines from {rd_addr:#x} to {wr_addr:#x} is not addressable"
            ));
            return;
        };
        debug!("go: {cache_lines} cache lines from {rd_addr:#x} to {wr_addr:#x}");
        state.pending = Some(Transfer {
            source: rd_addr,
            destination: wr_addr,
            bytes,
            polls_left: self.completion_polls,
        });
    }

    fn complete_transfer(&self, state: &mut SimState, transfer: &Transfer) {
        let source = state.resolve(transfer.source, transfer.bytes, self.address_mode);
        let destination = state.resolve(transfer.destination, transfer.bytes, self.address_mode);
        let copied = match (source, destination) {
            (Some(source), Some(destination)) => source.memory.copy_to(
                source.offset,
                &destination.memory,
                destination.offset,
                transfer.bytes,
            ),
            _ => Err(AfuError::Argument(format!(
                "transfer of {} bytes from {:#x} to {:#x} leaves the shared buffers",
                transfer.bytes, transfer.source, transfer.destination
            ))),
        };
        match copied {
            Ok(()) => {
                trace!("Transfer of {} bytes landed", transfer.bytes);
                state
                    .registers
                    .insert(self.registers.offset(DmaRegister::Done), 1);
            }
            Err(e) => {
                warn!("Simulated DMA dropped: {e}");
                state.fault = Some(e.to_string());
            }
        }
    }

    fn register_value(&self, state: &SimState, register: DmaRegister) -> u64 {
        state
            .registers
            .get(&self.registers.offset(register))
            .copied()
            .unwrap_or(0)
    }

    /// Read the 64-bit word at the 8-byte aligned `offset`, with side effects.
    fn load(&self, offset: u64) -> Result<u64, AfuError> {
        let mut state = self.lock()?;
        if offset == self.registers.offset(DmaRegister::Done) {
            if let Some(mut transfer) = state.pending.take() {
                if transfer.polls_left > 0 {
                    transfer.polls_left -= 1;
                    state.pending = Some(transfer);
                } else {
                    self.complete_transfer(&mut state, &transfer);
                }
            }
        }
        Ok(state.registers.get(&offset).copied().unwrap_or(0))
    }

    /// Write the 64-bit word at the 8-byte aligned `offset`, with side effects.
    fn store(&self, state: &mut SimState, offset: u64, value: u64) {
        if Self::is_header(offset) {
            warn!("Ignoring write of {value:#x} to read-only header register {offset:#x}");
            return;
        }
        if offset == self.registers.offset(DmaRegister::Go) {
            if value != 0 {
                self.start_transfer(state);
            }
            // go is self-clearing
            return;
        }
        state.registers.insert(offset, value);
    }
}

impl Afu for SimulatedAccelerator {
    fn handle(&self) -> &str {
        SIM_HANDLE
    }

    fn afu_id(&self) -> Result<String, AfuError> {
        let low = self.read_mmio64(dfh::AFU_ID_L)?;
        let high = self.read_mmio64(dfh::AFU_ID_H)?;
        Ok(format_afu_id((u128::from(high) << 64) | u128::from(low)))
    }

    fn reset(&self) -> Result<(), AfuError> {
        let mut state = self.lock()?;
        let reset_count_offset = self.registers.offset(DmaRegister::ResetCount);
        let resets = state.registers.get(&reset_count_offset).copied().unwrap_or(0) + 1;
        state.registers.retain(|offset, _| Self::is_header(*offset));
        state.registers.insert(reset_count_offset, resets);
        state.pending = None;
        state.fault = None;
        debug!("Reset {SIM_HANDLE} ({resets} resets so far)");
        Ok(())
    }

    fn read_mmio64(&self, offset: u64) -> Result<u64, AfuError> {
        check_access(offset, 8, SIM_MMIO_BYTES)?;
        self.load(offset)
    }

    fn write_mmio64(&self, offset: u64, value: u64) -> Result<(), AfuError> {
        check_access(offset, 8, SIM_MMIO_BYTES)?;
        let mut state = self.lock()?;
        self.store(&mut state, offset, value);
        Ok(())
    }

    fn read_mmio32(&self, offset: u64) -> Result<u32, AfuError> {
        check_access(offset, 4, SIM_MMIO_BYTES)?;
        let shift = (offset % 8) * 8;
        Ok((self.load(offset - offset % 8)? >> shift) as u32)
    }

    fn write_mmio32(&self, offset: u64, value: u32) -> Result<(), AfuError> {
        check_access(offset, 4, SIM_MMIO_BYTES)?;
        let aligned = offset - offset % 8;
        let shift = (offset % 8) * 8;
        let mut state = self.lock()?;
        let current = state.registers.get(&aligned).copied().unwrap_or(0);
        let merged = (current & !(0xffff_ffff_u64 << shift)) | (u64::from(value) << shift);
        self.store(&mut state, aligned, merged);
        Ok(())
    }

    fn prepare_buffer(&self, len: usize) -> Result<SharedBuffer, AfuError> {
        let memory = Arc::new(HostMemory::allocate(len, self.use_hugepages)?);
        let mut state = self.lock()?;
        let iova = state.next_iova;
        state.next_iova += memory.len() as u64;
        state.buffers.push(SimBuffer {
            iova,
            memory: memory.clone(),
        });
        drop(state);

        Ok(SharedBuffer::new(
            memory,
            iova,
            Some(Box::new(SimDmaRelease {
                state: self.state.clone(),
            })),
        ))
    }
}

/// Forgets a buffer so the model no longer resolves addresses into it.
struct SimDmaRelease {
    state: Arc<Mutex<SimState>>,
}

impl DmaRelease for SimDmaRelease {
    fn release(&self, io_address: u64) -> Result<(), AfuError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AfuError::Internal("simulated accelerator state poisoned".into()))?;
        let before = state.buffers.len();
        state.buffers.retain(|buffer| buffer.iova != io_address);
        if state.buffers.len() == before {
            return Err(AfuError::Internal(format!(
                "no simulated DMA mapping at {io_address:#x}"
            )));
        }
        trace!("Released simulated mapping {io_address:#x}");
        Ok(())
    }
}
