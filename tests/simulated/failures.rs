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

use crate::common::test_functions::{compare_error, simulated_settings};
use afu_dma::Afu;
use afu_dma::accelerators::simulated::SimulatedAccelerator;
use afu_dma::config::AddressMode;
use afu_dma::dma_test::run_dma_test;
use afu_dma::error::AfuError;
use afu_dma::mmio::{DmaRegister, RegisterMap};
use afu_dma::shared_memory::{HostMemory, SharedBuffer};
use googletest::prelude::*;
use rstest::*;
use std::sync::{Arc, Mutex};

/// Simulated accelerator that flips one element of the destination once done asserts.
struct CorruptingAfu {
    inner: SimulatedAccelerator,
    registers: RegisterMap,
    buffers: Mutex<Vec<(u64, Arc<HostMemory>)>>,
    wr_addr: Mutex<u64>,
}

impl Afu for CorruptingAfu {
    fn handle(&self) -> &str {
        self.inner.handle()
    }

    fn afu_id(&self) -> std::result::Result<String, AfuError> {
        self.inner.afu_id()
    }

    fn reset(&self) -> std::result::Result<(), AfuError> {
        self.inner.reset()
    }

    fn read_mmio64(&self, offset: u64) -> std::result::Result<u64, AfuError> {
        let value = self.inner.read_mmio64(offset)?;
        if offset == self.registers.offset(DmaRegister::Done) && value != 0 {
            let wr_addr = *self.wr_addr.lock().unwrap();
            for (iova, memory) in self.buffers.lock().unwrap().iter() {
                if *iova == wr_addr {
                    memory.write::<u32>(0, !memory.read::<u32>(0));
                }
            }
        }
        Ok(value)
    }

    fn write_mmio64(&self, offset: u64, value: u64) -> std::result::Result<(), AfuError> {
        if offset == self.registers.offset(DmaRegister::WrAddr) {
            *self.wr_addr.lock().unwrap() = value;
        }
        self.inner.write_mmio64(offset, value)
    }

    fn read_mmio32(&self, offset: u64) -> std::result::Result<u32, AfuError> {
        self.inner.read_mmio32(offset)
    }

    fn write_mmio32(&self, offset: u64, value: u32) -> std::result::Result<(), AfuError> {
        self.inner.write_mmio32(offset, value)
    }

    fn prepare_buffer(&self, len: usize) -> std::result::Result<SharedBuffer, AfuError> {
        let buffer = self.inner.prepare_buffer(len)?;
        self.buffers
            .lock()
            .unwrap()
            .push((buffer.io_address(), buffer.memory().clone()));
        Ok(buffer)
    }
}

#[gtest]
#[tokio::test]
async fn corrupted_transfer_is_a_verification_error() {
    let settings = simulated_settings(0);
    let afu = CorruptingAfu {
        inner: SimulatedAccelerator::open(&settings.accelerator).expect("open"),
        registers: settings.accelerator.registers.clone(),
        buffers: Mutex::new(Vec::new()),
        wr_addr: Mutex::new(0),
    };

    let res = run_dma_test(&afu, &settings).await;
    compare_error(&res, "AfuError::Verification: DMA test 0 failed with 1 errors");
    assert_that!(afu.inner.buffers_in_use().unwrap(), eq(0));
}

#[gtest]
#[tokio::test]
#[rstest]
#[case::sleeping(true, 40)]
#[case::spinning(false, 40)]
async fn cases(#[case] sleep_while_waiting: bool, #[case] timeout_ms: u64) {
    let mut settings = simulated_settings(0);
    let afu = SimulatedAccelerator::open(&settings.accelerator).expect("open");
    // addresses written as virtual while the model resolves IOVAs
    settings.accelerator.address_mode = AddressMode::Virtual;
    settings.dma.sleep_while_waiting = sleep_while_waiting;
    settings.dma.timeout_ms = timeout_ms;

    let res = run_dma_test(&afu, &settings).await;
    compare_error(
        &res,
        "AfuError::Timeout: Register done did not assert within 40 ms",
    );
    assert_that!(afu.last_fault().unwrap().is_some(), eq(true));
    assert_that!(afu.buffers_in_use().unwrap(), eq(0));
}
