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

use crate::common::test_functions::simulated_settings;
use afu_dma::Afu;
use afu_dma::config::{Settings, WordBits};
use afu_dma::dma_test::run_dma_test;
use afu_dma::error::AfuError;
use afu_dma::mmio::{DmaRegister, RegisterMap};
use afu_dma::open_accelerator;
use afu_dma::shared_memory::{HostMemory, SharedBuffer};
use googletest::prelude::*;
use rstest::*;
use std::sync::{Arc, Mutex};

/// Accelerator that keeps a copy of the source buffer of every transfer it starts.
struct RecordingAfu {
    inner: Box<dyn Afu>,
    registers: RegisterMap,
    buffers: Mutex<Vec<(u64, Arc<HostMemory>)>>,
    rd_addr: Mutex<u64>,
    sources: Mutex<Vec<Vec<u8>>>,
}

impl RecordingAfu {
    fn open(settings: &Settings) -> RecordingAfu {
        RecordingAfu {
            inner: open_accelerator(&settings.accelerator).expect("failed to open simulated backend"),
            registers: settings.accelerator.registers.clone(),
            buffers: Mutex::new(Vec::new()),
            rd_addr: Mutex::new(0),
            sources: Mutex::new(Vec::new()),
        }
    }

    fn take_sources(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sources.lock().unwrap())
    }
}

impl Afu for RecordingAfu {
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
        self.inner.read_mmio64(offset)
    }

    fn write_mmio64(&self, offset: u64, value: u64) -> std::result::Result<(), AfuError> {
        if offset == self.registers.offset(DmaRegister::RdAddr) {
            *self.rd_addr.lock().unwrap() = value;
        }
        if offset == self.registers.offset(DmaRegister::Go) {
            let rd_addr = *self.rd_addr.lock().unwrap();
            for (iova, memory) in self.buffers.lock().unwrap().iter() {
                if *iova == rd_addr {
                    let bytes = (0..memory.len()).map(|i| memory.read::<u8>(i)).collect();
                    self.sources.lock().unwrap().push(bytes);
                }
            }
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
#[rstest]
#[case::bytes(WordBits::W8, 8192, 128)]
#[case::halfwords(WordBits::W16, 8192, 256)]
#[case::words(WordBits::W32, 8192, 512)]
#[case::doublewords(WordBits::W64, 8192, 1024)]
#[case::partial_cache_line(WordBits::W32, 17, 2)]
#[case::single_element(WordBits::W8, 1, 1)]
async fn cases(
    #[case] word_bits: WordBits,
    #[case] data_amount: usize,
    #[case] expected_cache_lines: u64,
) {
    afu_dma::register_backends();
    let mut settings = simulated_settings(1);
    settings.dma.word_bits = word_bits;
    settings.dma.data_amount = data_amount;
    settings.dma.num_tests = 2;

    let afu = open_accelerator(&settings.accelerator).expect("failed to open simulated backend");
    let report = run_dma_test(afu.as_ref(), &settings)
        .await
        .expect("loopback failed");

    assert_that!(report.passed(), eq(true));
    assert_that!(report.iterations.len(), eq(2));
    assert_that!(report.iterations[0].cache_lines, eq(expected_cache_lines));
    assert_that!(
        report.iterations[0].bytes,
        eq(data_amount * word_bits.bytes())
    );
}

#[gtest]
#[tokio::test]
async fn seeded_runs_send_the_same_data() {
    afu_dma::register_backends();
    let mut settings = simulated_settings(0);
    settings.dma.data_amount = 64;
    settings.dma.reset_before_test = true;
    let afu = RecordingAfu::open(&settings);

    let first = run_dma_test(&afu, &settings).await.expect("first run");
    let first_sources = afu.take_sources();
    let second = run_dma_test(&afu, &settings).await.expect("second run");
    let second_sources = afu.take_sources();
    settings.dma.seed = Some(43);
    run_dma_test(&afu, &settings).await.expect("run with another seed");
    let other_sources = afu.take_sources();

    assert_that!(first.iterations[0].reset_count, eq(1));
    assert_that!(second.iterations[0].reset_count, eq(2));
    assert_that!(first_sources.len(), eq(1));
    assert_that!(first_sources[0].iter().any(|byte| *byte != 0), eq(true));
    assert_eq!(first_sources, second_sources);
    assert_ne!(first_sources, other_sources);
}
