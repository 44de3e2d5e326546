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

use afu_dma::config::{AcceleratorConfig, DmaTestConfig, Settings};
use afu_dma::error::AfuError;
use googletest::prelude::*;
use std::fmt::Debug;

/// Settings for a quick run on the simulated backend.
pub fn simulated_settings(completion_polls: u32) -> Settings {
    Settings {
        accelerator: AcceleratorConfig {
            backend: "simulated".into(),
            use_hugepages: false,
            completion_polls,
            ..AcceleratorConfig::default()
        },
        dma: DmaTestConfig {
            sleep_ms: 1,
            timeout_ms: 2_000,
            seed: Some(42),
            ..DmaTestConfig::default()
        },
    }
}

pub fn compare_error<T: Debug>(res: &std::result::Result<T, AfuError>, exp: &str) {
    match res {
        Err(res_err) => {
            assert_that!(
                res_err.to_string(),
                contains_substring(exp),
                "Mismatched error signature"
            );
        }
        Ok(value) => {
            panic!("Result mismatch: got Ok({value:?}), expected an error containing {exp:?}");
        }
    }
}
