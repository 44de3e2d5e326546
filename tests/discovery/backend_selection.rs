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

use crate::common::test_functions::compare_error;
use crate::discovery::add_port;
use afu_dma::accelerators::dfl::DflAccelerator;
use afu_dma::config::AcceleratorConfig;
use afu_dma::error::AfuError;
use afu_dma::config::system_config::set_fpga_region_dir;
use afu_dma::open_accelerator;
use googletest::prelude::*;
use std::fs;

/// Both phases change the process-wide fpga_region directory, so they share one test.
#[gtest]
fn default_backend_reports_missing_driver_and_accelerator() {
    afu_dma::register_backends();
    let config = AcceleratorConfig::default();
    assert_that!(config.backend.as_str(), eq("dfl"));

    let empty = tempfile::tempdir().unwrap();
    set_fpga_region_dir(empty.path().join("missing").to_string_lossy().into_owned()).unwrap();
    let res = open_accelerator(&config);
    assert_that!(matches!(res, Err(AfuError::NoDriver(_))), eq(true));
    let unnamed = AcceleratorConfig {
        backend: String::new(),
        ..AcceleratorConfig::default()
    };
    let res = open_accelerator(&unnamed);
    assert_that!(matches!(res, Err(AfuError::NoDriver(_))), eq(true));

    let sysfs = tempfile::tempdir().unwrap();
    add_port(sysfs.path(), "region0", "dfl-port.0", "11112222333344445555666677778888");
    set_fpga_region_dir(sysfs.path().to_string_lossy().into_owned()).unwrap();
    let res = open_accelerator(&config);
    assert_that!(res.is_err(), eq(true));
    compare_error(&res.map(|afu| afu.handle().to_string()), "not found");
}

#[cfg(feature = "simulated")]
#[gtest]
fn simulated_backend_is_used_when_named() {
    afu_dma::register_backends();
    let config = AcceleratorConfig {
        backend: "simulated".into(),
        use_hugepages: false,
        ..AcceleratorConfig::default()
    };
    let afu = open_accelerator(&config).unwrap();
    assert_that!(afu.handle(), eq("sim-port.0"));
    assert_that!(
        afu.afu_id().unwrap().as_str(),
        eq("7d4ebc6e-3e3f-4d0b-9b9c-6d6b1a1e7e2a")
    );
}

#[gtest]
fn unknown_backend_is_rejected() {
    afu_dma::register_backends();
    let config = AcceleratorConfig {
        backend: "opae".into(),
        ..AcceleratorConfig::default()
    };
    compare_error(
        &open_accelerator(&config).map(|afu| afu.handle().to_string()),
        "'opae' is not a known accelerator backend.",
    );
}

#[gtest]
fn port_without_dfl_driver_fails_the_api_version_ioctl() {
    let config = AcceleratorConfig::default();
    let sysfs = tempfile::tempdir().unwrap();
    let devices = tempfile::tempdir().unwrap();
    add_port(sysfs.path(), "region0", "dfl-port.0", "7d4ebc6e3e3f4d0b9b9c6d6b1a1e7e2a");
    // a regular file answers every ioctl with ENOTTY
    fs::write(devices.path().join("dfl-port.0"), b"").unwrap();

    let res = DflAccelerator::open_in(sysfs.path(), devices.path(), &config);
    compare_error(&res, "ioctl DFL_FPGA_GET_API_VERSION failed");
}
