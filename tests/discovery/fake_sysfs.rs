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
use afu_dma::accelerators::dfl_components::dfl_discovery::{find_ports, scan_ports};
use googletest::prelude::*;
use rstest::*;
use std::path::Path;

static LOOPBACK_ID: &str = "7d4ebc6e-3e3f-4d0b-9b9c-6d6b1a1e7e2a";

fn fake_sysfs() -> tempfile::TempDir {
    let root = tempfile::tempdir().expect("failed to create fake sysfs");
    add_port(root.path(), "region0", "dfl-port.0", "11112222333344445555666677778888\n");
    add_port(root.path(), "region1", "dfl-port.1", "7D4EBC6E3E3F4D0B9B9C6D6B1A1E7E2A\n");
    add_port(root.path(), "region2", "dfl-port.2", "7d4ebc6e3e3f4d0b9b9c6d6b1a1e7e2a\n");
    std::fs::create_dir_all(root.path().join("region0/dfl-fme.0")).unwrap();
    root
}

#[gtest]
#[rstest]
#[case::hyphenated(LOOPBACK_ID, &["dfl-port.1", "dfl-port.2"])]
#[case::bare_upper_case("7D4EBC6E3E3F4D0B9B9C6D6B1A1E7E2A", &["dfl-port.1", "dfl-port.2"])]
#[case::other_accelerator("11112222-3333-4444-5555-666677778888", &["dfl-port.0"])]
fn cases(#[case] uuid: &str, #[case] expected: &[&str]) {
    let root = fake_sysfs();
    let ports = find_ports(root.path(), uuid).expect("no port found");
    let handles: Vec<&str> = ports.iter().map(|port| port.handle.as_str()).collect();
    assert_that!(handles, eq(&expected.to_vec()));
    assert_that!(
        ports.iter().all(|port| port.afu_id.is_some()),
        eq(true)
    );
}

#[gtest]
fn unknown_uuid_is_not_found() {
    let root = fake_sysfs();
    let res = find_ports(root.path(), "00000000-0000-0000-0000-000000000001");
    compare_error(
        &res,
        "FPGA with accelerator 00000000-0000-0000-0000-000000000001 not found.",
    );
}

#[gtest]
fn malformed_uuid_is_an_argument_error() {
    let root = fake_sysfs();
    compare_error(&find_ports(root.path(), "7d4ebc6e"), "AfuError::Argument");
}

#[gtest]
fn missing_fpga_region_dir_is_no_driver() {
    let res = scan_ports(Path::new("/this/path/has/no/fpga_region"));
    compare_error(&res, "AfuError::NoDriver");
}

#[gtest]
fn scan_lists_every_port() {
    let root = fake_sysfs();
    let ports = scan_ports(root.path()).expect("scan failed");
    assert_that!(ports.len(), eq(3));
    assert_that!(ports[1].region.as_str(), eq("region1"));
    assert_that!(ports[1].afu_id.as_deref(), eq(Some(LOOPBACK_ID)));
}
