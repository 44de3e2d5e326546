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

use afu_dma::config::Settings;
use afu_dma::error::AfuError;
use afu_dma::open_accelerator;

/// Parse a number given as `0x`-prefixed hex or as decimal.
pub fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("'{s}' is not a hex (0x...) or decimal number: {e}"))
}

/// Name of the DMA register at `offset`, if it is one.
fn register_label(settings: &Settings, offset: u64) -> String {
    match settings.accelerator.registers.identify(offset) {
        Some(register) => format!(" ({})", register.name()),
        None => String::new(),
    }
}

/// Argument parser for the read command
pub fn read_handler(settings: &Settings, offset: u64) -> Result<String, AfuError> {
    let afu = open_accelerator(&settings.accelerator)?;
    let value = afu.read_mmio64(offset)?;
    Ok(format!(
        "{} {offset:#x}{} = {value:#x}",
        afu.handle(),
        register_label(settings, offset)
    ))
}

/// Argument parser for the write command
pub fn write_handler(settings: &Settings, offset: u64, value: u64) -> Result<String, AfuError> {
    let afu = open_accelerator(&settings.accelerator)?;
    afu.write_mmio64(offset, value)?;
    Ok(format!(
        "{} {offset:#x}{} <- {value:#x}",
        afu.handle(),
        register_label(settings, offset)
    ))
}

/// Argument parser for the reset command
pub fn reset_handler(settings: &Settings) -> Result<String, AfuError> {
    let afu = open_accelerator(&settings.accelerator)?;
    afu.reset()?;
    Ok(format!("{} reset", afu.handle()))
}
