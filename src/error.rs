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

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AfuError {
    #[error("AfuError::Busy: All FPGAs busy: {0}")]
    Busy(String),
    #[error("AfuError::NotFound: FPGA with accelerator {uuid} not found.")]
    NotFound { uuid: String },
    #[error("AfuError::NoDriver: No FPGA driver found: {0}")]
    NoDriver(String),
    #[error("AfuError::Argument: {0}")]
    Argument(String),
    #[error("AfuError::Mmio: Invalid MMIO access at offset {offset:#x}: {reason}")]
    Mmio { offset: u64, reason: String },
    #[error("AfuError::Ioctl: ioctl {request} failed on {device:?}: {e}")]
    Ioctl {
        request: &'static str,
        device: PathBuf,
        e: std::io::Error,
    },
    #[error("AfuError::Mmap: Failed to map {len} bytes: {e}")]
    Mmap { len: usize, e: std::io::Error },
    #[error("AfuError::Timeout: Register {register} did not assert within {waited_ms} ms")]
    Timeout {
        register: &'static str,
        waited_ms: u64,
    },
    #[error("AfuError::Verification: DMA test {test} failed with {errors} errors")]
    Verification { test: usize, errors: usize },
    #[error("AfuError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("AfuError::IOOpen: An IO error occurred when opening {file:?}: {e}")]
    IOOpen { file: PathBuf, e: std::io::Error },
    #[error("AfuError::IOReadDir: An IO error occurred when reading directory {dir:?}: {e}")]
    IOReadDir { dir: PathBuf, e: std::io::Error },
    #[error("AfuError::TomlDe: Failed to parse config {toml_string:?}: {e}")]
    TomlDe {
        toml_string: String,
        e: toml::de::Error,
    },
    #[error("AfuError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}
