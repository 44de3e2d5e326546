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

//! TOML config files.
//!
//! Every section and every field is optional. Files are layered: the vendor file
//! (`/usr/lib/afu-dma/config.toml`) is overridden by the user file
//! (`/etc/afu-dma/config.toml`), which is overridden by a file passed with `--config`.
//! Anything still unset falls back to the hardcoded defaults in
//! [`settings`](super::settings).
//!
//! ```toml
//! [system_paths]
//! fpga_region_dir = "/sys/class/fpga_region/"
//! device_dir = "/dev/"
//!
//! [accelerator]
//! uuid = "7d4ebc6e-3e3f-4d0b-9b9c-6d6b1a1e7e2a"
//! backend = "dfl"
//! address_mode = "iova"
//! use_hugepages = true
//!
//! [registers]
//! go = 0x0050
//! done = 0x0058
//!
//! [dma]
//! num_tests = 1
//! data_amount = 8192
//! word_bits = 32
//! sleep_while_waiting = true
//! sleep_ms = 10
//! ```

use crate::config::settings::AddressMode;
use crate::error::AfuError;
use crate::system_io::fs_read;
use log::trace;
use serde::Deserialize;
use std::path::Path;

/// Config shipped by the distribution package.
pub static VENDOR_CONFIG_PATH: &str = "/usr/lib/afu-dma/config.toml";

/// Config written by the administrator.
pub static USER_CONFIG_PATH: &str = "/etc/afu-dma/config.toml";

/// This is the top level struct which holds all sections
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub system_paths: Option<SystemPaths>,
    pub accelerator: Option<AcceleratorSection>,
    pub registers: Option<RegistersSection>,
    pub dma: Option<DmaSection>,
}

/// The `[system_paths]` section
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemPaths {
    pub fpga_region_dir: Option<String>,
    pub device_dir: Option<String>,
}

/// The `[accelerator]` section
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceleratorSection {
    pub uuid: Option<String>,
    pub backend: Option<String>,
    pub address_mode: Option<AddressMode>,
    pub use_hugepages: Option<bool>,
    pub completion_polls: Option<u32>,
}

/// The `[registers]` section. Values are 32-bit word indices into the AFU MMIO space.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistersSection {
    pub go: Option<u64>,
    pub rd_addr: Option<u64>,
    pub wr_addr: Option<u64>,
    pub size: Option<u64>,
    pub done: Option<u64>,
    pub reset_count: Option<u64>,
}

/// The `[dma]` section
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DmaSection {
    pub num_tests: Option<usize>,
    pub data_amount: Option<usize>,
    pub word_bits: Option<u32>,
    pub sleep_while_waiting: Option<bool>,
    pub sleep_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub seed: Option<u64>,
    pub reset_before_test: Option<bool>,
}

impl SystemPaths {
    pub fn merge(self, fallback: SystemPaths) -> SystemPaths {
        SystemPaths {
            fpga_region_dir: self.fpga_region_dir.or(fallback.fpga_region_dir),
            device_dir: self.device_dir.or(fallback.device_dir),
        }
    }
}

impl AcceleratorSection {
    pub fn merge(self, fallback: AcceleratorSection) -> AcceleratorSection {
        AcceleratorSection {
            uuid: self.uuid.or(fallback.uuid),
            backend: self.backend.or(fallback.backend),
            address_mode: self.address_mode.or(fallback.address_mode),
            use_hugepages: self.use_hugepages.or(fallback.use_hugepages),
            completion_polls: self.completion_polls.or(fallback.completion_polls),
        }
    }
}

impl RegistersSection {
    pub fn merge(self, fallback: RegistersSection) -> RegistersSection {
        RegistersSection {
            go: self.go.or(fallback.go),
            rd_addr: self.rd_addr.or(fallback.rd_addr),
            wr_addr: self.wr_addr.or(fallback.wr_addr),
            size: self.size.or(fallback.size),
            done: self.done.or(fallback.done),
            reset_count: self.reset_count.or(fallback.reset_count),
        }
    }
}

impl DmaSection {
    pub fn merge(self, fallback: DmaSection) -> DmaSection {
        DmaSection {
            num_tests: self.num_tests.or(fallback.num_tests),
            data_amount: self.data_amount.or(fallback.data_amount),
            word_bits: self.word_bits.or(fallback.word_bits),
            sleep_while_waiting: self.sleep_while_waiting.or(fallback.sleep_while_waiting),
            sleep_ms: self.sleep_ms.or(fallback.sleep_ms),
            timeout_ms: self.timeout_ms.or(fallback.timeout_ms),
            seed: self.seed.or(fallback.seed),
            reset_before_test: self.reset_before_test.or(fallback.reset_before_test),
        }
    }
}

fn merge_section<T>(primary: Option<T>, fallback: Option<T>, merge: fn(T, T) -> T) -> Option<T> {
    match (primary, fallback) {
        (Some(p), Some(f)) => Some(merge(p, f)),
        (p, f) => p.or(f),
    }
}

impl TomlConfig {
    /// Merge two configs section by section, field by field. `self` wins.
    pub fn merge(self, fallback: TomlConfig) -> TomlConfig {
        TomlConfig {
            system_paths: merge_section(
                self.system_paths,
                fallback.system_paths,
                SystemPaths::merge,
            ),
            accelerator: merge_section(
                self.accelerator,
                fallback.accelerator,
                AcceleratorSection::merge,
            ),
            registers: merge_section(self.registers, fallback.registers, RegistersSection::merge),
            dma: merge_section(self.dma, fallback.dma, DmaSection::merge),
        }
    }
}

pub fn toml_str_to_config(toml_string: &str) -> Result<TomlConfig, AfuError> {
    toml::from_str(toml_string).map_err(|e| AfuError::TomlDe {
        toml_string: toml_string.into(),
        e,
    })
}

pub fn config_from_file(file_path: &Path) -> Result<TomlConfig, AfuError> {
    if !file_path.is_file() {
        return Err(AfuError::Internal(format!(
            "Config file not found in {file_path:?}"
        )));
    }
    toml_str_to_config(&fs_read(file_path)?)
}

/// Load the vendor and user config files and, if given, an extra file on top of them.
///
/// Missing vendor or user files are skipped. A missing or malformed `extra` file is an
/// error because the caller asked for it explicitly.
pub fn layered_config(extra: Option<&Path>) -> Result<TomlConfig, AfuError> {
    let mut merged = TomlConfig::default();
    for path in [VENDOR_CONFIG_PATH, USER_CONFIG_PATH] {
        match config_from_file(Path::new(path)) {
            Ok(config) => {
                trace!("Loaded config layer {path}");
                merged = config.merge(merged);
            }
            Err(e) => trace!("Skipping config layer {path}: {e}"),
        }
    }
    if let Some(extra) = extra {
        merged = config_from_file(extra)?.merge(merged);
    }
    Ok(merged)
}
