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

//! Resolved settings for opening an accelerator and running the DMA test.
//!
//! [`Settings`] is what the rest of the crate consumes: every value is present and
//! validated. It is built from a layered [`TomlConfig`] with hardcoded defaults filling
//! the gaps; the CLI then applies its own flags on top.

use crate::accelerators::accelerator::{format_afu_id, parse_afu_id};
use crate::config::config_files::{TomlConfig, layered_config};
use crate::config::system_config::apply_system_paths;
use crate::error::AfuError;
use crate::mmio::RegisterMap;
use crate::shared_memory::MAX_BUFFER_BYTES;
use log::debug;
use serde::Deserialize;
use std::path::Path;

/// AFU id of the DMA loopback accelerator, as generated into its JSON descriptor.
pub static DEFAULT_AFU_UUID: &str = "7d4ebc6e-3e3f-4d0b-9b9c-6d6b1a1e7e2a";

/// Backends other than `dfl` are only used when configured by name.
pub static DEFAULT_BACKEND: &str = "dfl";

pub const DEFAULT_NUM_TESTS: usize = 1;
pub const DEFAULT_DATA_AMOUNT: usize = 8192;
pub const DEFAULT_SLEEP_WHILE_WAITING: bool = true;
pub const DEFAULT_SLEEP_MS: u64 = 10;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_COMPLETION_POLLS: u32 = 3;
pub const DEFAULT_USE_HUGEPAGES: bool = true;

/// Which address of a shared buffer is written into the address registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    /// The I/O virtual address returned when the buffer was mapped for DMA.
    #[default]
    Iova,
    /// The host virtual address. Only for designs that translate addresses in the FPGA.
    Virtual,
}

impl std::str::FromStr for AddressMode {
    type Err = AfuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iova" => Ok(AddressMode::Iova),
            "virtual" => Ok(AddressMode::Virtual),
            other => Err(AfuError::Argument(format!(
                "'{other}' is not an address mode. Expected 'iova' or 'virtual'."
            ))),
        }
    }
}

/// Width of one element of the DMA buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordBits {
    W8,
    W16,
    #[default]
    W32,
    W64,
}

impl WordBits {
    pub fn bytes(self) -> usize {
        match self {
            WordBits::W8 => 1,
            WordBits::W16 => 2,
            WordBits::W32 => 4,
            WordBits::W64 => 8,
        }
    }
}

/// Bytes of one buffer holding `elements` elements of `element_bytes` each.
///
/// # Returns: `Result<usize, AfuError>`
/// * `Ok(usize)` - Buffer length, at most [`MAX_BUFFER_BYTES`]
/// * `Err(AfuError::Argument)` - The buffer would be larger
pub fn buffer_bytes(elements: usize, element_bytes: usize) -> Result<usize, AfuError> {
    match elements.checked_mul(element_bytes) {
        Some(bytes) if bytes <= MAX_BUFFER_BYTES => Ok(bytes),
        _ => Err(AfuError::Argument(format!(
            "{elements} elements of {element_bytes} bytes exceed the {MAX_BUFFER_BYTES} byte buffer limit"
        ))),
    }
}

impl TryFrom<u32> for WordBits {
    type Error = AfuError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(WordBits::W8),
            16 => Ok(WordBits::W16),
            32 => Ok(WordBits::W32),
            64 => Ok(WordBits::W64),
            other => Err(AfuError::Argument(format!(
                "word_bits must be one of 8, 16, 32 or 64, got {other}"
            ))),
        }
    }
}

/// Everything a backend needs to find and drive an accelerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceleratorConfig {
    /// Canonical (lowercase, hyphenated) AFU id.
    pub uuid: String,
    pub backend: String,
    pub address_mode: AddressMode,
    pub use_hugepages: bool,
    /// Simulated backend only: reads of `done` that return 0 before the transfer lands.
    pub completion_polls: u32,
    pub registers: RegisterMap,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        AcceleratorConfig {
            uuid: DEFAULT_AFU_UUID.to_string(),
            backend: DEFAULT_BACKEND.to_string(),
            address_mode: AddressMode::default(),
            use_hugepages: DEFAULT_USE_HUGEPAGES,
            completion_polls: DEFAULT_COMPLETION_POLLS,
            registers: RegisterMap::default(),
        }
    }
}

/// Parameters of the DMA test loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaTestConfig {
    pub num_tests: usize,
    /// Number of elements in each of the input and output buffers.
    pub data_amount: usize,
    pub word_bits: WordBits,
    pub sleep_while_waiting: bool,
    pub sleep_ms: u64,
    /// 0 waits forever.
    pub timeout_ms: u64,
    pub seed: Option<u64>,
    pub reset_before_test: bool,
}

impl Default for DmaTestConfig {
    fn default() -> Self {
        DmaTestConfig {
            num_tests: DEFAULT_NUM_TESTS,
            data_amount: DEFAULT_DATA_AMOUNT,
            word_bits: WordBits::default(),
            sleep_while_waiting: DEFAULT_SLEEP_WHILE_WAITING,
            sleep_ms: DEFAULT_SLEEP_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            seed: None,
            reset_before_test: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub accelerator: AcceleratorConfig,
    pub dma: DmaTestConfig,
}

/// Bring a user supplied AFU id into canonical form.
pub fn canonical_uuid(uuid: &str) -> Result<String, AfuError> {
    Ok(format_afu_id(parse_afu_id(uuid)?))
}

impl TryFrom<TomlConfig> for Settings {
    type Error = AfuError;

    fn try_from(config: TomlConfig) -> Result<Self, Self::Error> {
        let accelerator = config.accelerator.unwrap_or_default();
        let registers = config.registers.unwrap_or_default();
        let dma = config.dma.unwrap_or_default();

        let mut register_map = RegisterMap::default();
        register_map.go = registers.go.unwrap_or(register_map.go);
        register_map.rd_addr = registers.rd_addr.unwrap_or(register_map.rd_addr);
        register_map.wr_addr = registers.wr_addr.unwrap_or(register_map.wr_addr);
        register_map.size = registers.size.unwrap_or(register_map.size);
        register_map.done = registers.done.unwrap_or(register_map.done);
        register_map.reset_count = registers.reset_count.unwrap_or(register_map.reset_count);

        let accelerator_config = AcceleratorConfig {
            uuid: canonical_uuid(accelerator.uuid.as_deref().unwrap_or(DEFAULT_AFU_UUID))?,
            backend: accelerator
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            address_mode: accelerator.address_mode.unwrap_or_default(),
            use_hugepages: accelerator.use_hugepages.unwrap_or(DEFAULT_USE_HUGEPAGES),
            completion_polls: accelerator
                .completion_polls
                .unwrap_or(DEFAULT_COMPLETION_POLLS),
            registers: register_map,
        };

        let dma_config = DmaTestConfig {
            num_tests: dma.num_tests.unwrap_or(DEFAULT_NUM_TESTS),
            data_amount: dma.data_amount.unwrap_or(DEFAULT_DATA_AMOUNT),
            word_bits: match dma.word_bits {
                Some(bits) => WordBits::try_from(bits)?,
                None => WordBits::default(),
            },
            sleep_while_waiting: dma
                .sleep_while_waiting
                .unwrap_or(DEFAULT_SLEEP_WHILE_WAITING),
            sleep_ms: dma.sleep_ms.unwrap_or(DEFAULT_SLEEP_MS),
            timeout_ms: dma.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            seed: dma.seed,
            reset_before_test: dma.reset_before_test.unwrap_or(false),
        };

        let settings = Settings {
            accelerator: accelerator_config,
            dma: dma_config,
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl Settings {
    /// Load vendor, user and optional extra config files and resolve them.
    ///
    /// A `[system_paths]` section found in any layer is applied to the process-wide
    /// [`system_config`](super::system_config).
    pub fn load(extra: Option<&Path>) -> Result<Settings, AfuError> {
        let config = layered_config(extra)?;
        if let Some(paths) = &config.system_paths {
            apply_system_paths(paths)?;
        }
        let settings = Settings::try_from(config)?;
        debug!("Resolved settings: {settings:?}");
        Ok(settings)
    }

    /// Check the values that cannot be expressed by the types alone.
    pub fn validate(&self) -> Result<(), AfuError> {
        if self.dma.data_amount == 0 {
            return Err(AfuError::Argument(
                "data_amount must be at least one element".into(),
            ));
        }
        buffer_bytes(self.dma.data_amount, self.dma.word_bits.bytes())?;
        if self.dma.num_tests == 0 {
            return Err(AfuError::Argument("num_tests must be at least 1".into()));
        }
        self.accelerator.registers.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_files::toml_str_to_config;

    #[test]
    fn test_empty_config_gives_defaults() {
        let settings = Settings::try_from(TomlConfig::default()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_uuid_is_canonicalised() {
        let config =
            toml_str_to_config("[accelerator]\nuuid = \"11112222333344445555666677778888\"\n")
                .unwrap();
        let settings = Settings::try_from(config).unwrap();
        assert_eq!(
            settings.accelerator.uuid,
            "11112222-3333-4444-5555-666677778888"
        );
    }

    #[test]
    fn test_register_overrides() {
        let config = toml_str_to_config("[registers]\ngo = 0x40\ndone = 0x42\n").unwrap();
        let settings = Settings::try_from(config).unwrap();
        assert_eq!(settings.accelerator.registers.go, 0x40);
        assert_eq!(settings.accelerator.registers.done, 0x42);
        assert_eq!(
            settings.accelerator.registers.size,
            RegisterMap::default().size
        );
    }

    #[test]
    fn test_bad_word_bits() {
        let config = toml_str_to_config("[dma]\nword_bits = 24\n").unwrap();
        assert!(matches!(
            Settings::try_from(config),
            Err(AfuError::Argument(_))
        ));
    }

    #[test]
    fn test_zero_data_amount_is_rejected() {
        let config = toml_str_to_config("[dma]\ndata_amount = 0\n").unwrap();
        assert!(matches!(
            Settings::try_from(config),
            Err(AfuError::Argument(_))
        ));
    }

    #[test]
    fn test_oversized_buffers_are_rejected() {
        let config = toml_str_to_config(&format!(
            "[dma]\ndata_amount = {}\nword_bits = 64\n",
            (1_u64 << 61) + 1
        ))
        .unwrap();
        assert!(matches!(
            Settings::try_from(config),
            Err(AfuError::Argument(_))
        ));

        let mut settings = Settings::default();
        settings.dma.word_bits = WordBits::W32;
        settings.dma.data_amount = MAX_BUFFER_BYTES / 4;
        assert!(settings.validate().is_ok());
        settings.dma.data_amount += 1;
        assert!(matches!(settings.validate(), Err(AfuError::Argument(_))));
    }

    #[test]
    fn test_register_word_beyond_the_address_space_is_rejected() {
        let config = toml_str_to_config("[registers]\ngo = 0x4000000000000000\n").unwrap();
        assert!(matches!(
            Settings::try_from(config),
            Err(AfuError::Argument(_))
        ));
    }

    #[test]
    fn test_address_mode_from_str() {
        assert_eq!("virtual".parse::<AddressMode>().unwrap(), AddressMode::Virtual);
        assert!("physical".parse::<AddressMode>().is_err());
    }
}
