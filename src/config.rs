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

//! Configuration.
//!
//! - [`system_config`] - process-wide sysfs and device node locations
//! - [`config_files`] - layered TOML files
//! - [`settings`] - resolved, validated values for the accelerator and the DMA test

pub mod config_files;
pub mod settings;
pub mod system_config;

pub use settings::{AcceleratorConfig, AddressMode, DmaTestConfig, Settings, WordBits};
pub use system_config::{device_dir, fpga_region_dir};
