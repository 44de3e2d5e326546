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

//! Process-wide system paths.
//!
//! The DFL driver publishes its ports under `/sys/class/fpga_region/` and their device
//! nodes under `/dev/`. Both locations start at those defaults and are overridden by the
//! `[system_paths]` section of the layered config files when
//! [`Settings::load`](super::Settings::load) applies it, or at runtime through the setters
//! below.

use crate::config::config_files::SystemPaths;
use crate::error::AfuError;
use log::trace;
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The driver-decided location of fpga_region objects. Each region holds `dfl-port.N`
/// children describing the accelerator ports.
pub static FPGA_REGION_DIR: &str = "/sys/class/fpga_region/";

/// The directory holding the port character devices (`dfl-port.N`).
pub static DEVICE_DIR: &str = "/dev/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    pub fpga_region_dir: String,
    pub device_dir: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            fpga_region_dir: FPGA_REGION_DIR.to_string(),
            device_dir: DEVICE_DIR.to_string(),
        }
    }
}

impl SystemConfig {
    /// Take over whichever paths `paths` provides, leaving the others untouched.
    pub fn apply(&mut self, paths: &SystemPaths) {
        if let Some(dir) = &paths.fpga_region_dir {
            self.fpga_region_dir.clone_from(dir);
        }
        if let Some(dir) = &paths.device_dir {
            self.device_dir.clone_from(dir);
        }
        trace!("System paths now {self:?}");
    }
}

static CONFIG: OnceLock<RwLock<SystemConfig>> = OnceLock::new();

fn system_config() -> &'static RwLock<SystemConfig> {
    CONFIG.get_or_init(|| RwLock::new(SystemConfig::default()))
}

fn read_config() -> Result<RwLockReadGuard<'static, SystemConfig>, AfuError> {
    system_config()
        .read()
        .map_err(|e| AfuError::Internal(format!("Failed when locking config for read access: {e}")))
}

fn write_config() -> Result<RwLockWriteGuard<'static, SystemConfig>, AfuError> {
    system_config()
        .write()
        .map_err(|e| AfuError::Internal(format!("Failed when locking config for write access: {e}")))
}

pub fn fpga_region_dir() -> Result<String, AfuError> {
    Ok(read_config()?.fpga_region_dir.clone())
}

pub fn device_dir() -> Result<String, AfuError> {
    Ok(read_config()?.device_dir.clone())
}

pub fn set_fpga_region_dir(dir: String) -> Result<(), AfuError> {
    write_config()?.fpga_region_dir = dir;
    Ok(())
}

pub fn set_device_dir(dir: String) -> Result<(), AfuError> {
    write_config()?.device_dir = dir;
    Ok(())
}

/// Apply a `[system_paths]` section to the process-wide paths.
pub fn apply_system_paths(paths: &SystemPaths) -> Result<(), AfuError> {
    write_config()?.apply(paths);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_unset_paths() {
        let mut config = SystemConfig::default();
        config.apply(&SystemPaths {
            fpga_region_dir: Some("/tmp/regions".into()),
            device_dir: None,
        });
        assert_eq!(config.fpga_region_dir, "/tmp/regions");
        assert_eq!(config.device_dir, DEVICE_DIR);

        config.apply(&SystemPaths::default());
        assert_eq!(config.fpga_region_dir, "/tmp/regions");
    }
}
