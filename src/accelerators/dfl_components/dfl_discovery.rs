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

//! Discovery of DFL accelerator ports through sysfs.
//!
//! # A sysfs map of an FPGA card driven by the DFL framework
//!
//! ```text
//! /sys/class/fpga_region
//! ├── region0 -> ../../devices/pci0000:00/0000:00:02.0/0000:3b:00.0/fpga_region/region0
//! │   ├── dfl-fme.0
//! │   └── dfl-port.0
//! │       ├── afu_id        # 32 hex digits, no hyphens
//! │       ├── dev           # major:minor of /dev/dfl-port.0
//! │       └── ...
//! └── region1
//!     └── ...
//! ```
//!
//! Only `dfl-port.*` children and their `afu_id` are interacted with. The port's device
//! node has the same name as its sysfs directory.

use crate::accelerators::accelerator::{format_afu_id, parse_afu_id};
use crate::config;
use crate::error::AfuError;
use crate::system_io::{fs_read, fs_read_dir};
use log::{trace, warn};
use std::path::{Path, PathBuf};

/// Prefix of port directories below a region.
pub static PORT_PREFIX: &str = "dfl-port.";

/// One accelerator port found in sysfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DflPortEntry {
    /// Port handle, e.g. "dfl-port.0". Also the device node name.
    pub handle: String,
    /// Region the port belongs to, e.g. "region0".
    pub region: String,
    /// Canonical AFU id, `None` when it could not be read or parsed.
    pub afu_id: Option<String>,
    pub sysfs_path: PathBuf,
}

fn read_port_afu_id(port_dir: &Path) -> Option<String> {
    let afu_id_path = port_dir.join("afu_id");
    match fs_read(&afu_id_path).and_then(|raw| parse_afu_id(raw.trim_end_matches('\0'))) {
        Ok(afu_id) => Some(format_afu_id(afu_id)),
        Err(e) => {
            warn!("Ignoring AFU id of {port_dir:?}: {e}");
            None
        }
    }
}

/// List every port below `region_dir`.
///
/// # Returns: `Result<Vec<DflPortEntry>, AfuError>`
/// * `Ok(Vec<DflPortEntry>)` - Ports sorted by region then handle
/// * `Err(AfuError::NoDriver)` - `region_dir` does not exist
/// * `Err(AfuError::IOReadDir)` - A region directory could not be listed
pub fn scan_ports(region_dir: &Path) -> Result<Vec<DflPortEntry>, AfuError> {
    if !region_dir.is_dir() {
        return Err(AfuError::NoDriver(format!(
            "{region_dir:?} does not exist; is the dfl-afu driver loaded?"
        )));
    }

    let mut ports = Vec::new();
    for region in fs_read_dir(region_dir)? {
        let region_path = region_dir.join(&region);
        for child in fs_read_dir(&region_path)? {
            if !child.starts_with(PORT_PREFIX) {
                continue;
            }
            let port_dir = region_path.join(&child);
            trace!("Found port {port_dir:?}");
            ports.push(DflPortEntry {
                afu_id: read_port_afu_id(&port_dir),
                handle: child,
                region: region.clone(),
                sysfs_path: port_dir,
            });
        }
    }
    Ok(ports)
}

/// Ports below `region_dir` whose AFU id equals `uuid`.
///
/// # Returns: `Result<Vec<DflPortEntry>, AfuError>`
/// * `Ok(Vec<DflPortEntry>)` - At least one matching port
/// * `Err(AfuError::NotFound)` - No port carries `uuid`
/// * `Err(AfuError::NoDriver)` - See [`scan_ports`]
pub fn find_ports(region_dir: &Path, uuid: &str) -> Result<Vec<DflPortEntry>, AfuError> {
    let wanted = format_afu_id(parse_afu_id(uuid)?);
    let matching: Vec<DflPortEntry> = scan_ports(region_dir)?
        .into_iter()
        .filter(|port| port.afu_id.as_deref() == Some(wanted.as_str()))
        .collect();
    if matching.is_empty() {
        return Err(AfuError::NotFound { uuid: wanted });
    }
    Ok(matching)
}

/// List every port using the configured fpga_region directory.
pub fn list_accelerators() -> Result<Vec<DflPortEntry>, AfuError> {
    scan_ports(Path::new(&config::fpga_region_dir()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn add_port(root: &Path, region: &str, port: &str, afu_id: &str) {
        let dir = root.join(region).join(port);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("afu_id"), afu_id).unwrap();
    }

    #[test]
    fn test_scan_ports_skips_fme_and_sorts() {
        let root = tempfile::tempdir().unwrap();
        add_port(root.path(), "region1", "dfl-port.1", "11112222333344445555666677778888\n");
        add_port(root.path(), "region0", "dfl-port.0", "7d4ebc6e3e3f4d0b9b9c6d6b1a1e7e2a\n");
        fs::create_dir_all(root.path().join("region0/dfl-fme.0")).unwrap();

        let ports = scan_ports(root.path()).unwrap();
        let handles: Vec<&str> = ports.iter().map(|p| p.handle.as_str()).collect();
        assert_eq!(handles, vec!["dfl-port.0", "dfl-port.1"]);
        assert_eq!(ports[0].region, "region0");
        assert_eq!(
            ports[0].afu_id.as_deref(),
            Some("7d4ebc6e-3e3f-4d0b-9b9c-6d6b1a1e7e2a")
        );
    }

    #[test]
    fn test_unreadable_afu_id_is_none() {
        let root = tempfile::tempdir().unwrap();
        add_port(root.path(), "region0", "dfl-port.0", "not an id");
        let ports = scan_ports(root.path()).unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].afu_id, None);
    }

    #[test]
    fn test_missing_region_dir_is_no_driver() {
        let result = scan_ports(Path::new("/this/does/not/exist"));
        assert!(matches!(result, Err(AfuError::NoDriver(_))));
    }
}
