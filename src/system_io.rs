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

//! Error Wrapping File System I/O Helpers
//!
//! This module provides convenient wrappers around standard Rust file system operations,
//! with automatic conversion to `AfuError` types. All functions include trace logging
//! for debugging and provide detailed error context including file paths and operation types.
//!
//! Includes: read, directory listing and device node opening.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use afu_dma::system_io::{fs_read, fs_read_dir};
//! # use std::path::Path;
//!
//! # fn example() -> Result<(), afu_dma::error::AfuError> {
//! // Read the AFU id of a port
//! let afu_id = fs_read(Path::new("/sys/class/fpga_region/region0/dfl-port.0/afu_id"))?;
//!
//! // List the regions
//! let regions = fs_read_dir(Path::new("/sys/class/fpga_region"))?;
//! # Ok(())
//! # }
//! ```

use crate::error::AfuError;
use log::trace;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// How a device node is shared with other openers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAccess {
    Shared,
    /// `O_EXCL`: the driver refuses the open with `EBUSY` while anyone else holds the
    /// device, and refuses everyone else while this handle is open.
    Exclusive,
}

impl DeviceAccess {
    /// Flags passed to `open(2)` on top of `O_RDWR`.
    pub fn custom_flags(self) -> libc::c_int {
        match self {
            DeviceAccess::Shared => 0,
            DeviceAccess::Exclusive => libc::O_EXCL,
        }
    }
}

/// Read the contents of a file to a String.
///
/// This is a convenient wrapper around `std::fs::File::read_to_string` that provides
/// trace logging and automatic error conversion to `AfuError::IORead`.
///
/// # Arguments
///
/// * `file_path` - Path to the file to read
///
/// # Returns: `Result<String, AfuError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(AfuError::IORead)` - If the file cannot be read (doesn't exist, permissions, etc.)
pub fn fs_read(file_path: &Path) -> Result<String, AfuError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf: String = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(AfuError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Read the contents of a directory and return entry names.
///
/// This is a convenient wrapper around `std::fs::read_dir` that provides trace logging,
/// automatic error conversion to `AfuError::IOReadDir`, and returns a vector of entry
/// names (not full paths), sorted so that callers see `region0` before `region1`.
/// Entries that cannot be read are silently skipped.
///
/// # Arguments
///
/// * `dir` - The directory path to list
///
/// # Returns: `Result<Vec<String>, AfuError>`
/// * `Ok(Vec<String>)` - Sorted entry names in the directory
/// * `Err(AfuError::IOReadDir)` - If the directory cannot be read
pub fn fs_read_dir(dir: &Path) -> Result<Vec<String>, AfuError> {
    trace!("Attempting to read directory '{dir:?}'");
    std::fs::read_dir(dir).map_or_else(
        |e| {
            Err(AfuError::IOReadDir {
                dir: dir.to_owned(),
                e,
            })
        },
        |iter| {
            let mut ret: Vec<String> = iter
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            ret.sort();
            trace!("Dir reading done.");
            Ok(ret)
        },
    )
}

/// Open a device node for reading and writing.
///
/// The raw `std::io::Error` is kept inside `AfuError::IOOpen` so callers can inspect
/// `raw_os_error()` (the DFL driver answers `EBUSY` when a port is already in use).
///
/// # Arguments
///
/// * `device_path` - Path of the character device, e.g. `/dev/dfl-port.0`
/// * `access` - Whether other processes may hold the device at the same time
///
/// # Returns: `Result<File, AfuError>`
/// * `Ok(File)` - Open read/write handle
/// * `Err(AfuError::IOOpen)` - If the device cannot be opened
pub fn fs_open_device(device_path: &Path, access: DeviceAccess) -> Result<File, AfuError> {
    trace!("Attempting to open device {device_path:?} ({access:?})");
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(access.custom_flags())
        .open(device_path)
        .map_err(|e| AfuError::IOOpen {
            file: device_path.into(),
            e,
        })
}
