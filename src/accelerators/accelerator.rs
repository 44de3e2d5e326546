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

//! Accelerator abstraction layer.
//!
//! This module defines the [`Afu`] trait every accelerator backend implements, and the
//! registry used to pick a backend at runtime. The DMA test only ever talks to a
//! `Box<dyn Afu>`, so the same test runs against real hardware through the Linux DFL
//! driver or against the software model.
//!
//! # Backend Registration
//!
//! Backends register themselves at startup with a name and a constructor. They are
//! defined using the `#[backend]` macro, which generates the `register_backend()` call,
//! and are included or excluded using cargo features:
//!
//! ```rust,no_run
//! # use afu_dma::accelerators::dfl::DflAccelerator;
//! # use afu_dma::accelerators::simulated::SimulatedAccelerator;
//! fn register_backends() {
//!     #[cfg(feature = "dfl")]
//!     DflAccelerator::register_backend();
//!     #[cfg(feature = "simulated")]
//!     SimulatedAccelerator::register_backend();
//! }
//! ```
//!
//! # Backend Selection
//!
//! [`open_accelerator`] uses the backend named in the configuration, `dfl` when none is
//! named. The `simulated` backend is only used when asked for by name, so a machine
//! without an FPGA driver reports [`AfuError::NoDriver`].

use crate::config::AcceleratorConfig;
use crate::error::AfuError;
use crate::shared_memory::SharedBuffer;
use log::{info, trace};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Type alias for backend constructor functions.
///
/// Constructors receive the resolved accelerator configuration and either find and open
/// a matching accelerator or explain why they could not.
pub type BackendConstructor = fn(&AcceleratorConfig) -> Result<Box<dyn Afu>, AfuError>;

/// Global registry of accelerator backends, keyed by backend name.
pub static BACKEND_REGISTRY: OnceLock<Mutex<HashMap<&'static str, BackendConstructor>>> =
    OnceLock::new();

/// Backend used when the configuration names none.
pub static DEFAULT_BACKEND_NAME: &str = "dfl";

/// Trait for driving an accelerator functional unit.
///
/// MMIO offsets are byte offsets into the AFU's MMIO region. 64-bit accesses must be
/// 8-byte aligned and 32-bit accesses 4-byte aligned.
pub trait Afu: Any + Send + Sync {
    /// Get the handle of the accelerator (e.g. "dfl-port.0").
    fn handle(&self) -> &str;

    /// Get the AFU id in canonical UUID form.
    ///
    /// # Returns: `Result<String, AfuError>`
    /// * `Ok(String)` - e.g. "7d4ebc6e-3e3f-4d0b-9b9c-6d6b1a1e7e2a"
    /// * `Err(AfuError::IORead)` - Failed to read the id
    fn afu_id(&self) -> Result<String, AfuError>;

    /// Reset the accelerator port.
    ///
    /// # Returns: `Result<(), AfuError>`
    /// * `Ok(())` - Reset done
    /// * `Err(AfuError::Ioctl)` - The driver refused the reset
    fn reset(&self) -> Result<(), AfuError>;

    /// Read a 64-bit register.
    ///
    /// # Returns: `Result<u64, AfuError>`
    /// * `Ok(u64)` - Register value
    /// * `Err(AfuError::Mmio)` - Misaligned or out of range offset
    fn read_mmio64(&self, offset: u64) -> Result<u64, AfuError>;

    /// Write a 64-bit register.
    ///
    /// # Returns: `Result<(), AfuError>`
    /// * `Ok(())` - Written
    /// * `Err(AfuError::Mmio)` - Misaligned or out of range offset
    fn write_mmio64(&self, offset: u64, value: u64) -> Result<(), AfuError>;

    /// Read a 32-bit register.
    fn read_mmio32(&self, offset: u64) -> Result<u32, AfuError>;

    /// Write a 32-bit register.
    fn write_mmio32(&self, offset: u64, value: u32) -> Result<(), AfuError>;

    /// Allocate a buffer of at least `len` bytes that both software and the accelerator
    /// can access.
    ///
    /// # Returns: `Result<SharedBuffer, AfuError>`
    /// * `Ok(SharedBuffer)` - Zeroed buffer, already mapped for DMA
    /// * `Err(AfuError::Mmap)` - Host memory could not be allocated
    /// * `Err(AfuError::Ioctl)` - The driver refused the DMA mapping
    fn prepare_buffer(&self, len: usize) -> Result<SharedBuffer, AfuError>;
}

/// Parse an AFU id given as a UUID, with or without hyphens, in either case.
pub fn parse_afu_id(afu_id: &str) -> Result<u128, AfuError> {
    let hex: String = afu_id.trim().chars().filter(|c| *c != '-').collect();
    if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AfuError::Argument(format!(
            "'{afu_id}' is not a valid AFU id. Expected 32 hexadecimal digits."
        )));
    }
    u128::from_str_radix(&hex, 16)
        .map_err(|e| AfuError::Argument(format!("'{afu_id}' is not a valid AFU id: {e}")))
}

/// Format an AFU id as a lowercase hyphenated UUID.
pub fn format_afu_id(afu_id: u128) -> String {
    let hex = format!("{afu_id:032x}");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Initialize the backend registry.
pub fn init_backend_registry() -> Mutex<HashMap<&'static str, BackendConstructor>> {
    Mutex::new(HashMap::new())
}

/// Register a backend in the global registry.
///
/// # Panics
///
/// Panics if the registry lock is poisoned (should never happen in normal operation).
pub fn register_backend(name: &'static str, constructor: BackendConstructor) {
    let mut registry = BACKEND_REGISTRY
        .get_or_init(init_backend_registry)
        .lock()
        .expect("couldn't get BACKEND_REGISTRY");

    trace!("Registering backend '{name}'");
    registry.insert(name, constructor);
}

/// Names of all registered backends, sorted.
pub fn backend_names() -> Result<Vec<&'static str>, AfuError> {
    let registry = BACKEND_REGISTRY
        .get()
        .ok_or(AfuError::Internal(String::from(
            "couldn't get BACKEND_REGISTRY",
        )))?
        .lock()
        .map_err(|_| AfuError::Internal(String::from("couldn't lock BACKEND_REGISTRY")))?;
    let mut names: Vec<&'static str> = registry.keys().copied().collect();
    names.sort_unstable();
    Ok(names)
}

fn lookup_backend(name: &str) -> Result<BackendConstructor, AfuError> {
    let registry = BACKEND_REGISTRY
        .get()
        .ok_or(AfuError::Internal(String::from(
            "couldn't get BACKEND_REGISTRY",
        )))?
        .lock()
        .map_err(|_| AfuError::Internal(String::from("couldn't lock BACKEND_REGISTRY")))?;

    registry.get(name).copied().ok_or_else(|| {
        AfuError::Argument(format!(
            "'{name}' is not a known accelerator backend."
        ))
    })
}

/// Open an accelerator with a specific backend.
pub fn open_backend(name: &str, config: &AcceleratorConfig) -> Result<Box<dyn Afu>, AfuError> {
    // the registry lock is released before the constructor runs
    let constructor = lookup_backend(name)?;
    constructor(config)
}

/// Open the accelerator described by `config`.
///
/// # Returns: `Result<Box<dyn Afu>, AfuError>`
/// * `Ok(Box<dyn Afu>)` - Open accelerator
/// * `Err(AfuError::Argument)` - Unknown backend name
/// * `Err(AfuError::NotFound)` - No accelerator with the configured AFU id
/// * `Err(AfuError::Busy)` - Every matching accelerator is in use
/// * `Err(AfuError::NoDriver)` - No FPGA driver present
pub fn open_accelerator(config: &AcceleratorConfig) -> Result<Box<dyn Afu>, AfuError> {
    let name = if config.backend.is_empty() {
        DEFAULT_BACKEND_NAME
    } else {
        config.backend.as_str()
    };
    let afu = open_backend(name, config)?;
    info!("Opened {} with the {name} backend", afu.handle());
    Ok(afu)
}
