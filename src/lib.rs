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

//! afu-dma - host driver and test harness for FPGA DMA accelerators.
//!
//! The crate drives an accelerator functional unit (AFU) that copies cache lines between
//! two host buffers. A test run allocates buffers both sides can access, programs the
//! AFU's address, size and go registers, polls its done register and checks that the
//! output matches the input.
//!
//! # Backends
//!
//! - **dfl** (feature `dfl`): real hardware through the Linux DFL port driver
//! - **simulated** (feature `simulated`): a software model of the AFU
//!
//! Call [`register_backends`] once before [`open_accelerator`]. See the
//! [`accelerators`] module for how backends are chosen.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), afu_dma::error::AfuError> {
//! use afu_dma::config::Settings;
//!
//! afu_dma::register_backends();
//! let settings = Settings::load(None)?;
//! let afu = afu_dma::open_accelerator(&settings.accelerator)?;
//! let report = afu_dma::dma_test::run_dma_test(afu.as_ref(), &settings).await?;
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

pub mod accelerators;
pub mod config;
pub mod error;
pub mod mmio;
pub mod shared_memory;
pub mod system_io;

pub use accelerators::accelerator::{Afu, open_accelerator};

#[cfg(feature = "dfl")]
use crate::accelerators::dfl::DflAccelerator;
#[cfg(feature = "simulated")]
use crate::accelerators::simulated::SimulatedAccelerator;

/// Register every accelerator backend compiled into the crate.
///
/// Safe to call more than once; later calls replace the same entries.
pub fn register_backends() {
    #[cfg(feature = "dfl")]
    DflAccelerator::register_backend();
    #[cfg(feature = "simulated")]
    SimulatedAccelerator::register_backend();
}
