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

use afu_dma::accelerators::accelerator::backend_names;
use afu_dma::accelerators::dfl_components::dfl_discovery::{DflPortEntry, list_accelerators};
use afu_dma::error::AfuError;

/// Ascii table of the DFL ports
fn ports_message(ports: &[DflPortEntry]) -> String {
    let mut ret_string = String::from(
        "---- ACCELERATORS ----\n\
        | port | region | afu id |\n",
    );
    for port in ports {
        let afu_id = port.afu_id.as_deref().unwrap_or("unknown");
        ret_string += format!("| {} | {} | {afu_id} |\n", port.handle, port.region).as_str();
    }
    ret_string
}

/// Argument parser for the list command
pub fn list_handler() -> Result<String, AfuError> {
    let mut ret_string = format!("backends: {}\n\n", backend_names()?.join(", "));
    match list_accelerators() {
        Ok(ports) => ret_string += ports_message(&ports).as_str(),
        Err(AfuError::NoDriver(reason)) => {
            ret_string += format!("No FPGA driver found: {reason}").as_str();
        }
        Err(e) => return Err(e),
    }
    Ok(ret_string)
}
