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

//! `afu_dma` - run DMA loopback tests against an FPGA accelerator.
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`
//!
//! # Examples
//!
//! ```bash
//! # One test of 8192 32-bit elements on the first matching accelerator
//! afu_dma run
//!
//! # Ten tests with 64-bit elements, no sleeping while waiting for done
//! afu_dma run --tests 10 --word-bits 64 --no-sleep
//!
//! # Read the done register of the simulated accelerator
//! afu_dma --backend simulated read 0x160
//! ```

use afu_dma::config::{Settings, settings::canonical_uuid};
use afu_dma::error::AfuError;
use clap::{Parser, Subcommand, arg, command};
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;

mod list;
mod mmio;
mod run;

#[derive(Parser, Debug)]
#[command(name = "afu_dma")]
#[command(bin_name = "afu_dma")]
struct Cli {
    #[arg(
        long = "config",
        help = r#"Extra TOML config file, layered over
/usr/lib/afu-dma/config.toml and /etc/afu-dma/config.toml.
        "#
    )]
    config: Option<PathBuf>,
    #[arg(
        long = "backend",
        help = r#"Accelerator backend: "dfl" (default) or "simulated".
The simulated backend is a software model of the AFU and is
never chosen unless named here or in a config file.
        "#
    )]
    backend: Option<String>,
    #[arg(long = "uuid", help = "AFU id of the accelerator to open")]
    uuid: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the DMA loopback test
    Run {
        /// Number of test iterations
        #[arg(long = "tests")]
        tests: Option<usize>,
        /// Elements per buffer
        #[arg(long = "amount")]
        amount: Option<usize>,
        /// Element width: 8, 16, 32 or 64
        #[arg(long = "word-bits")]
        word_bits: Option<u32>,
        /// Sleep between polls of the done register
        #[arg(long = "sleep-ms")]
        sleep_ms: Option<u64>,
        /// Spin on the done register instead of sleeping
        #[arg(long = "no-sleep")]
        no_sleep: bool,
        /// Give up waiting for done after this long; 0 waits forever
        #[arg(long = "timeout-ms")]
        timeout_ms: Option<u64>,
        /// Seed for the input data
        #[arg(long = "seed")]
        seed: Option<u64>,
        /// Reset the accelerator before the first test
        #[arg(long = "reset")]
        reset: bool,
    },
    /// List accelerators found through the DFL driver
    List,
    /// Read a 64-bit MMIO register
    Read {
        /// Byte offset, hex (0x...) or decimal
        #[arg(value_parser = mmio::parse_number)]
        offset: u64,
    },
    /// Write a 64-bit MMIO register
    Write {
        /// Byte offset, hex (0x...) or decimal
        #[arg(value_parser = mmio::parse_number)]
        offset: u64,
        /// Value, hex (0x...) or decimal
        #[arg(value_parser = mmio::parse_number)]
        value: u64,
    },
    /// Reset the accelerator
    Reset,
}

/// Settings from the config files with the global flags applied.
fn load_settings(cli: &Cli) -> Result<Settings, AfuError> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(backend) = &cli.backend {
        settings.accelerator.backend = backend.clone();
    }
    if let Some(uuid) = &cli.uuid {
        settings.accelerator.uuid = canonical_uuid(uuid)?;
    }
    Ok(settings)
}

/// The message printed for a failed command.
fn error_message(error: &AfuError) -> String {
    match error {
        AfuError::Busy(_) => "ERROR: All FPGAs busy.".to_string(),
        AfuError::NotFound { uuid } => format!("ERROR: FPGA with accelerator {uuid} not found."),
        AfuError::NoDriver(_) => "ERROR: No FPGA driver found.".to_string(),
        other => format!("ERROR: {other}"),
    }
}

async fn dispatch(cli: &Cli) -> Result<String, AfuError> {
    let mut settings = load_settings(cli)?;
    match &cli.command {
        Commands::Run {
            tests,
            amount,
            word_bits,
            sleep_ms,
            no_sleep,
            timeout_ms,
            seed,
            reset,
        } => {
            let overrides = run::RunOverrides {
                tests: *tests,
                amount: *amount,
                word_bits: *word_bits,
                sleep_ms: *sleep_ms,
                no_sleep: *no_sleep,
                timeout_ms: *timeout_ms,
                seed: *seed,
                reset: *reset,
            };
            overrides.apply(&mut settings)?;
            run::run_handler(&settings).await
        }
        Commands::List => list::list_handler(),
        Commands::Read { offset } => mmio::read_handler(&settings, *offset),
        Commands::Write { offset, value } => mmio::write_handler(&settings, *offset, *value),
        Commands::Reset => mmio::reset_handler(&settings),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    afu_dma::register_backends();

    match dispatch(&cli).await {
        Ok(message) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            debug!("{e:?}");
            eprintln!("{}", error_message(&e));
            ExitCode::FAILURE
        }
    }
}
