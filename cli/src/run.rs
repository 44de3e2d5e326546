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

use afu_dma::config::{Settings, WordBits};
use afu_dma::dma_test::{DmaTestReport, run_dma_test};
use afu_dma::error::AfuError;
use afu_dma::open_accelerator;

/// Flags of the run command that override config file values.
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub tests: Option<usize>,
    pub amount: Option<usize>,
    pub word_bits: Option<u32>,
    pub sleep_ms: Option<u64>,
    pub no_sleep: bool,
    pub timeout_ms: Option<u64>,
    pub seed: Option<u64>,
    pub reset: bool,
}

impl RunOverrides {
    pub fn apply(&self, settings: &mut Settings) -> Result<(), AfuError> {
        let dma = &mut settings.dma;
        if let Some(tests) = self.tests {
            dma.num_tests = tests;
        }
        if let Some(amount) = self.amount {
            dma.data_amount = amount;
        }
        if let Some(bits) = self.word_bits {
            dma.word_bits = WordBits::try_from(bits)?;
        }
        if let Some(sleep_ms) = self.sleep_ms {
            dma.sleep_ms = sleep_ms;
        }
        if self.no_sleep {
            dma.sleep_while_waiting = false;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            dma.timeout_ms = timeout_ms;
        }
        if self.seed.is_some() {
            dma.seed = self.seed;
        }
        if self.reset {
            dma.reset_before_test = true;
        }
        Ok(())
    }
}

/// Ascii table of a finished run
fn report_message(handle: &str, report: &DmaTestReport) -> String {
    let mut ret_string = format!(
        "---- DMA TEST {handle} ----\n\
        | test | elements | bytes | cache lines | polls | time | resets |\n"
    );
    for iteration in &report.iterations {
        ret_string += format!(
            "| {} | {} | {} | {} | {} | {:?} | {} |\n",
            iteration.test,
            iteration.elements,
            iteration.bytes,
            iteration.cache_lines,
            iteration.polls,
            iteration.elapsed,
            iteration.reset_count
        )
        .as_str();
    }
    ret_string += "TEST SUCCESSFUL";
    ret_string
}

/// Argument parser for the run command
pub async fn run_handler(settings: &Settings) -> Result<String, AfuError> {
    let afu = open_accelerator(&settings.accelerator)?;
    let report = run_dma_test(afu.as_ref(), settings).await?;
    Ok(report_message(afu.handle(), &report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_only_touch_given_values() {
        let mut settings = Settings::default();
        RunOverrides {
            amount: Some(16),
            word_bits: Some(8),
            no_sleep: true,
            ..RunOverrides::default()
        }
        .apply(&mut settings)
        .unwrap();

        assert_eq!(settings.dma.data_amount, 16);
        assert_eq!(settings.dma.word_bits, WordBits::W8);
        assert!(!settings.dma.sleep_while_waiting);
        assert_eq!(settings.dma.num_tests, Settings::default().dma.num_tests);
        assert_eq!(settings.dma.timeout_ms, Settings::default().dma.timeout_ms);
    }

    #[test]
    fn test_bad_word_bits() {
        let mut settings = Settings::default();
        let result = RunOverrides {
            word_bits: Some(12),
            ..RunOverrides::default()
        }
        .apply(&mut settings);
        assert!(matches!(result, Err(AfuError::Argument(_))));
    }

    #[tokio::test]
    async fn test_run_on_simulated_backend() {
        afu_dma::register_backends();
        let mut settings = Settings::default();
        settings.accelerator.backend = "simulated".into();
        settings.accelerator.use_hugepages = false;
        settings.accelerator.completion_polls = 1;
        settings.dma.data_amount = 100;
        settings.dma.sleep_ms = 1;

        let message = run_handler(&settings).await.unwrap();
        assert!(message.contains("sim-port.0"));
        assert!(message.ends_with("TEST SUCCESSFUL"));
    }
}
