// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Codes
//!
//! Maps the worker's top-level result to a Unix exit status, following the
//! `sysexits.h` convention the rest of the process error handling already
//! leans on for classification (transient vs. permanent vs. configuration).

/// Standard `sysexits.h` codes, extended with a couple of daemon-specific ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    GeneralError = 1,
    ConfigError = 78,
    Unavailable = 69,
    IoError = 74,
    Cancelled = 130,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

pub fn result_to_exit_code<E: std::fmt::Display>(result: Result<(), E>) -> std::process::ExitCode {
    match result {
        Ok(()) => ExitCode::Ok.into(),
        Err(e) => {
            tracing::error!(error = %e, "worker exited with error");
            ExitCode::GeneralError.into()
        }
    }
}
