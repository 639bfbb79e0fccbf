// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! The bootstrap module sits **outside** the domain/application/
//! infrastructure layers in `channel_pipeline` and owns process-level
//! concerns:
//!
//! - **CLI** ([`cli`]) - argument parsing and validation
//! - **Platform abstraction** ([`platform`]) - OS-specific operations
//! - **Signal handling** ([`signals`]) - SIGTERM/SIGINT shutdown, SIGHUP reload
//! - **Shutdown coordination** ([`shutdown`]) - grace period enforcement
//! - **Exit codes** ([`exit_code`]) - `sysexits.h`-style process exit mapping
//! - **Logging** ([`logger`]) - bootstrap-phase logging, before tracing is wired up
//!
//! Worker configuration (layered TOML + env) lives in `channel_pipeline`'s
//! infrastructure layer, not here: it depends on domain types this crate
//! does not, and on build, this crate cannot depend on `channel_pipeline`
//! without creating a cycle.
//!
//! ## Usage
//!
//! ```no_run
//! use channel_pipeline_bootstrap::{bootstrap_cli, result_to_exit_code};
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let validated_cli = match bootstrap_cli() {
//!         Ok(cli) => cli,
//!         Err(e) => {
//!             eprintln!("CLI Error: {}", e);
//!             return std::process::ExitCode::from(78);
//!         }
//!     };
//!
//!     let result = run_worker(validated_cli).await;
//!     result_to_exit_code(result)
//! }
//!
//! async fn run_worker(_cli: channel_pipeline_bootstrap::ValidatedCli) -> Result<(), String> {
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod exit_code;
pub mod logger;
pub mod platform;
pub mod shutdown;
pub mod signals;

pub use cli::{parse_and_validate, ParseError, ValidatedCli};
pub use exit_code::{result_to_exit_code, ExitCode};
pub use shutdown::ShutdownCoordinator;

/// Parses and validates CLI arguments. The sole entry point callers need
/// before wiring configuration and starting the worker runtime.
pub fn bootstrap_cli() -> Result<ValidatedCli, cli::ParseError> {
    cli::parse_and_validate()
}
