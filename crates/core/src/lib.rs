//! basil-core
//!
//! Memoizing orchestrator for the lift -> translate -> verify toolchain.
//!
//! A binary is staged into a per-compilation directory; each external tool
//! invocation (lifter, symbol reader, translator, verifier, model printer) is
//! keyed by its exact parameters and recorded in a SQLite cache index inside
//! that directory, so repeated runs skip work that already completed.
//!
//! All substantive logic lives here so it is testable without the CLI.

pub mod db;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
