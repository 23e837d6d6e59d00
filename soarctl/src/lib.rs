//! Library side of the `soarctl` binary: argument definitions, config to
//! pipeline wiring and the subcommand bodies.
#![allow(missing_docs)]

pub mod cli;
pub mod commands;
pub mod io;
pub mod pipeline;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,soar::executor=warn";
