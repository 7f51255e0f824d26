//! Command-line driver for the trail crossway engine
//!
//! Operates on a JSON snapshot of an in-memory store: load, run one engine operation,
//! print the result as JSON and optionally write the snapshot back.

mod commands;
pub mod logging;
pub mod settings;

pub use commands::{CommandOutput, run};
pub use settings::Settings;
