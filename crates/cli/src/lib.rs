//! Command-line host for a supervised chat worker.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
