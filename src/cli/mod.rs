//! CLI module for Stackforge.
//!
//! This module provides the command-line interface for the stackforge tool.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
