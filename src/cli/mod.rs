//! CLI module for ragquery
//!
//! Handles command-line argument parsing and environment overrides.

pub mod args;

pub use args::{Args, Commands, LogFormatArg, Settings, Verbosity};
