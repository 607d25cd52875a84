//! Command-line interface for rp.
//!
//! Playback is the default action; `cache`, `history` and `config`
//! inspect what playback leaves behind.

mod commands;

pub use commands::{Cli, Commands, PlayArgs, run_command};
