//! rp - a micro Radio Paradise player.
//!
//! Plays a stream playlist, follows the ICY now-playing metadata and
//! resolves cover art to a local image file. Playback goes through an
//! in-process ICY pipeline or an external decoder (`mplayer`).

pub mod backend;
pub mod cli;
pub mod config;
pub mod cover;
pub mod error;
pub mod http;
pub mod metadata;
pub mod player;
pub mod playlist;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging. stdout belongs to the now-playing output.
    let directive: Directive = if args.verbose { "rp=debug" } else { "rp=info" }.parse()?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(directive))
        .init();

    let config = config::load();
    cli::run_command(&args, config)
}
