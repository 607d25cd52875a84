//! CLI command definitions and dispatch.
//!
//! Running `rp` without a subcommand plays the playlist. Maintenance
//! subcommands live in their own submodules:
//! - `play`: playback, backend selection and signal handling
//! - `maintenance`: cover cache, play history and config inspection

mod maintenance;
mod play;

use clap::{Args, Parser, Subcommand};

pub use maintenance::{cmd_cache, cmd_config, cmd_history};
pub use play::cmd_play;

use crate::backend::{AudioOutput, BackendPreference};
use crate::config::Config;
use crate::cover::SizePreference;

/// Micro Radio Paradise player
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub play: PlayArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Playback options, overriding the config file
#[derive(Args, Debug, Clone, Default)]
pub struct PlayArgs {
    /// Playlist URL (default: the configured Radio Paradise stream)
    pub playlist: Option<String>,

    /// Preferred cover size
    #[arg(short, long, value_enum)]
    pub size: Option<SizePreference>,

    /// Playback backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendPreference>,

    /// Where the native pipeline sends audio
    #[arg(long, value_enum)]
    pub audio_output: Option<AudioOutput>,

    /// External decoder program
    #[arg(long)]
    pub decoder: Option<String>,

    /// Don't keep covers between runs
    #[arg(long)]
    pub no_cache: bool,
}

impl PlayArgs {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.playlist {
            config.playback.playlist_url = url.clone();
        }
        if let Some(size) = self.size {
            config.covers.size = size;
        }
        if let Some(backend) = self.backend {
            config.playback.backend = backend;
        }
        if let Some(output) = self.audio_output {
            config.playback.audio_output = output;
        }
        if let Some(program) = &self.decoder {
            config.playback.decoder.program = program.clone();
        }
        if self.no_cache {
            config.covers.cache = false;
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the cover cache size, or clear it
    Cache {
        /// Delete every cached cover
        #[arg(long)]
        clear: bool,
    },
    /// Show recently played tracks
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Print the effective configuration
    Config {
        /// Write the configuration file if it doesn't exist yet
        #[arg(long)]
        init: bool,
    },
}

/// Run the command line against the loaded configuration.
pub fn run_command(cli: &Cli, mut config: Config) -> anyhow::Result<()> {
    cli.play.apply(&mut config);

    match &cli.command {
        None => cmd_play(&config),
        Some(Commands::Cache { clear }) => cmd_cache(&config, *clear),
        Some(Commands::History { count }) => cmd_history(&config, *count),
        Some(Commands::Config { init }) => cmd_config(&config, *init),
    }
}
